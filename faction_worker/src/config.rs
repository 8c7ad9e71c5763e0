use std::{env, time::Duration};

use faction_api::GameApiConfig;
use faction_common::helpers::{env_duration_secs, env_or_default, parse_boolean_flag};
use faction_payments::{sqlite::db_url, ReconciliationConfig};
use log::*;

const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Time between the starts of consecutive reconciliation runs. A run that overruns delays the next one; runs
    /// never overlap.
    pub run_interval: Duration,
    /// Run a single reconciliation batch and exit.
    pub run_once: bool,
    /// Where notifications are POSTed. When `None`, notifications are only logged.
    pub webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub api: GameApiConfig,
    pub reconciliation: ReconciliationConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_interval: DEFAULT_RUN_INTERVAL,
            run_once: false,
            webhook_url: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            api: GameApiConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = db_url();
        let max_connections = env_or_default("FP_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS).max(1);
        let mut run_interval = env_duration_secs("FP_RUN_INTERVAL", DEFAULT_RUN_INTERVAL);
        if run_interval.is_zero() {
            warn!("🪛️ FP_RUN_INTERVAL must be at least one second. Using 1s.");
            run_interval = Duration::from_secs(1);
        }
        let run_once = parse_boolean_flag(env::var("FP_RUN_ONCE").ok(), false);
        let webhook_url =
            env::var("FP_NOTIFY_WEBHOOK_URL").ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if webhook_url.is_none() {
            info!("🪛️ FP_NOTIFY_WEBHOOK_URL is not set. Payment notifications will only be logged.");
        }
        let notify_timeout = env_duration_secs("FP_NOTIFY_TIMEOUT", DEFAULT_NOTIFY_TIMEOUT);
        Self {
            database_url,
            max_connections,
            run_interval,
            run_once,
            webhook_url,
            notify_timeout,
            api: GameApiConfig::new_from_env_or_default(),
            reconciliation: ReconciliationConfig::new_from_env_or_default(),
        }
    }
}
