//! # Faction payments worker
//!
//! Wires the upstream API client, the payment request store and the notification channel together and runs the
//! reconciliation batch on a schedule until Ctrl-C.
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.
use std::sync::Arc;

use faction_api::{CircuitBreaker, DepositFetcher, GameApi};
use faction_common::Shutdown;
use faction_payments::{NotificationChannel, ReconciliationApi, SqliteDatabase};
use log::*;

pub mod cli;
pub mod config;
pub mod errors;
pub mod worker;

use config::WorkerConfig;
use errors::WorkerError;
use worker::{run_once, start_reconciliation_worker};

pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await?;
    db.run_migrations().await?;
    let shutdown = Shutdown::new();
    let breaker = Arc::new(CircuitBreaker::new(config.api.breaker.clone()));
    let client = GameApi::new(&config.api, breaker)?.with_shutdown(shutdown.signal());
    let fetcher = DepositFetcher::new(client, config.api.feed.clone());
    let notifier = NotificationChannel::new(config.webhook_url.as_deref(), config.notify_timeout)?;
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher, config.reconciliation.clone());
    let signal = shutdown.signal();
    let listener = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🕰️ Ctrl-C received. Shutting down.");
                shutdown.trigger();
            },
            Err(e) => error!("🕰️ Could not listen for Ctrl-C. The worker can only be stopped by killing it. {e}"),
        }
    });
    let result = if config.run_once {
        run_once(&api, &signal).await.map(|report| info!("🕰️ {report}"))
    } else {
        start_reconciliation_worker(api, config.run_interval, signal).await.map(|_| ()).map_err(WorkerError::from)
    };
    listener.abort();
    db.close().await;
    result
}
