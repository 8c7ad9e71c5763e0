use std::time::Duration;

use faction_common::helpers::{env_duration_millis, env_duration_secs, env_or_default};

const DEFAULT_VERIFIER: &str = "faction-payments";

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// How far back each run looks for deposits. Runs overlap, so this should be comfortably longer than the interval
    /// between runs.
    pub lookback: Duration,
    /// A claim older than this is considered abandoned.
    pub claim_ttl: Duration,
    /// Abandoned claims are reset to `Pending` this many times. After that the request is expired instead.
    pub max_claim_resets: u32,
    /// Pause between factions that needed upstream calls.
    pub faction_delay: Duration,
    /// Recorded as `verified_by` on requests this engine fulfils.
    pub verified_by: String,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(3600),
            claim_ttl: Duration::from_secs(3600),
            max_claim_resets: 3,
            faction_delay: Duration::from_millis(2000),
            verified_by: DEFAULT_VERIFIER.to_string(),
        }
    }
}

impl ReconciliationConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            lookback: env_duration_secs("FP_LOOKBACK", defaults.lookback),
            claim_ttl: env_duration_secs("FP_CLAIM_TTL", defaults.claim_ttl),
            max_claim_resets: env_or_default("FP_MAX_CLAIM_RESETS", defaults.max_claim_resets),
            faction_delay: env_duration_millis("FP_FACTION_DELAY_MS", defaults.faction_delay),
            verified_by: env_or_default("FP_VERIFIED_BY", defaults.verified_by),
        }
    }
}
