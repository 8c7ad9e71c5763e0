use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a single reconciliation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// The circuit breaker was open when the run started, so nothing was done.
    pub skipped_breaker_open: bool,
    /// The circuit breaker opened part-way through, and the remaining factions were left for the next run.
    pub stopped_breaker_open: bool,
    pub claims_reset: u64,
    pub claims_expired: u64,
    pub factions_checked: usize,
    /// Factions with no API key or no open requests.
    pub factions_skipped: usize,
    pub deposits_seen: usize,
    pub requests_fulfilled: usize,
    /// Matches that could not be applied because the request or the deposit had been used in the meantime.
    pub fulfillment_conflicts: usize,
    /// Feeds cut short by a failed page or the page ceiling.
    pub incomplete_feeds: usize,
    pub notification_failures: usize,
    pub storage_errors: usize,
    pub api_errors: usize,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        Self { started_at: Utc::now(), ..Default::default() }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn has_errors(&self) -> bool {
        self.storage_errors > 0 || self.api_errors > 0 || self.notification_failures > 0
    }
}

impl Display for ReconciliationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.skipped_breaker_open {
            return write!(f, "skipped (circuit breaker open)");
        }
        write!(
            f,
            "{} factions checked, {} skipped. {} deposits seen, {} requests fulfilled, {} conflicts. {} claims reset, \
             {} expired. Errors: {} storage, {} api, {} notification. {} incomplete feeds.",
            self.factions_checked,
            self.factions_skipped,
            self.deposits_seen,
            self.requests_fulfilled,
            self.fulfillment_conflicts,
            self.claims_reset,
            self.claims_expired,
            self.storage_errors,
            self.api_errors,
            self.notification_failures,
            self.incomplete_feeds,
        )?;
        if self.stopped_breaker_open {
            write!(f, " Stopped early: circuit breaker open.")?;
        }
        Ok(())
    }
}
