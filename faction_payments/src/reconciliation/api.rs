use std::fmt::Debug;

use faction_api::{
    CircuitBreakerStatus,
    DepositFeed,
    DepositFetcher,
    GameApiError,
    HttpTransport,
    OutcomeKind,
    Transport,
};
use faction_common::ShutdownSignal;
use log::*;

use crate::{
    db_types::{DepositEvidence, Faction, PaymentRequest, RequestStatus},
    helpers::parse_deposits,
    matching::match_deposits,
    FactionDirectory,
    PaymentNotifier,
    PaymentRequestStore,
    ReconciliationConfig,
    ReconciliationError,
    ReconciliationReport,
};

/// How far a faction got before it stopped.
enum FactionStep {
    /// Nothing to do, no upstream calls made.
    Skipped,
    /// Upstream was queried and the results applied, possibly only in part.
    Reconciled,
    /// The circuit breaker refused the faction's calls. No further factions should be attempted.
    BreakerOpen,
}

/// `ReconciliationApi` closes payment requests by finding the deposits that paid them.
///
/// Each call to [`Self::run`] is one batch:
/// 1. Stale claims are reset to `Pending` and announced again, or given up on as `Expired` once they have been reset
///    `max_claim_resets` times.
/// 2. Each faction is visited in turn. Its deposit news is fetched for the lookback window, parsed, matched against the
///    faction's open requests and the matches are fulfilled and announced.
///
/// Factions are processed one at a time with a pause between those that needed upstream calls. A storage failure only
/// affects the faction being processed. An open circuit breaker ends the run early, and shutdown aborts it.
pub struct ReconciliationApi<B, N, T = HttpTransport> {
    db: B,
    notifier: N,
    fetcher: DepositFetcher<T>,
    config: ReconciliationConfig,
}

impl<B, N, T> Debug for ReconciliationApi<B, N, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi ({:?})", self.config)
    }
}

impl<B, N, T> ReconciliationApi<B, N, T> {
    pub fn new(db: B, notifier: N, fetcher: DepositFetcher<T>, config: ReconciliationConfig) -> Self {
        Self { db, notifier, fetcher, config }
    }
}

impl<B, N, T, E> ReconciliationApi<B, N, T>
where
    B: PaymentRequestStore<Error = E> + FactionDirectory<Error = E>,
    N: PaymentNotifier,
    T: Transport,
    E: std::error::Error,
{
    pub fn breaker_status(&self) -> CircuitBreakerStatus {
        self.fetcher.api().breaker_status()
    }

    /// Runs one reconciliation batch. See the type documentation for the steps.
    ///
    /// Only a failure to list the factions, or shutdown, returns an error. Everything else is counted in the report and
    /// logged.
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<ReconciliationReport, ReconciliationError<E>> {
        let mut report = ReconciliationReport::new();
        if !self.fetcher.api().breaker().allows_request() {
            warn!("🔄️ Circuit breaker is open. Skipping this reconciliation run.");
            report.skipped_breaker_open = true;
            return Ok(report.finish());
        }
        if shutdown.is_triggered() {
            return Err(ReconciliationError::Interrupted);
        }
        self.expire_stale_claims(&mut report).await;
        let factions = self.db.factions().await.map_err(ReconciliationError::StorageError)?;
        debug!("🔄️ Reconciling {} factions", factions.len());
        let mut called_upstream = false;
        for faction in &factions {
            if shutdown.is_triggered() {
                info!("🔄️ Shutdown requested. Abandoning the run before faction {faction}.");
                return Err(ReconciliationError::Interrupted);
            }
            match self.reconcile_faction(faction, shutdown, &mut called_upstream, &mut report).await {
                Ok(FactionStep::Skipped) => report.factions_skipped += 1,
                Ok(FactionStep::Reconciled) => report.factions_checked += 1,
                Ok(FactionStep::BreakerOpen) => {
                    warn!("🔄️ Circuit breaker opened while reconciling {faction}. Leaving the rest for the next run.");
                    report.stopped_breaker_open = true;
                    break;
                },
                Err(ReconciliationError::StorageError(e)) => {
                    error!("🔄️ Storage error while reconciling {faction}. Moving on to the next faction. {e}");
                    report.storage_errors += 1;
                },
                Err(ReconciliationError::ApiError(e)) => {
                    warn!("🔄️ Could not fetch deposits for {faction}. {e}");
                    report.api_errors += 1;
                },
                Err(ReconciliationError::Interrupted) => {
                    info!("🔄️ Shutdown requested while reconciling {faction}");
                    return Err(ReconciliationError::Interrupted);
                },
            }
        }
        let report = report.finish();
        info!("🔄️ Reconciliation run complete. {report}");
        Ok(report)
    }

    /// Resets or expires abandoned claims across all factions. Failures are logged and counted, never fatal.
    async fn expire_stale_claims(&self, report: &mut ReconciliationReport) {
        let ttl = self.config.claim_ttl;
        let stale = match self.db.list_expired_claimed(ttl).await {
            Ok(stale) => stale,
            Err(e) => {
                error!("🔄️ Could not list stale claims. {e}");
                report.storage_errors += 1;
                return;
            },
        };
        if stale.is_empty() {
            trace!("🔄️ No stale claims");
            return;
        }
        let max_resets = i64::from(self.config.max_claim_resets);
        let (give_up, revive): (Vec<_>, Vec<_>) = stale.into_iter().partition(|r| r.reset_count >= max_resets);
        if !give_up.is_empty() {
            let ids = give_up.iter().map(|r| r.request_id.clone()).collect::<Vec<_>>();
            match self.db.mark_expired(&ids, ttl).await {
                Ok(n) => {
                    report.claims_expired += n;
                    for r in &give_up {
                        warn!(
                            "🔄️ Request {} for {} has been claimed and abandoned {} times. It is now Expired.",
                            r.request_id,
                            r.username,
                            r.reset_count + 1
                        );
                    }
                },
                Err(e) => {
                    error!("🔄️ Could not expire {} abandoned requests. {e}", ids.len());
                    report.storage_errors += 1;
                },
            }
        }
        if revive.is_empty() {
            return;
        }
        let ids = revive.iter().map(|r| r.request_id.clone()).collect::<Vec<_>>();
        match self.db.reset_expired(&ids, ttl).await {
            Ok(n) => {
                report.claims_reset += n;
                info!("🔄️ {n} stale claims reset to Pending");
            },
            Err(e) => {
                error!("🔄️ Could not reset {} stale claims. {e}", ids.len());
                report.storage_errors += 1;
                return;
            },
        }
        for stale in revive {
            // Only announce requests this pass actually reset
            let request = match self.db.fetch_request(&stale.request_id).await {
                Ok(Some(r)) if r.status == RequestStatus::Pending && r.reset_count > stale.reset_count => r,
                Ok(_) => continue,
                Err(e) => {
                    error!("🔄️ Could not reload request {}. {e}", stale.request_id);
                    report.storage_errors += 1;
                    continue;
                },
            };
            if !self.notifier.notify_payment_needed(&request).await {
                warn!("🔄️ Could not re-announce request {}", request.request_id);
                report.notification_failures += 1;
            }
        }
    }

    async fn reconcile_faction(
        &self,
        faction: &Faction,
        shutdown: &ShutdownSignal,
        called_upstream: &mut bool,
        report: &mut ReconciliationReport,
    ) -> Result<FactionStep, ReconciliationError<E>> {
        if !faction.has_credentials() {
            debug!("🔄️ {faction} has no API keys. Skipping.");
            return Ok(FactionStep::Skipped);
        }
        let open = self.db.list_open_for_faction(faction.faction_id).await.map_err(ReconciliationError::StorageError)?;
        if !open.iter().any(PaymentRequest::is_matchable) {
            trace!("🔄️ {faction} has no open payment requests");
            return Ok(FactionStep::Skipped);
        }
        if *called_upstream && !shutdown.sleep(self.config.faction_delay).await {
            return Err(ReconciliationError::Interrupted);
        }
        *called_upstream = true;
        debug!("🔄️ {faction} has {} open payment requests. Fetching deposits.", open.len());
        let feed = match self.fetcher.fetch_recent_deposits(&faction.credentials, self.config.lookback).await {
            Ok(feed) => feed,
            Err(e) => return classify_api_error(e),
        };
        match feed.interrupted_by {
            Some(OutcomeKind::Interrupted) => return Err(ReconciliationError::Interrupted),
            Some(kind) => {
                warn!("🔄️ Deposit feed for {faction} is incomplete ({kind}). Applying what was collected.");
                report.incomplete_feeds += 1;
            },
            None if feed.truncated => report.incomplete_feeds += 1,
            None => {},
        }
        self.settle(faction, &open, &feed, report).await?;
        if feed.interrupted_by == Some(OutcomeKind::BreakerOpen) {
            return Ok(FactionStep::BreakerOpen);
        }
        Ok(FactionStep::Reconciled)
    }

    /// Fulfils every open request that a deposit in `feed` pays for.
    async fn settle(
        &self,
        faction: &Faction,
        open: &[PaymentRequest],
        feed: &DepositFeed,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconciliationError<E>> {
        let deposits = parse_deposits(&feed.entries);
        report.deposits_seen += deposits.len();
        let mut unused = Vec::<DepositEvidence>::with_capacity(deposits.len());
        for deposit in deposits {
            if self.db.evidence_used(&deposit.news_id).await.map_err(ReconciliationError::StorageError)? {
                trace!("🔄️ Deposit {} has already settled a request", deposit.news_id);
                continue;
            }
            unused.push(deposit);
        }
        let matches = match_deposits(open, &unused, feed.clock_offset);
        trace!("🔄️ {faction}: {} deposits, {} matches", unused.len(), matches.len());
        for m in matches {
            let request_id = m.request.request_id.as_str();
            let fulfilled = self
                .db
                .fulfill(request_id, &self.config.verified_by, &m.evidence.news_id)
                .await
                .map_err(ReconciliationError::StorageError)?;
            if !fulfilled {
                debug!("🔄️ Request {request_id} or deposit {} was used by someone else first", m.evidence.news_id);
                report.fulfillment_conflicts += 1;
                continue;
            }
            report.requests_fulfilled += 1;
            info!(
                "🔄️ Request {request_id} ({} for {}) settled by {}'s deposit of {}",
                m.request.item_value, m.request.username, m.evidence.depositor_name, m.evidence.amount
            );
            let request = self
                .db
                .fetch_request(request_id)
                .await
                .map_err(ReconciliationError::StorageError)?
                .unwrap_or(m.request.clone());
            if !self.notifier.notify_payment_fulfilled(&request, &m.evidence).await {
                warn!("🔄️ Could not announce the settlement of request {request_id}");
                report.notification_failures += 1;
            }
        }
        Ok(())
    }
}

fn classify_api_error<E: std::error::Error>(e: GameApiError) -> Result<FactionStep, ReconciliationError<E>> {
    if e.is_breaker_open() {
        Ok(FactionStep::BreakerOpen)
    } else if e.is_interrupted() {
        Err(ReconciliationError::Interrupted)
    } else {
        Err(ReconciliationError::ApiError(e))
    }
}
