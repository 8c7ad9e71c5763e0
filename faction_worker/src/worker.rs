use std::time::Duration;

use faction_api::{HttpTransport, Transport};
use faction_common::ShutdownSignal;
use faction_payments::{
    FactionDirectory,
    NotificationChannel,
    PaymentNotifier,
    PaymentRequestStore,
    ReconciliationApi,
    ReconciliationReport,
    SqliteDatabase,
};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::errors::WorkerError;

pub type WorkerApi = ReconciliationApi<SqliteDatabase, NotificationChannel, HttpTransport>;

/// Starts the reconciliation worker. The returned handle completes once `shutdown` fires and the run in progress (if
/// any) has stopped.
pub fn start_reconciliation_worker(api: WorkerApi, interval: Duration, shutdown: ShutdownSignal) -> JoinHandle<usize> {
    tokio::spawn(async move { run_reconciliation_loop(&api, interval, shutdown).await })
}

/// Runs reconciliation batches back to back, one every `interval`, until `shutdown` fires. Returns the number of
/// batches that ran to completion.
///
/// Runs never overlap. If a batch takes longer than `interval`, the missed ticks are skipped and the next batch starts
/// on the following tick.
pub async fn run_reconciliation_loop<B, N, T, E>(
    api: &ReconciliationApi<B, N, T>,
    interval: Duration,
    shutdown: ShutdownSignal,
) -> usize
where
    B: PaymentRequestStore<Error = E> + FactionDirectory<Error = E>,
    N: PaymentNotifier,
    T: Transport,
    E: std::error::Error,
{
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("🕰️ Reconciliation worker started. Running every {}s", interval.as_secs());
    let mut completed = 0;
    loop {
        tokio::select! {
            _ = timer.tick() => {},
            _ = shutdown.triggered() => break,
        }
        trace!("🕰️ Starting reconciliation run");
        match run_once(api, &shutdown).await {
            Ok(report) => {
                completed += 1;
                if report.has_errors() {
                    warn!("🕰️ Reconciliation run finished with errors. {report}");
                }
            },
            Err(WorkerError::Interrupted) => break,
            Err(e) => error!("🕰️ {e} Trying again at the next interval."),
        }
    }
    info!("🕰️ Reconciliation worker stopped after {completed} completed runs");
    completed
}

/// Runs a single reconciliation batch.
pub async fn run_once<B, N, T, E>(
    api: &ReconciliationApi<B, N, T>,
    shutdown: &ShutdownSignal,
) -> Result<ReconciliationReport, WorkerError>
where
    B: PaymentRequestStore<Error = E> + FactionDirectory<Error = E>,
    N: PaymentNotifier,
    T: Transport,
    E: std::error::Error,
{
    match api.run(shutdown).await {
        Ok(report) => Ok(report),
        Err(e) if e.is_interrupted() => {
            info!("🕰️ Reconciliation run interrupted by shutdown");
            Err(WorkerError::Interrupted)
        },
        Err(e) => Err(WorkerError::ReconciliationError(e.to_string())),
    }
}
