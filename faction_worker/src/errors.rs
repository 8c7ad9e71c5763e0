use faction_api::GameApiError;
use faction_payments::{notifier::NotifierError, SqliteDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Database error. {0}")]
    DatabaseError(#[from] SqliteDatabaseError),
    #[error("Could not create the upstream API client. {0}")]
    ApiClientError(#[from] GameApiError),
    #[error("Could not create the notification channel. {0}")]
    NotifierError(#[from] NotifierError),
    #[error("Reconciliation run failed. {0}")]
    ReconciliationError(String),
    #[error("The reconciliation run was interrupted by shutdown")]
    Interrupted,
    #[error("The worker task failed. {0}")]
    TaskError(#[from] tokio::task::JoinError),
}
