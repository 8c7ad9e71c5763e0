use faction_api::GameApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconciliationError<E: std::error::Error> {
    #[error("Storage error: {0}")]
    StorageError(E),
    #[error("Upstream API error: {0}")]
    ApiError(#[from] GameApiError),
    #[error("Reconciliation was interrupted by shutdown")]
    Interrupted,
}

impl<E: std::error::Error> ReconciliationError<E> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
