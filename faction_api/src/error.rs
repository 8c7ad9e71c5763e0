use thiserror::Error;

use crate::OutcomeKind;

#[derive(Debug, Error)]
pub enum GameApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("API call failed ({kind}). {message}")]
    Outcome { kind: OutcomeKind, message: String },
}

impl GameApiError {
    /// The outcome kind behind this error, if the error came from a classified API call.
    pub fn outcome_kind(&self) -> Option<OutcomeKind> {
        match self {
            Self::Outcome { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_breaker_open(&self) -> bool {
        self.outcome_kind() == Some(OutcomeKind::BreakerOpen)
    }

    pub fn is_interrupted(&self) -> bool {
        self.outcome_kind() == Some(OutcomeKind::Interrupted)
    }
}
