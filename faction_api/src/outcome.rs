//! Outcome taxonomy for outbound API calls.
//!
//! Every call made through [`crate::GameApi`] ends in exactly one [`ApiOutcome`]. The [`OutcomeKind`] decides what
//! happens next:
//!
//! | Kind             | Retried | Counts against breaker | Notes                                       |
//! |------------------|---------|------------------------|---------------------------------------------|
//! | Success          | -       | resets it              |                                             |
//! | AuthError        | no      | no                     | try the next credential                     |
//! | ForbiddenError   | no      | no                     | try the next credential                     |
//! | NotFound         | no      | no                     |                                             |
//! | ClientError      | no      | no                     |                                             |
//! | RateLimited      | yes     | when exhausted         | uses the longer rate-limit delay            |
//! | ServerError      | yes     | when exhausted         |                                             |
//! | NetworkError     | yes     | when exhausted         |                                             |
//! | UnexpectedError  | yes     | when exhausted         | e.g. the body could not be read             |
//! | UnknownError     | yes     | when exhausted         | anything unrecognised                       |
//! | RetriesExhausted | -       | yes                    | terminal; wraps the last retryable kind     |
//! | BreakerOpen      | -       | -                      | no call was made                            |
//! | Interrupted      | -       | -                      | shutdown was requested mid-call or mid-wait |
use std::fmt::Display;

use log::*;
use serde::Deserialize;

use crate::transport::{RawResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    AuthError,
    ForbiddenError,
    NotFound,
    RateLimited,
    ClientError,
    ServerError,
    NetworkError,
    BreakerOpen,
    Interrupted,
    RetriesExhausted,
    UnexpectedError,
    UnknownError,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 13] = [
        OutcomeKind::Success,
        OutcomeKind::AuthError,
        OutcomeKind::ForbiddenError,
        OutcomeKind::NotFound,
        OutcomeKind::RateLimited,
        OutcomeKind::ClientError,
        OutcomeKind::ServerError,
        OutcomeKind::NetworkError,
        OutcomeKind::BreakerOpen,
        OutcomeKind::Interrupted,
        OutcomeKind::RetriesExhausted,
        OutcomeKind::UnexpectedError,
        OutcomeKind::UnknownError,
    ];

    /// Whether another attempt at the same call could reasonably succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkError | Self::UnexpectedError | Self::UnknownError
        )
    }

    /// Whether this outcome says something about the health of the upstream service.
    pub fn is_temporary(self) -> bool {
        self.is_retryable() || self == Self::RetriesExhausted
    }

    /// Whether the request itself (or the credential it was made with) is at fault. Repeating it will not help.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::AuthError | Self::ForbiddenError | Self::NotFound | Self::ClientError)
    }

    /// Authentication and authorization failures are per-credential, so callers may try another key.
    pub fn is_credential_error(self) -> bool {
        matches!(self, Self::AuthError | Self::ForbiddenError)
    }
}

impl Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::AuthError => "AuthError",
            Self::ForbiddenError => "ForbiddenError",
            Self::NotFound => "NotFound",
            Self::RateLimited => "RateLimited",
            Self::ClientError => "ClientError",
            Self::ServerError => "ServerError",
            Self::NetworkError => "NetworkError",
            Self::BreakerOpen => "BreakerOpen",
            Self::Interrupted => "Interrupted",
            Self::RetriesExhausted => "RetriesExhausted",
            Self::UnexpectedError => "UnexpectedError",
            Self::UnknownError => "UnknownError",
        };
        f.write_str(s)
    }
}

//--------------------------------------     ApiOutcome      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct ApiOutcome {
    kind: OutcomeKind,
    status: Option<u16>,
    body: Option<Vec<u8>>,
    error_message: Option<String>,
    last_kind: Option<OutcomeKind>,
    attempts: u32,
}

impl ApiOutcome {
    pub fn success(status: u16, body: Vec<u8>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            status: Some(status),
            body: Some(body),
            error_message: None,
            last_kind: None,
            attempts: 1,
        }
    }

    /// Builds a failed outcome. `Success` is not a failure, and is mapped to `UnexpectedError` so that a success never
    /// carries an error message.
    pub fn failure<S: Into<String>>(kind: OutcomeKind, message: S) -> Self {
        let kind = if kind == OutcomeKind::Success { OutcomeKind::UnexpectedError } else { kind };
        Self { kind, status: None, body: None, error_message: Some(message.into()), last_kind: None, attempts: 1 }
    }

    pub fn breaker_open() -> Self {
        let mut outcome = Self::failure(OutcomeKind::BreakerOpen, "Circuit breaker is open. No request was made");
        outcome.attempts = 0;
        outcome
    }

    pub fn interrupted() -> Self {
        Self::failure(OutcomeKind::Interrupted, "Shutdown requested before the call completed")
    }

    pub fn retries_exhausted(attempts: u32, last: &ApiOutcome) -> Self {
        let message = format!(
            "Gave up after {attempts} attempts. Last outcome: {} {}",
            last.kind,
            last.error_message.as_deref().unwrap_or_default()
        );
        Self {
            kind: OutcomeKind::RetriesExhausted,
            status: last.status,
            body: None,
            error_message: Some(message.trim_end().to_string()),
            last_kind: Some(last.kind),
            attempts,
        }
    }

    pub(crate) fn with_status(mut self, status: u16, body: Vec<u8>) -> Self {
        self.status = Some(status);
        if !body.is_empty() {
            self.body = Some(body);
        }
        self
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// For `RetriesExhausted`, the kind of the final attempt.
    pub fn last_kind(&self) -> Option<OutcomeKind> {
        self.last_kind
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Display for ApiOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.status, &self.error_message) {
            (Some(status), Some(msg)) => write!(f, "{} [HTTP {status}] {msg}", self.kind),
            (None, Some(msg)) => write!(f, "{} {msg}", self.kind),
            (Some(status), None) => write!(f, "{} [HTTP {status}]", self.kind),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}

//--------------------------------------     Classifier      ---------------------------------------------------------

/// Maps an HTTP status code onto an outcome kind.
pub fn classify_status(status: u16) -> OutcomeKind {
    match status {
        200..=299 => OutcomeKind::Success,
        401 => OutcomeKind::AuthError,
        403 => OutcomeKind::ForbiddenError,
        404 => OutcomeKind::NotFound,
        429 => OutcomeKind::RateLimited,
        400..=499 => OutcomeKind::ClientError,
        500..=599 => OutcomeKind::ServerError,
        _ => OutcomeKind::UnknownError,
    }
}

/// Maps the numeric code of an upstream error envelope onto an outcome kind.
pub fn classify_envelope_code(code: i64) -> OutcomeKind {
    match code {
        0 => OutcomeKind::UnknownError,
        1 | 2 | 10 | 13 | 18 => OutcomeKind::AuthError,
        7 | 16 => OutcomeKind::ForbiddenError,
        6 => OutcomeKind::NotFound,
        5 | 8 | 11 | 14 => OutcomeKind::RateLimited,
        9 | 12 | 15 | 17 => OutcomeKind::ServerError,
        _ => OutcomeKind::ClientError,
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: EnvelopeDetail,
}

#[derive(Deserialize)]
struct EnvelopeDetail {
    code: i64,
    #[serde(default)]
    error: String,
}

/// The upstream reports some failures inside an HTTP 200 response as `{"error": {"code": n, "error": "..."}}`.
fn error_envelope(body: &[u8]) -> Option<EnvelopeDetail> {
    if body.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'{') {
        return None;
    }
    serde_json::from_slice::<ErrorEnvelope>(body).ok().map(|e| e.error)
}

/// Produces exactly one outcome for a raw transport result.
pub fn classify(result: Result<RawResponse, TransportError>) -> ApiOutcome {
    match result {
        Ok(RawResponse { status, body }) => match classify_status(status) {
            OutcomeKind::Success => match error_envelope(&body) {
                Some(envelope) => {
                    let kind = classify_envelope_code(envelope.code);
                    trace!("🌐️ HTTP {status} carried an error envelope (code {}). Classified as {kind}", envelope.code);
                    ApiOutcome::failure(kind, format!("Upstream error {}: {}", envelope.code, envelope.error))
                        .with_status(status, body)
                },
                None => ApiOutcome::success(status, body),
            },
            kind => {
                let message = String::from_utf8_lossy(&body).chars().take(256).collect::<String>();
                ApiOutcome::failure(kind, message).with_status(status, body)
            },
        },
        Err(e) => {
            let kind = match e {
                TransportError::Connect(_) | TransportError::Timeout(_) => OutcomeKind::NetworkError,
                TransportError::Body(_) => OutcomeKind::UnexpectedError,
                TransportError::Other(_) => OutcomeKind::UnknownError,
            };
            ApiOutcome::failure(kind, e.to_string())
        },
    }
}
