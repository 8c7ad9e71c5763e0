use std::sync::Arc;

use chrono::{DateTime, Utc};
use faction_common::{Secret, ShutdownSignal};
use log::*;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::{
    outcome::classify,
    ApiOutcome,
    CircuitBreaker,
    CircuitBreakerStatus,
    GameApiConfig,
    GameApiError,
    HttpTransport,
    OutcomeKind,
    RetryPolicy,
    TimestampResponse,
    Transport,
};

/// Client for the upstream game API.
///
/// Every call goes through [`GameApi::execute`], which consults the shared [`CircuitBreaker`] before touching the
/// network, retries transient failures according to the [`RetryPolicy`], and reports the final result back to the
/// breaker. Clones share the same breaker and transport.
#[derive(Clone)]
pub struct GameApi<T = HttpTransport> {
    base_url: String,
    transport: T,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl GameApi<HttpTransport> {
    pub fn new(config: &GameApiConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, GameApiError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(config, transport, breaker))
    }
}

impl<T: Transport> GameApi<T> {
    pub fn with_transport(config: &GameApiConfig, transport: T, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            breaker,
            retry: config.retry.clone(),
            shutdown: ShutdownSignal::never(),
        }
    }

    /// Calls made by this client (and its clones) give up with `Interrupted` once `signal` fires.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.status()
    }

    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, GameApiError> {
        let base = format!("{}{path}", self.base_url);
        Url::parse_with_params(&base, params).map_err(|e| GameApiError::InvalidUrl(format!("{base}: {e}")))
    }

    /// Executes a single GET against `url` with one credential.
    ///
    /// * Fails fast with `BreakerOpen` if the breaker refuses calls.
    /// * Retries retryable outcomes, waiting between attempts. If the budget runs out, `RetriesExhausted` is returned
    ///   and the breaker records a failure.
    /// * Credential and other caller errors are returned immediately and leave the breaker alone.
    /// * A success closes the breaker.
    /// * If shutdown is signalled during the call or a backoff delay, `Interrupted` is returned.
    pub async fn execute(&self, url: &str, credential: &Secret<String>) -> ApiOutcome {
        if !self.breaker.allows_request() {
            debug!("🌐️ Circuit breaker is open. Skipping call to {}", redact(url));
            return ApiOutcome::breaker_open();
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                result = self.transport.get(url, credential) => classify(result).with_attempts(attempt),
                _ = self.shutdown.triggered() => {
                    info!("🌐️ Shutdown requested during call to {}", redact(url));
                    return ApiOutcome::interrupted();
                },
            };
            if outcome.is_success() {
                self.breaker.record_success();
                trace!("🌐️ {} succeeded after {attempt} attempt(s)", redact(url));
                return outcome;
            }
            if !outcome.retryable() {
                debug!("🌐️ {} failed with a non-retryable outcome: {outcome}", redact(url));
                return outcome;
            }
            if !self.retry.should_retry(outcome.kind(), attempt) {
                warn!("🌐️ {} failed after {attempt} attempts. Last outcome: {outcome}", redact(url));
                self.breaker.record_failure();
                return ApiOutcome::retries_exhausted(attempt, &outcome);
            }
            let delay = self.retry.delay_for(outcome.kind(), attempt);
            debug!("🌐️ Attempt {attempt} of {} failed ({outcome}). Retrying in {delay:?}", redact(url));
            if !self.shutdown.sleep(delay).await {
                info!("🌐️ Shutdown requested while waiting to retry {}", redact(url));
                return ApiOutcome::interrupted();
            }
        }
    }

    /// Tries each credential in turn until one is accepted.
    ///
    /// Only credential errors (`AuthError`, `ForbiddenError`) move on to the next credential. Any other outcome,
    /// success or failure, is returned as-is. If every credential is rejected, the last rejection is returned.
    pub async fn execute_with_credentials(&self, url: &str, credentials: &[Secret<String>]) -> ApiOutcome {
        let mut last = ApiOutcome::failure(OutcomeKind::AuthError, "No credentials available");
        for (i, credential) in credentials.iter().enumerate() {
            let outcome = self.execute(url, credential).await;
            if !outcome.kind().is_credential_error() {
                return outcome;
            }
            warn!("🌐️ Credential #{} of {} was rejected: {outcome}", i + 1, credentials.len());
            last = outcome;
        }
        last
    }

    /// GETs `path` and deserializes the JSON body.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        credentials: &[Secret<String>],
    ) -> Result<R, GameApiError> {
        let url = self.url(path, params)?;
        let outcome = self.execute_with_credentials(url.as_str(), credentials).await;
        parse_json(&outcome)
    }

    /// The upstream server's current time. Used instead of the local clock, which may drift inside containers.
    pub async fn server_time(&self, credentials: &[Secret<String>]) -> Result<DateTime<Utc>, GameApiError> {
        let response = self.get_json::<TimestampResponse>("/v2/torn/timestamp", &[], credentials).await?;
        DateTime::from_timestamp(response.timestamp, 0)
            .ok_or_else(|| GameApiError::JsonError(format!("Invalid server timestamp: {}", response.timestamp)))
    }
}

pub(crate) fn parse_json<R: DeserializeOwned>(outcome: &ApiOutcome) -> Result<R, GameApiError> {
    if !outcome.is_success() {
        return Err(GameApiError::Outcome {
            kind: outcome.kind(),
            message: outcome.error_message().unwrap_or_default().to_string(),
        });
    }
    let body = outcome.body().unwrap_or_default();
    serde_json::from_slice::<R>(body).map_err(|e| GameApiError::JsonError(e.to_string()))
}

/// Strips the query string from a URL for logging. Query parameters may carry keys on some endpoints.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
