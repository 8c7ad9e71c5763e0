use std::sync::Arc;

use faction_common::Secret;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use thiserror::Error;

use crate::{GameApiConfig, GameApiError};

/// What came back from the wire, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Could not connect: {0}")]
    Connect(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Could not read response body: {0}")]
    Body(String),
    #[error("Transport failure: {0}")]
    Other(String),
}

/// The seam between [`crate::GameApi`] and the network.
#[allow(async_fn_in_trait)]
pub trait Transport: Clone {
    /// Performs a GET request against `url`, authenticating with `credential`.
    async fn get(&self, url: &str, credential: &Secret<String>) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`, with fixed connect and request timeouts.
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
}

impl HttpTransport {
    pub fn new(config: &GameApiConfig) -> Result<Self, GameApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("faction_payments/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GameApiError::Initialization(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str, credential: &Secret<String>) -> Result<RawResponse, TransportError> {
        let auth = HeaderValue::from_str(&format!("ApiKey {}", credential.reveal()))
            .map_err(|e| TransportError::Other(format!("Invalid credential header. {e}")))?;
        trace!("🌐️ GET {url}");
        let response = self.client.get(url).header(AUTHORIZATION, auth).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else if e.is_connect() || e.is_request() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Body(e.to_string())
            }
        })?;
        trace!("🌐️ HTTP {status} ({} bytes) from {url}", body.len());
        Ok(RawResponse { status, body: body.to_vec() })
    }
}
