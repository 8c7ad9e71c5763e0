//! In-memory [`Transport`] for exercising the client without a network.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use faction_common::Secret;
use reqwest::Url;

use crate::{NewsEntry, RawResponse, Transport, TransportError};

pub type ScriptResult = Result<RawResponse, TransportError>;

/// A request as seen by the [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub credential: String,
}

impl RecordedRequest {
    pub fn path(&self) -> String {
        Url::parse(&self.url).map(|u| u.path().to_string()).unwrap_or_default()
    }

    pub fn param(&self, name: &str) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    pub fn param_i64(&self, name: &str) -> Option<i64> {
        self.param(name).and_then(|v| v.parse().ok())
    }
}

type Responder = dyn Fn(&RecordedRequest) -> ScriptResult + Send + Sync;

#[derive(Clone)]
pub struct ScriptedTransport {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedTransport {
    /// Answers every request by calling `f`.
    pub fn from_fn<F>(f: F) -> Self
    where F: Fn(&RecordedRequest) -> ScriptResult + Send + Sync + 'static {
        Self { responder: Arc::new(f), requests: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Answers requests with `responses`, in order. The last response is repeated once the script runs out. An empty
    /// script answers every request with a connection error.
    pub fn from_sequence(responses: Vec<ScriptResult>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::from_fn(move |_| {
            let mut queue = queue.lock().expect("script lock poisoned");
            match queue.len() {
                0 => Err(TransportError::Connect("script is empty".into())),
                1 => queue.front().cloned().expect("queue has one item"),
                _ => queue.pop_front().expect("queue has items"),
            }
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("request log poisoned").len()
    }

    /// Number of recorded requests whose path is `path`.
    pub fn count_path(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path() == path).count()
    }
}

impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, credential: &Secret<String>) -> Result<RawResponse, TransportError> {
        let request = RecordedRequest { url: url.to_string(), credential: credential.reveal().clone() };
        self.requests.lock().expect("request log poisoned").push(request.clone());
        (self.responder)(&request)
    }
}

pub fn json_response(status: u16, body: &str) -> ScriptResult {
    Ok(RawResponse { status, body: body.as_bytes().to_vec() })
}

pub fn status_response(status: u16) -> ScriptResult {
    Ok(RawResponse { status, body: Vec::new() })
}

pub fn timestamp_response(timestamp: i64) -> ScriptResult {
    json_response(200, &format!(r#"{{"timestamp": {timestamp}}}"#))
}

pub fn news_response(entries: &[NewsEntry]) -> ScriptResult {
    let body = serde_json::json!({ "news": entries }).to_string();
    json_response(200, &body)
}
