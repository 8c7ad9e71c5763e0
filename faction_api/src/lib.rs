//! # Faction API client
//!
//! A client for the upstream game API that never lets a failing upstream take the batch jobs down with it.
//!
//! * [`outcome`] classifies every call into a closed set of [`OutcomeKind`]s, with retry and fatal predicates.
//! * [`GameApi`] issues requests through a [`Transport`], retries transient failures according to a
//!   [`RetryPolicy`] and feeds a shared [`CircuitBreaker`].
//! * [`DepositFetcher`] pages through a faction's deposit news within a time window.
mod api;
mod breaker;
mod config;
mod data_objects;
mod error;
mod news;
pub mod outcome;
mod retry;
mod transport;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::GameApi;
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, CircuitBreakerStatus};
pub use config::GameApiConfig;
pub use data_objects::{NewsEntry, NewsResponse, TimestampResponse};
pub use error::GameApiError;
pub use news::{DepositFeed, DepositFetcher, FeedConfig, DEPOSIT_NEWS_CATEGORY};
pub use outcome::{ApiOutcome, OutcomeKind};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
