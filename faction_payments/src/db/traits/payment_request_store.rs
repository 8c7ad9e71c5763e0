use std::time::Duration;

use crate::{
    db_types::{NewPaymentRequest, PaymentRequest},
    InsertRequestResult,
};

/// Persistence for payment requests.
///
/// Requests are never deleted. Status only changes through the transition methods below, each of which checks the
/// current status in the same statement that changes it and reports whether it applied.
#[allow(async_fn_in_trait)]
pub trait PaymentRequestStore: Clone {
    type Error: std::error::Error;

    /// Stores a new `Pending` request. If a request with the same id exists, nothing is changed.
    async fn insert_request(&self, request: NewPaymentRequest) -> Result<InsertRequestResult, Self::Error>;

    async fn fetch_request(&self, request_id: &str) -> Result<Option<PaymentRequest>, Self::Error>;

    /// `Pending` → `Claimed`. Returns `false` if the request is not `Pending`, including when another claimant got
    /// there first.
    async fn claim(&self, request_id: &str, claimant: &str) -> Result<bool, Self::Error>;

    /// `Pending | Claimed` → `Fulfilled`.
    ///
    /// Returns `false` if the request is not open, or if `evidence_id` has already been used to fulfil another
    /// request. A request fulfilled without having been claimed gets `claimed_at = fulfilled_at`.
    async fn fulfill(&self, request_id: &str, verified_by: &str, evidence_id: &str) -> Result<bool, Self::Error>;

    /// Claimed requests whose claim is older than `ttl`, in store order.
    async fn list_expired_claimed(&self, ttl: Duration) -> Result<Vec<PaymentRequest>, Self::Error>;

    /// `Claimed` → `Pending` for those of `request_ids` whose claim is older than `ttl`. The claimant and claim time
    /// are cleared and `reset_count` goes up by one. Returns the number of requests reset.
    async fn reset_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, Self::Error>;

    /// `Claimed` → `Expired` for those of `request_ids` whose claim is older than `ttl`. Returns the number of
    /// requests expired.
    async fn mark_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, Self::Error>;

    /// `Pending | Claimed` → `Cancelled`.
    async fn cancel(&self, request_id: &str) -> Result<bool, Self::Error>;

    /// `Pending` and `Claimed` requests for the faction, in store order.
    async fn list_open_for_faction(&self, faction_id: i64) -> Result<Vec<PaymentRequest>, Self::Error>;

    /// Whether a news item has already been recorded as the evidence for some request.
    async fn evidence_used(&self, evidence_id: &str) -> Result<bool, Self::Error>;
}
