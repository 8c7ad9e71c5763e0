use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use faction_common::{Money, Secret};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   RequestStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Waiting for someone to pay the member.
    Pending,
    /// Somebody has said they will pay. Reverts to `Pending` if they don't do so within the claim TTL.
    Claimed,
    /// A matching deposit was observed.
    Fulfilled,
    /// The claim went stale too many times and the request was given up on.
    Expired,
    /// Withdrawn by an administrator.
    Cancelled,
}

impl RequestStatus {
    /// Open requests are still waiting for a deposit and are considered for matching.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Claimed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "Pending"),
            RequestStatus::Claimed => write!(f, "Claimed"),
            RequestStatus::Fulfilled => write!(f, "Fulfilled"),
            RequestStatus::Expired => write!(f, "Expired"),
            RequestStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid request status: {0}")]
pub struct ConversionError(String);

impl FromStr for RequestStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Claimed" => Ok(Self::Claimed),
            "Fulfilled" => Ok(Self::Fulfilled),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------   PaymentRequest    ---------------------------------------------------------
/// A reimbursement owed to a faction member for an item they supplied.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub request_id: String,
    pub faction_id: i64,
    /// The member to be paid.
    pub user_id: i64,
    pub username: String,
    pub item_required: String,
    pub item_value: Money,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub fulfillment_evidence_id: Option<String>,
    pub verified_by: Option<String>,
    /// Number of times a stale claim on this request has been reverted to `Pending`.
    pub reset_count: i64,
}

impl PaymentRequest {
    /// Open, and worth something. Requests with a zero value can never be matched to a deposit.
    pub fn is_matchable(&self) -> bool {
        self.status.is_open() && self.item_value.is_positive()
    }
}

//--------------------------------------  NewPaymentRequest  ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    /// Opaque identifier assigned by the producer. Inserting the same id twice is a no-op.
    pub request_id: String,
    pub faction_id: i64,
    pub user_id: i64,
    pub username: String,
    pub item_required: String,
    pub item_value: Money,
    pub created_at: DateTime<Utc>,
}

impl NewPaymentRequest {
    pub fn new(request_id: &str, faction_id: i64, user_id: i64, username: &str, item: &str, value: Money) -> Self {
        Self {
            request_id: request_id.to_string(),
            faction_id,
            user_id,
            username: username.to_string(),
            item_required: item.to_string(),
            item_value: value,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------       Faction       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Faction {
    pub faction_id: i64,
    pub name: String,
    /// API keys in the order they should be tried.
    pub credentials: Vec<Secret<String>>,
}

impl Faction {
    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }
}

impl Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.faction_id)
    }
}

//--------------------------------------   DepositEvidence   ---------------------------------------------------------
/// A deposit into a member's faction balance, as reported by the faction news feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvidence {
    /// Id of the news item this deposit was read from.
    pub news_id: String,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub depositor_id: i64,
    pub depositor_name: String,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Claimed,
            RequestStatus::Fulfilled,
            RequestStatus::Expired,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("pending".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn only_pending_and_claimed_are_open() {
        assert!(RequestStatus::Pending.is_open());
        assert!(RequestStatus::Claimed.is_open());
        assert!(RequestStatus::Fulfilled.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }
}
