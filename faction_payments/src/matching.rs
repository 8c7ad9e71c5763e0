//! Rules for deciding which open payment request a deposit pays for.
//!
//! A deposit matches a request when
//! * it went to the member the request is for,
//! * the amount is within 5% of the request's value (requests with no value never match), and
//! * it was made no earlier than the claim, if the request has been claimed. Upstream timestamps have one second
//!   resolution, so the comparison is made in whole seconds.
//!
//! Claim times come from the local clock while deposit times come from the upstream one. Callers pass the
//! `clock_offset` (upstream minus local, in seconds) measured for the feed, and claim times are shifted by it before
//! they are compared. The offset is read once per feed, so drift within a run is not corrected.
//!
//! Deposits are considered in feed order. Each deposit pays for at most one request and each request is paid by at most
//! one deposit. When several requests match the same deposit, the one whose value is closest to the amount wins, and
//! after that the one the store listed first.
use std::collections::HashSet;

use faction_common::Money;

use crate::db_types::{DepositEvidence, PaymentRequest};

pub const TOLERANCE_PERCENT: u128 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositMatch {
    pub request: PaymentRequest,
    pub evidence: DepositEvidence,
}

/// `|amount - expected| / expected <= 5%`, evaluated without division or floating point.
pub fn amount_within_tolerance(amount: Money, expected: Money) -> bool {
    if !expected.is_positive() {
        return false;
    }
    let expected_abs = expected.abs_diff(Money::from(0));
    amount.abs_diff(expected) * 100 <= expected_abs * TOLERANCE_PERCENT
}

pub fn is_match(request: &PaymentRequest, evidence: &DepositEvidence, clock_offset: i64) -> bool {
    request.is_matchable() &&
        evidence.recipient_id == request.user_id &&
        amount_within_tolerance(evidence.amount, request.item_value) &&
        request
            .claimed_at
            .map_or(true, |claimed| evidence.timestamp.timestamp() >= claimed.timestamp().saturating_add(clock_offset))
}

/// The index of the request in `candidates` that `evidence` should pay for, if any.
pub fn best_match(evidence: &DepositEvidence, candidates: &[PaymentRequest], clock_offset: i64) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, request)| is_match(request, evidence, clock_offset))
        .min_by_key(|(_, request)| request.item_value.abs_diff(evidence.amount))
        .map(|(i, _)| i)
}

/// Pairs deposits with open requests. Deposits are taken in the order given, and a repeated news id is only
/// considered once.
pub fn match_deposits(open: &[PaymentRequest], deposits: &[DepositEvidence], clock_offset: i64) -> Vec<DepositMatch> {
    let mut remaining = open.to_vec();
    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for evidence in deposits {
        if remaining.is_empty() {
            break;
        }
        if !seen.insert(evidence.news_id.as_str()) {
            continue;
        }
        if let Some(i) = best_match(evidence, &remaining, clock_offset) {
            let request = remaining.remove(i);
            matches.push(DepositMatch { request, evidence: evidence.clone() });
        }
    }
    matches
}
