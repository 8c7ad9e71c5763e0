//! Process-wide circuit breaker for the upstream API.
//!
//! ```text
//! Closed    --(threshold consecutive temporary failures)--> Open
//! Open      --(cooldown elapsed)------------------------->  HalfOpen
//! HalfOpen  --(success)---------------------------------->  Closed
//! HalfOpen  --(temporary failure)------------------------>  Open (cooldown restarts)
//! ```
//!
//! One breaker is constructed per process and shared through an `Arc`. All state lives in atomics and transitions use
//! compare-and-swap, so concurrent callers never lose an update.
use std::{
    sync::atomic::{AtomicI64, AtomicU32, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;

/// `opened_at` value meaning "not open".
const CLOSED: i64 = 0;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(300) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStatus {
    /// True while calls are being refused. A half-open breaker lets calls through, so reports `false`.
    pub open: bool,
    pub half_open: bool,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown_ms: i64,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicI64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown_ms: i64::try_from(config.cooldown.as_millis()).unwrap_or(i64::MAX),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(CLOSED),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state_at(now_ms())
    }

    /// False only while the breaker is open and the cool-down has not yet elapsed.
    pub fn allows_request(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let state = self.state();
        let opened_at = match self.opened_at_ms.load(Ordering::SeqCst) {
            CLOSED => None,
            ms => DateTime::from_timestamp_millis(ms),
        };
        CircuitBreakerStatus {
            open: state == BreakerState::Open,
            half_open: state == BreakerState::HalfOpen,
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            opened_at,
        }
    }

    /// Any success closes the breaker and clears the failure count.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let previous = self.opened_at_ms.swap(CLOSED, Ordering::SeqCst);
        if previous != CLOSED {
            info!("⚡️ Upstream call succeeded. Circuit breaker closed");
        }
    }

    /// Records a temporary (upstream health) failure. Credential errors must not be recorded here.
    pub fn record_failure(&self) {
        self.record_failure_at(now_ms());
    }

    pub(crate) fn state_at(&self, now: i64) -> BreakerState {
        match self.opened_at_ms.load(Ordering::SeqCst) {
            CLOSED => BreakerState::Closed,
            opened if now.saturating_sub(opened) < self.cooldown_ms => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }

    pub(crate) fn record_failure_at(&self, now: i64) {
        let failures = self
            .consecutive_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .map(|n| n.saturating_add(1))
            .unwrap_or(u32::MAX);
        let opened = self.opened_at_ms.load(Ordering::SeqCst);
        if opened == CLOSED {
            if failures >= self.failure_threshold &&
                self.opened_at_ms.compare_exchange(CLOSED, now, Ordering::SeqCst, Ordering::SeqCst).is_ok()
            {
                warn!(
                    "⚡️ {failures} consecutive upstream failures. Circuit breaker is OPEN for the next {}s",
                    self.cooldown_ms / 1000
                );
            }
        } else if now.saturating_sub(opened) >= self.cooldown_ms &&
            self.opened_at_ms.compare_exchange(opened, now, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            warn!("⚡️ Probe call failed while half-open. Circuit breaker re-opened");
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        let cooldown = Duration::from_secs(cooldown_secs);
        CircuitBreaker::new(BreakerConfig { failure_threshold: threshold, cooldown })
    }

    #[test]
    fn starts_closed() {
        let b = breaker(3, 60);
        let status = b.status();
        assert!(!status.open);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.opened_at.is_none());
        assert!(b.allows_request());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        assert!(!b.status().open);
        b.record_failure();
        let status = b.status();
        assert!(status.open);
        assert_eq!(status.consecutive_failures, 3);
        assert!(status.opened_at.is_some());
        assert!(!b.allows_request());
    }

    #[test]
    fn success_closes_and_resets() {
        let b = breaker(2, 60);
        b.record_failure();
        b.record_failure();
        assert!(b.status().open);
        b.record_success();
        let status = b.status();
        assert!(!status.open);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.opened_at.is_none());
    }

    #[test]
    fn success_interrupts_a_failure_streak() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert!(!b.status().open);
    }

    #[test]
    fn half_open_after_cooldown_and_reopens_on_failure() {
        let b = breaker(2, 10);
        let t0 = 1_000_000;
        b.record_failure_at(t0);
        b.record_failure_at(t0);
        assert_eq!(b.state_at(t0 + 9_999), BreakerState::Open);
        assert_eq!(b.state_at(t0 + 10_000), BreakerState::HalfOpen);
        // Failures during the open period do not extend it
        b.record_failure_at(t0 + 5_000);
        assert_eq!(b.state_at(t0 + 10_000), BreakerState::HalfOpen);
        // A failed probe re-opens immediately, with a fresh cool-down
        b.record_failure_at(t0 + 10_500);
        assert_eq!(b.state_at(t0 + 10_500), BreakerState::Open);
        assert_eq!(b.state_at(t0 + 20_499), BreakerState::Open);
        assert_eq!(b.state_at(t0 + 20_500), BreakerState::HalfOpen);
        b.record_success();
        assert_eq!(b.state_at(t0 + 20_500), BreakerState::Closed);
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let b = Arc::new(breaker(1_000, 60));
        let handles = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        b.record_failure();
                    }
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().for_each(|h| h.join().unwrap());
        let status = b.status();
        assert_eq!(status.consecutive_failures, 800);
        assert!(!status.open);
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let b = breaker(0, 60);
        b.record_failure();
        assert!(b.status().open);
    }
}
