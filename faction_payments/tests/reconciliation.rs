use std::{sync::Arc, time::Duration};

use chrono::Utc;
use faction_api::{
    test_utils::{news_response, status_response, timestamp_response, ScriptedTransport},
    BreakerConfig,
    CircuitBreaker,
    DepositFetcher,
    FeedConfig,
    GameApi,
    GameApiConfig,
    NewsEntry,
    RetryPolicy,
};
use faction_common::{Money, Secret, Shutdown, ShutdownSignal};
use faction_payments::{
    db_types::{DepositEvidence, Faction, NewPaymentRequest, PaymentRequest, RequestStatus},
    test_utils::{
        fixtures::{deposit_news, new_request},
        prepare_env::{backdate_claim, prepare_test_env},
    },
    FactionDirectory,
    InsertRequestResult,
    PaymentNotifier,
    PaymentRequestStore,
    ReconciliationApi,
    ReconciliationConfig,
    ReconciliationError,
    ReconciliationReport,
    SqliteDatabase,
};
use mockall::mock;
use thiserror::Error;

mock! {
    pub Notifier {}
    impl PaymentNotifier for Notifier {
        async fn notify_payment_needed(&self, request: &PaymentRequest) -> bool;
        async fn notify_payment_fulfilled(&self, request: &PaymentRequest, evidence: &DepositEvidence) -> bool;
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(String);

mock! {
    pub Store {}
    impl Clone for Store {
        fn clone(&self) -> Self;
    }
    impl PaymentRequestStore for Store {
        type Error = StoreError;
        async fn insert_request(&self, request: NewPaymentRequest) -> Result<InsertRequestResult, StoreError>;
        async fn fetch_request(&self, request_id: &str) -> Result<Option<PaymentRequest>, StoreError>;
        async fn claim(&self, request_id: &str, claimant: &str) -> Result<bool, StoreError>;
        async fn fulfill(&self, request_id: &str, verified_by: &str, evidence_id: &str) -> Result<bool, StoreError>;
        async fn list_expired_claimed(&self, ttl: Duration) -> Result<Vec<PaymentRequest>, StoreError>;
        async fn reset_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, StoreError>;
        async fn mark_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, StoreError>;
        async fn cancel(&self, request_id: &str) -> Result<bool, StoreError>;
        async fn list_open_for_faction(&self, faction_id: i64) -> Result<Vec<PaymentRequest>, StoreError>;
        async fn evidence_used(&self, evidence_id: &str) -> Result<bool, StoreError>;
    }
    impl FactionDirectory for Store {
        type Error = StoreError;
        async fn factions(&self) -> Result<Vec<Faction>, StoreError>;
    }
}

const HOUR: Duration = Duration::from_secs(3600);

fn now() -> i64 {
    Utc::now().timestamp()
}

/// An upstream whose clock reads `clock` and whose deposit feed holds `news`.
fn upstream(clock: i64, news: Vec<NewsEntry>) -> ScriptedTransport {
    ScriptedTransport::from_fn(move |req| {
        if req.path() == "/v2/torn/timestamp" {
            timestamp_response(clock)
        } else {
            news_response(&news)
        }
    })
}

fn fetcher(transport: ScriptedTransport, breaker: Arc<CircuitBreaker>) -> DepositFetcher<ScriptedTransport> {
    let config = GameApiConfig {
        base_url: "http://upstream.test".to_string(),
        retry: RetryPolicy { max_attempts: 1, ..Default::default() },
        ..Default::default()
    };
    DepositFetcher::new(GameApi::with_transport(&config, transport, breaker), FeedConfig::default())
}

fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(BreakerConfig { failure_threshold: threshold, cooldown: Duration::from_secs(60) }))
}

fn config() -> ReconciliationConfig {
    ReconciliationConfig {
        faction_delay: Duration::from_millis(1),
        verified_by: "test-engine".into(),
        ..Default::default()
    }
}

async fn register_faction(db: &SqliteDatabase, faction_id: i64) {
    db.upsert_faction(faction_id, &format!("Faction {faction_id}")).await.unwrap();
    db.add_api_key(faction_id, &Secret::from(format!("key-{faction_id}")), 0).await.unwrap();
}

#[tokio::test]
async fn unclaimed_request_is_fulfilled_by_a_matching_deposit() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 2_000_000)).await.unwrap();

    let t = now();
    let transport = upstream(t, vec![deposit_news("n-1", 99, 1_950_000, t - 30)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_needed().never();
    notifier
        .expect_notify_payment_fulfilled()
        .withf(|request, evidence| {
            request.request_id == "R1" &&
                request.status == RequestStatus::Fulfilled &&
                evidence.news_id == "n-1" &&
                evidence.amount == Money::from(1_950_000)
        })
        .times(1)
        .returning(|_, _| true);
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(transport, breaker(5)), config());

    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.requests_fulfilled, 1);
    assert_eq!(report.deposits_seen, 1);
    assert_eq!(report.factions_checked, 1);
    assert!(!report.has_errors());

    let r1 = db.fetch_request("R1").await.unwrap().unwrap();
    assert_eq!(r1.status, RequestStatus::Fulfilled);
    assert!(r1.fulfilled_at.is_some());
    assert_eq!(r1.fulfillment_evidence_id.as_deref(), Some("n-1"));
    assert_eq!(r1.verified_by.as_deref(), Some("test-engine"));
}

#[tokio::test]
async fn a_deposit_seen_again_does_not_settle_a_second_request() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 1_000_000)).await.unwrap();

    let t = now();
    let transport = upstream(t, vec![deposit_news("n-1", 99, 1_000_000, t - 30)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_fulfilled().times(1).returning(|_, _| true);
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(transport.clone(), breaker(5)), config());
    api.run(&ShutdownSignal::never()).await.unwrap();

    // Same member, same amount, and the next run's window still covers the old deposit
    db.insert_request(new_request("R2", 1, 99, 1_000_000)).await.unwrap();
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.requests_fulfilled, 0);
    assert_eq!(db.fetch_request("R2").await.unwrap().unwrap().status, RequestStatus::Pending);
}

#[tokio::test]
async fn deposits_made_before_the_claim_are_not_evidence() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 1_000_000)).await.unwrap();
    db.claim("R1", "alice").await.unwrap();

    let t = now();
    let transport = upstream(t, vec![deposit_news("n-1", 99, 1_000_000, t - 600)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_fulfilled().never();
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(transport, breaker(5)), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.deposits_seen, 1);
    assert_eq!(report.requests_fulfilled, 0);
    assert_eq!(db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Claimed);
}

async fn run_with_upstream_clock(offset: i64, deposit_age: i64) -> (ReconciliationReport, RequestStatus) {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 1_000_000)).await.unwrap();
    db.claim("R1", "alice").await.unwrap();

    let clock = now() + offset;
    let transport = upstream(clock, vec![deposit_news("n-1", 99, 1_000_000, clock - deposit_age)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_fulfilled().returning(|_, _| true);
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(transport, breaker(5)), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    let status = db.fetch_request("R1").await.unwrap().unwrap().status;
    (report, status)
}

#[tokio::test]
async fn claim_times_follow_a_lagging_upstream_clock() {
    // Upstream runs two hours behind. The deposit is stamped at upstream "now", after the claim.
    let (report, status) = run_with_upstream_clock(-7_200, 0).await;
    assert_eq!(report.requests_fulfilled, 1);
    assert_eq!(status, RequestStatus::Fulfilled);
}

#[tokio::test]
async fn claim_times_follow_a_leading_upstream_clock() {
    // Upstream runs two hours ahead. The deposit is ten upstream minutes old, so it predates the claim.
    let (report, status) = run_with_upstream_clock(7_200, 600).await;
    assert_eq!(report.deposits_seen, 1);
    assert_eq!(report.requests_fulfilled, 0);
    assert_eq!(status, RequestStatus::Claimed);
}

#[tokio::test]
async fn stale_claims_are_reset_and_announced_then_expired() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    db.insert_request(new_request("R1", 1, 99, 1_000)).await.unwrap();
    db.claim("R1", "alice").await.unwrap();
    backdate_claim(&db, "R1", HOUR * 2).await;

    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify_payment_needed()
        .withf(|request| request.request_id == "R1" && request.status == RequestStatus::Pending)
        .times(1)
        .returning(|_| true);
    let config = ReconciliationConfig { max_claim_resets: 1, ..config() };
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(upstream(now(), vec![]), breaker(5)), config);

    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.claims_reset, 1);
    let r1 = db.fetch_request("R1").await.unwrap().unwrap();
    assert_eq!(r1.status, RequestStatus::Pending);
    assert_eq!(r1.reset_count, 1);
    assert!(r1.claimed_by.is_none());

    // Abandoned a second time: given up on, and not announced again
    db.claim("R1", "bob").await.unwrap();
    backdate_claim(&db, "R1", HOUR * 2).await;
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.claims_reset, 0);
    assert_eq!(report.claims_expired, 1);
    assert_eq!(db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Expired);
}

#[tokio::test]
async fn failed_notifications_are_counted_not_fatal() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 1_000)).await.unwrap();
    let t = now();
    let transport = upstream(t, vec![deposit_news("n-1", 99, 1_000, t - 5)]);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_fulfilled().times(1).returning(|_, _| false);
    let api = ReconciliationApi::new(db.clone(), notifier, fetcher(transport, breaker(5)), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.requests_fulfilled, 1);
    assert_eq!(report.notification_failures, 1);
    assert_eq!(db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Fulfilled);
}

#[tokio::test]
async fn factions_without_work_make_no_upstream_calls() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.upsert_faction(2, "Keyless").await.unwrap();
    db.insert_request(new_request("R2", 2, 99, 1_000)).await.unwrap();
    let transport = upstream(now(), vec![]);
    let api = ReconciliationApi::new(db, MockNotifier::new(), fetcher(transport.clone(), breaker(5)), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.factions_skipped, 2);
    assert_eq!(report.factions_checked, 0);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn open_breaker_skips_the_whole_run() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    register_faction(&db, 1).await;
    db.insert_request(new_request("R1", 1, 99, 1_000)).await.unwrap();
    db.claim("R1", "alice").await.unwrap();
    backdate_claim(&db, "R1", HOUR * 2).await;
    let breaker = breaker(1);
    breaker.record_failure();
    let transport = upstream(now(), vec![]);
    let api = ReconciliationApi::new(db.clone(), MockNotifier::new(), fetcher(transport.clone(), breaker), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert!(report.skipped_breaker_open);
    assert_eq!(transport.request_count(), 0);
    // The expiry pass is skipped too
    assert_eq!(db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Claimed);
}

#[tokio::test]
async fn breaker_opening_mid_run_stops_further_factions() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    for faction in [1, 2, 3] {
        register_faction(&db, faction).await;
        db.insert_request(new_request(&format!("R{faction}"), faction, 99, 1_000)).await.unwrap();
    }
    let transport = ScriptedTransport::from_sequence(vec![status_response(503)]);
    let breaker = breaker(1);
    let api = ReconciliationApi::new(db, MockNotifier::new(), fetcher(transport.clone(), breaker.clone()), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.api_errors, 1);
    assert!(report.stopped_breaker_open);
    assert_eq!(transport.request_count(), 1);
    assert!(breaker.status().open);
    assert!(api.breaker_status().open);
}

#[tokio::test]
async fn shutdown_aborts_the_run() {
    let env = prepare_test_env().await;
    let db = env.db.clone();
    for faction in [1, 2] {
        register_faction(&db, faction).await;
        db.insert_request(new_request(&format!("R{faction}"), faction, 99, 1_000)).await.unwrap();
    }
    let transport = upstream(now(), vec![]);
    let config = ReconciliationConfig { faction_delay: Duration::from_secs(30), ..config() };
    let api = ReconciliationApi::new(db, MockNotifier::new(), fetcher(transport.clone(), breaker(5)), config);

    let shutdown = Shutdown::new();
    shutdown.trigger();
    let err = api.run(&shutdown.signal()).await.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(transport.request_count(), 0);

    // Interrupted during the pause between the two factions
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
    });
    let started = std::time::Instant::now();
    let err = api.run(&signal).await.unwrap_err();
    trigger.await.unwrap();
    assert!(matches!(err, ReconciliationError::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.count_path("/v2/faction/news"), 1);
}

#[tokio::test]
async fn a_storage_failure_only_affects_its_own_faction() {
    let _ = env_logger::try_init();
    let t = now();
    let request = PaymentRequest {
        request_id: "R2".to_string(),
        faction_id: 2,
        user_id: 99,
        username: "member99".to_string(),
        item_required: "Lockpick".to_string(),
        item_value: Money::from(1_000),
        status: RequestStatus::Pending,
        created_at: Utc::now(),
        claimed_by: None,
        claimed_at: None,
        fulfilled_at: None,
        fulfillment_evidence_id: None,
        verified_by: None,
        reset_count: 0,
    };
    let mut store = MockStore::new();
    store.expect_list_expired_claimed().returning(|_| Ok(vec![]));
    store.expect_factions().returning(|| {
        Ok(vec![
            Faction { faction_id: 1, name: "Broken".into(), credentials: vec![Secret::from("k1")] },
            Faction { faction_id: 2, name: "Healthy".into(), credentials: vec![Secret::from("k2")] },
        ])
    });
    store.expect_list_open_for_faction().returning(move |faction_id| {
        if faction_id == 1 {
            Err(StoreError("disk on fire".into()))
        } else {
            Ok(vec![request.clone()])
        }
    });
    store.expect_evidence_used().returning(|_| Ok(false));
    store
        .expect_fulfill()
        .withf(|id, _, evidence| id == "R2" && evidence == "n-2")
        .times(1)
        .returning(|_, _, _| Ok(true));
    store.expect_fetch_request().returning(|_| Ok(None));

    let mut notifier = MockNotifier::new();
    notifier.expect_notify_payment_fulfilled().times(1).returning(|_, _| true);
    let transport = upstream(t, vec![deposit_news("n-2", 99, 1_000, t - 10)]);
    let api = ReconciliationApi::new(store, notifier, fetcher(transport, breaker(5)), config());
    let report = api.run(&ShutdownSignal::never()).await.unwrap();
    assert_eq!(report.storage_errors, 1);
    assert_eq!(report.requests_fulfilled, 1);
    assert_eq!(report.factions_checked, 1);
}

#[tokio::test]
async fn directory_failure_fails_the_run() {
    let mut store = MockStore::new();
    store.expect_list_expired_claimed().returning(|_| Ok(vec![]));
    store.expect_factions().returning(|| Err(StoreError("no directory".into())));
    let transport = upstream(now(), vec![]);
    let api = ReconciliationApi::new(store, MockNotifier::new(), fetcher(transport, breaker(5)), config());
    let err = api.run(&ShutdownSignal::never()).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::StorageError(StoreError(_))));
}
