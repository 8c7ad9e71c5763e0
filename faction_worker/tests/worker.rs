use std::{sync::Arc, time::Duration};

use chrono::Utc;
use faction_api::{
    test_utils::{news_response, timestamp_response, ScriptedTransport},
    CircuitBreaker,
    DepositFetcher,
    FeedConfig,
    GameApi,
    GameApiConfig,
};
use faction_common::{Secret, Shutdown};
use faction_payments::{
    db_types::RequestStatus,
    test_utils::{
        fixtures::{deposit_news, new_request},
        prepare_env::prepare_test_env,
    },
    LogNotifier,
    PaymentRequestStore,
    ReconciliationApi,
    ReconciliationConfig,
    SqliteDatabase,
};
use faction_worker::{
    errors::WorkerError,
    worker::{run_once, run_reconciliation_loop},
};

type TestEngine = ReconciliationApi<SqliteDatabase, LogNotifier, ScriptedTransport>;

fn engine(db: SqliteDatabase, transport: ScriptedTransport) -> TestEngine {
    let config = GameApiConfig { base_url: "http://upstream.test".to_string(), ..Default::default() };
    let client = GameApi::with_transport(&config, transport, Arc::new(CircuitBreaker::default()));
    let reconciliation = ReconciliationConfig { faction_delay: Duration::from_millis(1), ..Default::default() };
    ReconciliationApi::new(db, LogNotifier, DepositFetcher::new(client, FeedConfig::default()), reconciliation)
}

fn upstream_with_deposit(recipient_id: i64, amount: i64) -> ScriptedTransport {
    ScriptedTransport::from_fn(move |req| {
        let now = Utc::now().timestamp();
        if req.path() == "/v2/torn/timestamp" {
            timestamp_response(now)
        } else {
            news_response(&[deposit_news("n-1", recipient_id, amount, now - 10)])
        }
    })
}

async fn faction_with_request(db: &SqliteDatabase) {
    db.upsert_faction(1, "Test Faction").await.unwrap();
    db.add_api_key(1, &Secret::from("key"), 0).await.unwrap();
    db.insert_request(new_request("R1", 1, 99, 500_000)).await.unwrap();
}

#[tokio::test]
async fn single_run_settles_requests() {
    let env = prepare_test_env().await;
    faction_with_request(&env.db).await;
    let api = engine(env.db.clone(), upstream_with_deposit(99, 500_000));
    let report = run_once(&api, &Shutdown::new().signal()).await.unwrap();
    assert_eq!(report.requests_fulfilled, 1);
    assert_eq!(env.db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Fulfilled);
}

#[tokio::test]
async fn single_run_reports_shutdown() {
    let env = prepare_test_env().await;
    faction_with_request(&env.db).await;
    let transport = upstream_with_deposit(99, 500_000);
    let api = engine(env.db.clone(), transport.clone());
    let shutdown = Shutdown::new();
    shutdown.trigger();
    let err = run_once(&api, &shutdown.signal()).await.unwrap_err();
    assert!(matches!(err, WorkerError::Interrupted));
    assert_eq!(transport.request_count(), 0);
    assert_eq!(env.db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Pending);
}

#[tokio::test]
async fn loop_runs_until_shutdown() {
    let env = prepare_test_env().await;
    faction_with_request(&env.db).await;
    let transport = upstream_with_deposit(42, 1_000);
    let api = engine(env.db.clone(), transport.clone());
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown.trigger();
    });
    let completed =
        tokio::time::timeout(Duration::from_secs(10), run_reconciliation_loop(&api, Duration::from_millis(50), signal))
            .await
            .expect("worker loop did not stop on shutdown");
    trigger.await.unwrap();
    assert!(completed >= 2, "only {completed} runs completed");
    // Nothing matches, so every run queried the feed again
    assert!(transport.count_path("/v2/faction/news") >= completed);
    assert_eq!(env.db.fetch_request("R1").await.unwrap().unwrap().status, RequestStatus::Pending);
}
