use std::{fmt::Debug, time::Duration};

use faction_common::Secret;
use log::*;
use sqlx::SqlitePool;

use super::{db_url, factions, new_pool, requests, SqliteDatabaseError, MIGRATOR};
use crate::{
    db_types::{Faction, NewPaymentRequest, PaymentRequest},
    FactionDirectory,
    InsertRequestResult,
    PaymentRequestStore,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `FP_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn upsert_faction(&self, faction_id: i64, name: &str) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        factions::upsert_faction(faction_id, name, &mut conn).await
    }

    pub async fn add_api_key(
        &self,
        faction_id: i64,
        api_key: &Secret<String>,
        priority: i64,
    ) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        factions::add_api_key(faction_id, api_key, priority, &mut conn).await
    }

    pub async fn deactivate_api_key(
        &self,
        faction_id: i64,
        api_key: &Secret<String>,
    ) -> Result<bool, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        factions::deactivate_api_key(faction_id, api_key, &mut conn).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl PaymentRequestStore for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_request(&self, request: NewPaymentRequest) -> Result<InsertRequestResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::idempotent_insert(request, &mut conn).await
    }

    async fn fetch_request(&self, request_id: &str) -> Result<Option<PaymentRequest>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(request_id, &mut conn).await
    }

    async fn claim(&self, request_id: &str, claimant: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::claim(request_id, claimant, &mut conn).await
    }

    async fn fulfill(&self, request_id: &str, verified_by: &str, evidence_id: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::fulfill(request_id, verified_by, evidence_id, &mut conn).await
    }

    async fn list_expired_claimed(&self, ttl: Duration) -> Result<Vec<PaymentRequest>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::list_expired_claimed(ttl, &mut conn).await
    }

    async fn reset_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::reset_expired(request_ids, ttl, &mut conn).await
    }

    async fn mark_expired(&self, request_ids: &[String], ttl: Duration) -> Result<u64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::mark_expired(request_ids, ttl, &mut conn).await
    }

    async fn cancel(&self, request_id: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::cancel(request_id, &mut conn).await
    }

    async fn list_open_for_faction(&self, faction_id: i64) -> Result<Vec<PaymentRequest>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::list_open_for_faction(faction_id, &mut conn).await
    }

    async fn evidence_used(&self, evidence_id: &str) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        requests::evidence_used(evidence_id, &mut conn).await
    }
}

impl FactionDirectory for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn factions(&self) -> Result<Vec<Faction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        factions::fetch_factions(&mut conn).await
    }
}
