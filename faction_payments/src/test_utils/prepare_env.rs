use std::time::Duration;

use chrono::Utc;
use log::*;
use tempfile::TempDir;

use crate::SqliteDatabase;

/// A migrated database in a temporary directory. The directory, and the database with it, is removed on drop.
pub struct TestDatabase {
    pub db: SqliteDatabase,
    _dir: TempDir,
}

impl TestDatabase {
    pub fn url(&self) -> &str {
        self.db.url()
    }
}

pub async fn prepare_test_env() -> TestDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    let dir = tempfile::tempdir().expect("Error creating temporary directory");
    let url = format!("sqlite://{}", dir.path().join("test_store.db").display());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
    TestDatabase { db, _dir: dir }
}

/// Moves a claim's timestamp `age` into the past, so that it looks abandoned.
pub async fn backdate_claim(db: &SqliteDatabase, request_id: &str, age: Duration) {
    let age = chrono::Duration::from_std(age).expect("age out of range");
    sqlx::query("UPDATE payment_requests SET claimed_at = $1 WHERE request_id = $2")
        .bind(Utc::now() - age)
        .bind(request_id)
        .execute(db.pool())
        .await
        .expect("Error backdating claim");
}
