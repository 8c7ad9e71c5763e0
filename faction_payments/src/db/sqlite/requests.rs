//! Payment request queries. Every function runs on the connection it is given and is a single statement, so each
//! transition is atomic without an explicit transaction.
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewPaymentRequest, PaymentRequest},
    InsertRequestResult,
};

pub async fn idempotent_insert(
    request: NewPaymentRequest,
    conn: &mut SqliteConnection,
) -> Result<InsertRequestResult, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            INSERT INTO payment_requests (
                request_id,
                faction_id,
                user_id,
                username,
                item_required,
                item_value,
                status,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'Pending', $7)
            ON CONFLICT (request_id) DO NOTHING
        "#,
    )
    .bind(&request.request_id)
    .bind(request.faction_id)
    .bind(request.user_id)
    .bind(&request.username)
    .bind(&request.item_required)
    .bind(request.item_value)
    .bind(request.created_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        debug!("🗃️ Payment request {} already exists", request.request_id);
        Ok(InsertRequestResult::AlreadyExists(request.request_id))
    } else {
        debug!(
            "🗃️ Payment request {} saved: {} owed to {} for {}",
            request.request_id, request.item_value, request.username, request.item_required
        );
        Ok(InsertRequestResult::Inserted(request.request_id))
    }
}

pub async fn fetch_request(
    request_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, SqliteDatabaseError> {
    let request = sqlx::query_as::<_, PaymentRequest>("SELECT * FROM payment_requests WHERE request_id = $1")
        .bind(request_id)
        .fetch_optional(conn)
        .await?;
    Ok(request)
}

pub async fn claim(request_id: &str, claimant: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_requests SET status = 'Claimed', claimed_by = $1, claimed_at = $2
            WHERE request_id = $3 AND status = 'Pending'
        "#,
    )
    .bind(claimant)
    .bind(Utc::now())
    .bind(request_id)
    .execute(conn)
    .await?;
    let claimed = result.rows_affected() == 1;
    if claimed {
        debug!("🗃️ Payment request {request_id} claimed by {claimant}");
    } else {
        debug!("🗃️ Payment request {request_id} could not be claimed by {claimant}. It is not pending.");
    }
    Ok(claimed)
}

pub async fn fulfill(
    request_id: &str,
    verified_by: &str,
    evidence_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_requests SET
                status = 'Fulfilled',
                fulfilled_at = $1,
                claimed_at = COALESCE(claimed_at, $1),
                fulfillment_evidence_id = $2,
                verified_by = $3
            WHERE request_id = $4
              AND status IN ('Pending', 'Claimed')
              AND NOT EXISTS (SELECT 1 FROM payment_requests WHERE fulfillment_evidence_id = $2)
        "#,
    )
    .bind(Utc::now())
    .bind(evidence_id)
    .bind(verified_by)
    .bind(request_id)
    .execute(conn)
    .await?;
    let fulfilled = result.rows_affected() == 1;
    if fulfilled {
        debug!("🗃️ Payment request {request_id} fulfilled by evidence {evidence_id}");
    } else {
        debug!("🗃️ Payment request {request_id} was not fulfilled. It is closed or evidence {evidence_id} is taken.");
    }
    Ok(fulfilled)
}

pub async fn list_expired_claimed(
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRequest>, SqliteDatabaseError> {
    let requests = sqlx::query_as::<_, PaymentRequest>(
        "SELECT * FROM payment_requests WHERE status = 'Claimed' AND claimed_at < $1 ORDER BY id ASC",
    )
    .bind(claim_cutoff(ttl))
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} claims are older than {ttl:?}", requests.len());
    Ok(requests)
}

pub async fn reset_expired(
    request_ids: &[String],
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    if request_ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "UPDATE payment_requests SET status = 'Pending', claimed_by = NULL, claimed_at = NULL, reset_count = \
         reset_count + 1 WHERE status = 'Claimed' AND claimed_at < ",
    );
    builder.push_bind(claim_cutoff(ttl));
    push_id_filter(&mut builder, request_ids);
    let count = builder.build().execute(conn).await?.rows_affected();
    debug!("🗃️ {count} stale claims reset to Pending");
    Ok(count)
}

pub async fn mark_expired(
    request_ids: &[String],
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    if request_ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "UPDATE payment_requests SET status = 'Expired', claimed_at = NULL WHERE status = 'Claimed' AND claimed_at < ",
    );
    builder.push_bind(claim_cutoff(ttl));
    push_id_filter(&mut builder, request_ids);
    let count = builder.build().execute(conn).await?.rows_affected();
    debug!("🗃️ {count} stale claims marked Expired");
    Ok(count)
}

pub async fn cancel(request_id: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_requests SET status = 'Cancelled', claimed_at = NULL
            WHERE request_id = $1 AND status IN ('Pending', 'Claimed')
        "#,
    )
    .bind(request_id)
    .execute(conn)
    .await?;
    let cancelled = result.rows_affected() == 1;
    if cancelled {
        info!("🗃️ Payment request {request_id} cancelled");
    }
    Ok(cancelled)
}

pub async fn list_open_for_faction(
    faction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRequest>, SqliteDatabaseError> {
    let requests = sqlx::query_as::<_, PaymentRequest>(
        r#"
            SELECT * FROM payment_requests
            WHERE faction_id = $1 AND status IN ('Pending', 'Claimed')
            ORDER BY id ASC
        "#,
    )
    .bind(faction_id)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ Faction {faction_id} has {} open payment requests", requests.len());
    Ok(requests)
}

pub async fn evidence_used(evidence_id: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let used = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM payment_requests WHERE fulfillment_evidence_id = $1)",
    )
    .bind(evidence_id)
    .fetch_one(conn)
    .await?;
    Ok(used)
}

/// Claims made before this instant are stale.
fn claim_cutoff(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn push_id_filter(builder: &mut QueryBuilder<'_, Sqlite>, request_ids: &[String]) {
    builder.push(" AND request_id IN (");
    let mut ids = builder.separated(", ");
    for id in request_ids {
        ids.push_bind(id.clone());
    }
    ids.push_unseparated(")");
}
