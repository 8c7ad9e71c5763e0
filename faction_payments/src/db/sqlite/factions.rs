use std::collections::HashMap;

use faction_common::Secret;
use log::*;
use sqlx::{FromRow, SqliteConnection};

use crate::{db::sqlite::SqliteDatabaseError, db_types::Faction};

#[derive(FromRow)]
struct FactionRow {
    faction_id: i64,
    name: String,
}

#[derive(FromRow)]
struct KeyRow {
    faction_id: i64,
    api_key: String,
}

/// All factions, ordered by id, each with its active API keys in priority order.
pub async fn fetch_factions(conn: &mut SqliteConnection) -> Result<Vec<Faction>, SqliteDatabaseError> {
    let factions = sqlx::query_as::<_, FactionRow>("SELECT faction_id, name FROM factions ORDER BY faction_id ASC")
        .fetch_all(&mut *conn)
        .await?;
    let keys = sqlx::query_as::<_, KeyRow>(
        "SELECT faction_id, api_key FROM faction_api_keys WHERE active = TRUE ORDER BY faction_id, priority, id",
    )
    .fetch_all(conn)
    .await?;
    let mut keys_by_faction = HashMap::<i64, Vec<Secret<String>>>::new();
    for key in keys {
        keys_by_faction.entry(key.faction_id).or_default().push(Secret::new(key.api_key));
    }
    let result = factions
        .into_iter()
        .map(|f| Faction {
            credentials: keys_by_faction.remove(&f.faction_id).unwrap_or_default(),
            faction_id: f.faction_id,
            name: f.name,
        })
        .collect::<Vec<_>>();
    trace!("🗃️ Fetched {} factions", result.len());
    Ok(result)
}

/// Registers a faction, or renames it if it is already registered.
pub async fn upsert_faction(
    faction_id: i64,
    name: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        "INSERT INTO factions (faction_id, name) VALUES ($1, $2) ON CONFLICT (faction_id) DO UPDATE SET name = $2",
    )
    .bind(faction_id)
    .bind(name)
    .execute(conn)
    .await?;
    debug!("🗃️ Faction {name} [{faction_id}] registered");
    Ok(())
}

/// Adds an API key for a faction. Adding a key that is already known re-activates it with the new priority.
pub async fn add_api_key(
    faction_id: i64,
    api_key: &Secret<String>,
    priority: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM factions WHERE faction_id = $1)")
        .bind(faction_id)
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Err(SqliteDatabaseError::FactionNotFound(faction_id));
    }
    sqlx::query(
        r#"
            INSERT INTO faction_api_keys (faction_id, api_key, priority, active) VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (faction_id, api_key) DO UPDATE SET priority = $3, active = TRUE
        "#,
    )
    .bind(faction_id)
    .bind(api_key.reveal())
    .bind(priority)
    .execute(conn)
    .await?;
    debug!("🗃️ API key added for faction {faction_id}");
    Ok(())
}

/// Stops using an API key, e.g. after it has been revoked upstream. Returns whether the key was active.
pub async fn deactivate_api_key(
    faction_id: i64,
    api_key: &Secret<String>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE faction_api_keys SET active = FALSE WHERE faction_id = $1 AND api_key = $2 AND active = TRUE",
    )
    .bind(faction_id)
    .bind(api_key.reveal())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
