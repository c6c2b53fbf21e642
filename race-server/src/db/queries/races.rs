use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::RaceRow;
use crate::domain::{Race, RaceStatus};
use crate::errors::StoreError;

fn parse_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn assemble(row: RaceRow) -> Result<Race, StoreError> {
    Ok(Race {
        id: row.id.parse().map_err(|_| StoreError::NotFound)?,
        name: row.name,
        organizer_id: row.organizer_id.parse().map_err(|_| StoreError::NotFound)?,
        status: RaceStatus::from_str(&row.status).ok_or(StoreError::NotFound)?,
        seed_id: row.seed_id.and_then(|s| s.parse().ok()),
        seeds_released_at: parse_ts(&row.seeds_released_at),
        started_at: parse_ts(&row.started_at),
        version: row.version,
    })
}

pub async fn get_race(pool: &SqlitePool, id: Uuid) -> Result<Option<Race>, StoreError> {
    let row = sqlx::query_as::<_, RaceRow>("SELECT * FROM races WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(assemble).transpose()
}

pub async fn insert_race(
    pool: &SqlitePool,
    id: Uuid,
    name: &str,
    organizer_id: Uuid,
) -> Result<Race, StoreError> {
    sqlx::query(
        "INSERT INTO races (id, name, organizer_id, status, version) VALUES (?, ?, ?, 'setup', 0)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(organizer_id.to_string())
    .execute(pool)
    .await?;

    get_race(pool, id).await?.ok_or(StoreError::NotFound)
}

/// Applies an in-memory `Race` snapshot back to the store with optimistic
/// concurrency: the write only lands if `version` still matches what was
/// read. `expected_version` is the version the caller last observed; the
/// row is bumped to `expected_version + 1` on success.
pub async fn save_race(
    pool: &SqlitePool,
    race: &Race,
    expected_version: i64,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE races SET status = ?, seed_id = ?, seeds_released_at = ?, started_at = ?, version = version + 1 \
         WHERE id = ? AND version = ?",
    )
    .bind(race.status.as_str())
    .bind(race.seed_id.map(|s| s.to_string()))
    .bind(race.seeds_released_at.map(|t| t.to_rfc3339()))
    .bind(race.started_at.map(|t| t.to_rfc3339()))
    .bind(race.id.to_string())
    .bind(expected_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict);
    }
    Ok(())
}
