use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::TrainingSessionRow;
use crate::domain::participant::ZoneHistoryEntry;
use crate::domain::{TrainingSession, TrainingStatus};
use crate::errors::StoreError;

fn parse_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn assemble(row: TrainingSessionRow) -> Result<TrainingSession, StoreError> {
    let progress_nodes: Vec<ZoneHistoryEntry> =
        serde_json::from_str::<Vec<race_contracts::ZoneHistoryEntryV1>>(&row.progress_nodes)
            .map_err(|_| StoreError::NotFound)?
            .into_iter()
            .map(|e| ZoneHistoryEntry {
                node_id: e.node_id,
                igt_ms: e.igt_ms,
                deaths: e.deaths,
            })
            .collect();

    Ok(TrainingSession {
        id: row.id.parse().map_err(|_| StoreError::NotFound)?,
        user_id: row.user_id.parse().map_err(|_| StoreError::NotFound)?,
        login: row.login,
        display_name: row.display_name,
        seed_id: row.seed_id.parse().map_err(|_| StoreError::NotFound)?,
        mod_token: row.mod_token,
        status: TrainingStatus::from_str(&row.status).ok_or(StoreError::NotFound)?,
        current_zone: row.current_zone,
        current_layer: row.current_layer as i32,
        igt_ms: row.igt_ms,
        death_count: row.death_count,
        progress_nodes,
        last_igt_change_at: parse_ts(&row.last_igt_change_at),
        finished_at: parse_ts(&row.finished_at),
    })
}

pub async fn get_training_session(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<TrainingSession>, StoreError> {
    let row = sqlx::query_as::<_, TrainingSessionRow>("SELECT * FROM training_sessions WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(assemble).transpose()
}

pub async fn get_training_session_by_token(
    pool: &SqlitePool,
    mod_token: &str,
) -> Result<Option<TrainingSession>, StoreError> {
    let row = sqlx::query_as::<_, TrainingSessionRow>(
        "SELECT * FROM training_sessions WHERE mod_token = ?",
    )
    .bind(mod_token)
    .fetch_optional(pool)
    .await?;

    row.map(assemble).transpose()
}

pub async fn insert_training_session(
    pool: &SqlitePool,
    id: Uuid,
    user_id: Uuid,
    login: &str,
    display_name: &str,
    seed_id: Uuid,
    mod_token: &str,
) -> Result<TrainingSession, StoreError> {
    sqlx::query(
        "INSERT INTO training_sessions (id, user_id, login, display_name, seed_id, mod_token, status) \
         VALUES (?, ?, ?, ?, ?, ?, 'active')",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(login)
    .bind(display_name)
    .bind(seed_id.to_string())
    .bind(mod_token)
    .execute(pool)
    .await?;

    get_training_session(pool, id).await?.ok_or(StoreError::NotFound)
}

pub async fn save_training_session(
    pool: &SqlitePool,
    s: &TrainingSession,
) -> Result<(), StoreError> {
    let progress_json = serde_json::to_string(
        &s.progress_nodes
            .iter()
            .map(|e| race_contracts::ZoneHistoryEntryV1 {
                node_id: e.node_id.clone(),
                igt_ms: e.igt_ms,
                deaths: e.deaths,
            })
            .collect::<Vec<_>>(),
    )
    .expect("progress nodes always serialize");

    sqlx::query(
        "UPDATE training_sessions SET status = ?, current_zone = ?, current_layer = ?, igt_ms = ?, \
         death_count = ?, progress_nodes = ?, last_igt_change_at = ?, finished_at = ? WHERE id = ?",
    )
    .bind(s.status.as_str())
    .bind(&s.current_zone)
    .bind(s.current_layer)
    .bind(s.igt_ms)
    .bind(s.death_count)
    .bind(progress_json)
    .bind(s.last_igt_change_at.map(|t| t.to_rfc3339()))
    .bind(s.finished_at.map(|t| t.to_rfc3339()))
    .bind(s.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Other finished sessions on the same seed, excluding `exclude_session_id`
/// itself. Active sessions are never included; no user identity is returned.
/// Excluding by session id (rather than user id) lets a user with two
/// sessions on the same seed still see their own other finished run.
pub async fn list_finished_ghosts(
    pool: &SqlitePool,
    seed_id: Uuid,
    exclude_session_id: Uuid,
) -> Result<Vec<TrainingSession>, StoreError> {
    let rows = sqlx::query_as::<_, TrainingSessionRow>(
        "SELECT * FROM training_sessions WHERE seed_id = ? AND status = 'finished' AND id != ? \
         ORDER BY igt_ms ASC",
    )
    .bind(seed_id.to_string())
    .bind(exclude_session_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(assemble).collect()
}
