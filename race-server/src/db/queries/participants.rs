use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::ParticipantRow;
use crate::domain::{Participant, ParticipantStatus, ZoneHistoryEntry};
use crate::errors::StoreError;

fn parse_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn assemble(row: ParticipantRow) -> Result<Participant, StoreError> {
    let zone_history: Vec<ZoneHistoryEntry> =
        serde_json::from_str::<Vec<race_contracts::ZoneHistoryEntryV1>>(&row.zone_history)
            .map_err(|_| StoreError::NotFound)?
            .into_iter()
            .map(|e| ZoneHistoryEntry {
                node_id: e.node_id,
                igt_ms: e.igt_ms,
                deaths: e.deaths,
            })
            .collect();

    Ok(Participant {
        id: row.id.parse().map_err(|_| StoreError::NotFound)?,
        race_id: row.race_id.parse().map_err(|_| StoreError::NotFound)?,
        user_id: row.user_id.parse().map_err(|_| StoreError::NotFound)?,
        login: row.login,
        display_name: row.display_name,
        mod_token: row.mod_token,
        status: ParticipantStatus::from_str(&row.status).ok_or(StoreError::NotFound)?,
        current_zone: row.current_zone,
        current_layer: row.current_layer as i32,
        igt_ms: row.igt_ms,
        death_count: row.death_count,
        zone_history,
        last_igt_change_at: parse_ts(&row.last_igt_change_at),
        finished_at: parse_ts(&row.finished_at),
        color_index: row.color_index as i32,
        is_live: false,
    })
}

pub async fn list_participants(
    pool: &SqlitePool,
    race_id: Uuid,
) -> Result<Vec<Participant>, StoreError> {
    let rows = sqlx::query_as::<_, ParticipantRow>(
        "SELECT * FROM participants WHERE race_id = ? ORDER BY color_index",
    )
    .bind(race_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(assemble).collect()
}

pub async fn get_participant_by_token(
    pool: &SqlitePool,
    mod_token: &str,
) -> Result<Option<Participant>, StoreError> {
    let row = sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participants WHERE mod_token = ?")
        .bind(mod_token)
        .fetch_optional(pool)
        .await?;

    row.map(assemble).transpose()
}

pub async fn insert_participant(
    pool: &SqlitePool,
    id: Uuid,
    race_id: Uuid,
    user_id: Uuid,
    login: &str,
    display_name: &str,
    mod_token: &str,
    color_index: i32,
) -> Result<Participant, StoreError> {
    sqlx::query(
        "INSERT INTO participants (id, race_id, user_id, login, display_name, mod_token, status, color_index) \
         VALUES (?, ?, ?, ?, ?, ?, 'registered', ?)",
    )
    .bind(id.to_string())
    .bind(race_id.to_string())
    .bind(user_id.to_string())
    .bind(login)
    .bind(display_name)
    .bind(mod_token)
    .bind(color_index)
    .execute(pool)
    .await?;

    get_participant_by_token(pool, mod_token)
        .await?
        .ok_or(StoreError::NotFound)
}

/// Full-row, last-writer-wins save. Participants carry no version column —
/// the race room is the single writer, so there is no concurrent writer to
/// race against.
pub async fn save_participant(pool: &SqlitePool, p: &Participant) -> Result<(), StoreError> {
    let zone_history_json = serde_json::to_string(
        &p.zone_history
            .iter()
            .map(|e| race_contracts::ZoneHistoryEntryV1 {
                node_id: e.node_id.clone(),
                igt_ms: e.igt_ms,
                deaths: e.deaths,
            })
            .collect::<Vec<_>>(),
    )
    .expect("zone history always serializes");

    sqlx::query(
        "UPDATE participants SET status = ?, current_zone = ?, current_layer = ?, igt_ms = ?, \
         death_count = ?, zone_history = ?, last_igt_change_at = ?, finished_at = ? WHERE id = ?",
    )
    .bind(p.status.as_str())
    .bind(&p.current_zone)
    .bind(p.current_layer)
    .bind(p.igt_ms)
    .bind(p.death_count)
    .bind(zone_history_json)
    .bind(p.last_igt_change_at.map(|t| t.to_rfc3339()))
    .bind(p.finished_at.map(|t| t.to_rfc3339()))
    .bind(p.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
