//! A read-only lookup of finished training runs on a seed, with no
//! identity attached.

use race_contracts::{GhostRunV1, ZoneHistoryEntryV1};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::StoreError;

/// Given the caller's own training session id, looks up its `seed_id` and
/// returns every other session finished on that seed.
pub async fn list_ghosts(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<GhostRunV1>, StoreError> {
    let session = crate::db::queries::training::get_training_session(pool, session_id)
        .await?
        .ok_or(StoreError::NotFound)?;

    let sessions =
        crate::db::queries::training::list_finished_ghosts(pool, session.seed_id, session_id).await?;

    Ok(sessions
        .into_iter()
        .map(|s| GhostRunV1 {
            zone_history: s
                .progress_nodes
                .into_iter()
                .map(|e| ZoneHistoryEntryV1 {
                    node_id: e.node_id,
                    igt_ms: e.igt_ms,
                    deaths: e.deaths,
                })
                .collect(),
            igt_ms: s.igt_ms,
            death_count: s.death_count,
        })
        .collect())
}
