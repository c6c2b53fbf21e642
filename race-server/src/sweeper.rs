//! Inactivity sweeper: a single background task that force-abandons
//! participants who stopped advancing `igt_ms` a while ago.

use tracing::{info, warn};

use crate::api::state::AppState;
use crate::control;

/// Runs until the passed-in `shutdown` signal resolves, draining the
/// current tick before returning.
pub async fn run(state: AppState, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(state.config.sweep_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_once(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("inactivity sweeper shutting down");
                    break;
                }
            }
        }
    }
}

async fn sweep_once(state: &AppState) {
    let threshold_secs = state.config.inactivity_threshold.as_secs() as i64;
    let race_ids = state.rooms.all_race_ids().await;

    for race_id in race_ids {
        let room = match state.rooms.get_or_load_race(race_id).await {
            Ok(room) => room,
            Err(err) => {
                warn!(error = %err, race_id = %race_id, "sweeper failed to load race room");
                continue;
            }
        };

        let inactive = room.inactive_playing_participants(threshold_secs).await;
        for participant_id in inactive {
            if let Err(err) = control::force_abandon(state, participant_id).await {
                warn!(error = %err, participant_id = %participant_id, "sweeper force-abandon failed");
            } else {
                info!(participant_id = %participant_id, race_id = %race_id, "sweeper abandoned inactive participant");
            }
        }
    }

    state.rooms.evict_finished().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sweep_once_is_a_noop_with_no_loaded_rooms() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let config = crate::api::state::RuntimeConfig {
            auth_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            leaderboard_coalesce: Duration::from_millis(100),
            inactivity_threshold: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        };
        let state = AppState::new(pool, config);

        sweep_once(&state).await; // should not panic with an empty room set
    }
}
