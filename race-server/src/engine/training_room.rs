use std::sync::Arc;

use chrono::Utc;
use race_contracts::{reason, ServerFrameV1};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::db::queries::{seeds as seed_queries, training as training_queries};
use crate::domain::{Seed, TrainingSession, TrainingStatus};
use crate::engine::registry::ConnectionRegistry;
use crate::errors::StoreError;

struct TrainingState {
    session: TrainingSession,
    seed: Seed,
}

/// A training session behaves like a one-participant race frozen in RUNNING:
/// no leaderboard, no organizer gating, immediate `race_start`. The room
/// shares the connection registry with race rooms but is keyed by session
/// id rather than race id.
pub struct TrainingRoom {
    pub session_id: Uuid,
    state: tokio::sync::Mutex<TrainingState>,
    pool: SqlitePool,
    registry: Arc<ConnectionRegistry>,
}

impl TrainingRoom {
    pub async fn load(
        pool: SqlitePool,
        registry: Arc<ConnectionRegistry>,
        session_id: Uuid,
    ) -> Result<Arc<TrainingRoom>, StoreError> {
        let session = training_queries::get_training_session(&pool, session_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        let seed = seed_queries::get_seed_for_training(&pool, session.seed_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(Arc::new(TrainingRoom {
            session_id,
            state: tokio::sync::Mutex::new(TrainingState { session, seed }),
            pool,
            registry,
        }))
    }

    pub async fn snapshot(&self) -> TrainingSession {
        self.state.lock().await.session.clone()
    }

    async fn save_and_notify(&self, state: &TrainingState) {
        if let Err(err) = training_queries::save_training_session(&self.pool, &state.session).await {
            warn!(error = %err, session_id = %self.session_id, "failed to persist training session");
        }
        self.registry
            .broadcast(self.session_id, ServerFrameV1::PlayerUpdate { player: state.session.to_wire_as_participant() })
            .await;
    }

    pub async fn apply_status(
        &self,
        igt_ms: i64,
        zone: Option<String>,
        death_count: i64,
    ) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.session.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }

        if igt_ms > state.session.igt_ms {
            state.session.igt_ms = igt_ms;
            state.session.last_igt_change_at = Some(Utc::now());
        }

        if let Some(zone) = zone {
            if let Some(tier) = state.seed.tier_of(&zone) {
                record_zone_and_deaths(&mut state.session, &zone, tier, death_count);
            }
        }

        self.save_and_notify(&state).await;
        Ok(())
    }

    /// `zone_entered` carries no `death_count` — only the zone and `igt_ms`
    /// advance, matching `RaceRoom::apply_zone_entered`.
    pub async fn apply_zone_entered(&self, to_zone: &str, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.session.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }
        if igt_ms > state.session.igt_ms {
            state.session.igt_ms = igt_ms;
            state.session.last_igt_change_at = Some(Utc::now());
        }
        if let Some(tier) = state.seed.tier_of(to_zone) {
            let unchanged_deaths = state.session.death_count;
            record_zone_and_deaths(&mut state.session, to_zone, tier, unchanged_deaths);
        }
        self.save_and_notify(&state).await;
        Ok(())
    }

    pub async fn apply_event_flag(&self, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.session.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }
        if igt_ms > state.session.igt_ms {
            state.session.igt_ms = igt_ms;
            state.session.last_igt_change_at = Some(Utc::now());
        }
        self.save_and_notify(&state).await;
        Ok(())
    }

    pub async fn apply_finished(&self, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.session.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }
        if igt_ms > state.session.igt_ms {
            state.session.igt_ms = igt_ms;
        }
        state.session.status = TrainingStatus::Finished;
        state.session.finished_at = Some(Utc::now());
        self.save_and_notify(&state).await;
        Ok(())
    }

    pub async fn abandon(&self) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.session.status.is_terminal() {
            return Ok(());
        }
        state.session.status = TrainingStatus::Abandoned;
        state.session.finished_at = Some(Utc::now());
        self.save_and_notify(&state).await;
        Ok(())
    }

    pub async fn race_state_frame(&self) -> ServerFrameV1 {
        let state = self.state.lock().await;
        ServerFrameV1::RaceState {
            race: training_race_info(&state.session),
            seed: state.seed.to_wire(),
            leaderboard: vec![state.session.to_wire_as_participant()],
            casters: vec![],
        }
    }
}

fn record_zone_and_deaths(session: &mut TrainingSession, node_id: &str, tier: i32, new_death_count: i64) {
    let is_new = !session.progress_nodes.iter().any(|e| e.node_id == node_id);
    if is_new {
        session.progress_nodes.push(crate::domain::participant::ZoneHistoryEntry {
            node_id: node_id.to_string(),
            igt_ms: session.igt_ms,
            deaths: 0,
        });
    }

    let delta = new_death_count - session.death_count;
    if delta > 0 {
        if let Some(entry) = session
            .progress_nodes
            .iter_mut()
            .find(|e| e.node_id == session.current_zone.clone().unwrap_or_default())
        {
            entry.deaths += delta;
        }
    }
    session.death_count = new_death_count;
    session.current_layer = session.current_layer.max(tier);
    session.current_zone = Some(node_id.to_string());
}

fn training_race_info(session: &TrainingSession) -> race_contracts::RaceInfoV1 {
    race_contracts::RaceInfoV1 {
        id: session.id,
        name: "training".to_string(),
        status: race_contracts::RaceStatusV1::Running,
        started_at: None,
        seeds_released_at: None,
    }
}
