use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use race_contracts::{reason, ServerFrameV1};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::queries::{participants as participant_queries, races as race_queries, seeds as seed_queries};
use crate::domain::{Caster, Participant, ParticipantStatus, Race, RaceStatus, Seed};
use crate::engine::leaderboard;
use crate::engine::registry::ConnectionRegistry;
use crate::errors::{ControlError, StoreError};

struct RoomState {
    race: Race,
    participants: Vec<Participant>,
    seed: Seed,
    casters: Vec<Caster>,
    registration_order: HashMap<Uuid, usize>,
    leaderboard_dirty: bool,
    missed_pongs: HashMap<Uuid, u32>,
}

/// The in-memory authority for one active race. Every mutation is
/// serialized behind `state`'s lock: one room, one mutable copy, store
/// writes go through it rather than around it.
pub struct RaceRoom {
    pub race_id: Uuid,
    state: tokio::sync::Mutex<RoomState>,
    pool: SqlitePool,
    registry: Arc<ConnectionRegistry>,
}

/// Two missed pongs close the mod session without touching participant
/// status.
const MAX_MISSED_PONGS: u32 = 2;

impl RaceRoom {
    pub async fn load(
        pool: SqlitePool,
        registry: Arc<ConnectionRegistry>,
        race_id: Uuid,
    ) -> Result<Arc<RaceRoom>, StoreError> {
        let race = race_queries::get_race(&pool, race_id).await?.ok_or(StoreError::NotFound)?;
        let participants = participant_queries::list_participants(&pool, race_id).await?;
        let seed = match race.seed_id {
            Some(seed_id) => seed_queries::get_seed(&pool, seed_id).await?.ok_or(StoreError::NotFound)?,
            None => Seed {
                id: Uuid::nil(),
                pool_name: String::new(),
                nodes: vec![],
                total_layers: 0,
            },
        };
        let casters = crate::db::queries::casters::list_casters(&pool, race_id).await?;

        let registration_order = participants
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id, idx))
            .collect();

        Ok(Arc::new(RaceRoom {
            race_id,
            state: tokio::sync::Mutex::new(RoomState {
                race,
                participants,
                seed,
                casters,
                registration_order,
                leaderboard_dirty: false,
                missed_pongs: HashMap::new(),
            }),
            pool,
            registry,
        }))
    }

    pub async fn race_state_frame(&self) -> ServerFrameV1 {
        let state = self.state.lock().await;
        self.build_race_state_frame(&state)
    }

    fn build_race_state_frame(&self, state: &RoomState) -> ServerFrameV1 {
        let order = &state.registration_order;
        let sorted = leaderboard::sort_participants(&state.participants, &state.seed, order);
        let gaps = leaderboard::compute_gaps(&sorted, &state.seed);
        let leaderboard = sorted
            .into_iter()
            .zip(gaps)
            .map(|(p, gap)| p.to_wire(gap))
            .collect();

        ServerFrameV1::RaceState {
            race: state.race.to_wire(),
            seed: state.seed.to_wire(),
            leaderboard,
            casters: state.casters.iter().map(Caster::to_wire).collect(),
        }
    }

    pub async fn participants_snapshot(&self) -> Vec<Participant> {
        self.state.lock().await.participants.clone()
    }

    pub async fn find_participant(&self, participant_id: Uuid) -> Option<Participant> {
        self.state
            .lock()
            .await
            .participants
            .iter()
            .find(|p| p.id == participant_id)
            .cloned()
    }

    fn find_mut<'a>(state: &'a mut RoomState, participant_id: Uuid) -> Option<&'a mut Participant> {
        state.participants.iter_mut().find(|p| p.id == participant_id)
    }

    async fn persist_and_notify_player(&self, state: &RoomState, p: &Participant) {
        if let Err(err) = participant_queries::save_participant(&self.pool, p).await {
            warn!(error = %err, participant_id = %p.id, "failed to persist participant");
        }
        self.registry
            .broadcast(self.race_id, ServerFrameV1::PlayerUpdate { player: p.to_wire(None) })
            .await;
        let _ = state;
    }

    /// Gameplay `status_update`/`zone_entered` handling, shared by both
    /// frame kinds since each only differs in how `to_zone` is learned from
    /// the client (see mod_session.rs).
    pub async fn apply_status(
        &self,
        participant_id: Uuid,
        igt_ms: i64,
        zone: Option<String>,
        death_count: i64,
    ) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Running {
            return Err(reason::RACE_NOT_RUNNING);
        }

        let tier_lookup = state.seed.tier_lookup();
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(reason::NOT_ELIGIBLE);
        };
        if p.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }

        let mut changed = false;

        if p.status == ParticipantStatus::Ready || p.status == ParticipantStatus::Registered {
            p.status = ParticipantStatus::Playing;
            changed = true;
        }

        if igt_ms > p.igt_ms {
            p.igt_ms = igt_ms;
            p.last_igt_change_at = Some(Utc::now());
            changed = true;
        }

        if let Some(zone) = zone {
            if let Some(&tier) = tier_lookup.get(&zone) {
                let before = (p.current_zone.clone(), p.death_count, p.zone_history.len());
                p.record_zone_and_deaths(&zone, tier, death_count);
                if (p.current_zone.clone(), p.death_count, p.zone_history.len()) != before {
                    changed = true;
                }
            }
        } else if death_count != p.death_count {
            // No zone transition this message, still attribute death delta
            // to whatever zone is already current.
            let current_tier = p
                .current_zone
                .as_deref()
                .and_then(|z| tier_lookup.get(z))
                .copied()
                .unwrap_or(p.current_layer);
            let current_zone = p.current_zone.clone().unwrap_or_default();
            if !current_zone.is_empty() {
                p.record_zone_and_deaths(&current_zone, current_tier, death_count);
            } else {
                p.death_count = death_count;
            }
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let p = p.clone();
        self.persist_and_notify_player(&state, &p).await;
        state.leaderboard_dirty = true;
        Ok(())
    }

    /// `zone_entered` carries no `death_count` — unlike `apply_status`,
    /// this never touches it, just the zone and `igt_ms`. Treated as a
    /// stronger signal than a status update: both `current_zone` and
    /// `igt_ms` move together.
    pub async fn apply_zone_entered(&self, participant_id: Uuid, to_zone: &str, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Running {
            return Err(reason::RACE_NOT_RUNNING);
        }

        let tier_lookup = state.seed.tier_lookup();
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(reason::NOT_ELIGIBLE);
        };
        if p.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }

        let mut changed = false;

        if p.status == ParticipantStatus::Ready || p.status == ParticipantStatus::Registered {
            p.status = ParticipantStatus::Playing;
            changed = true;
        }

        if igt_ms > p.igt_ms {
            p.igt_ms = igt_ms;
            p.last_igt_change_at = Some(Utc::now());
            changed = true;
        }

        if let Some(&tier) = tier_lookup.get(to_zone) {
            let unchanged_deaths = p.death_count;
            let before = (p.current_zone.clone(), p.zone_history.len());
            p.record_zone_and_deaths(to_zone, tier, unchanged_deaths);
            if (p.current_zone.clone(), p.zone_history.len()) != before {
                changed = true;
            }
        }

        if !changed {
            return Ok(());
        }

        let p = p.clone();
        self.persist_and_notify_player(&state, &p).await;
        state.leaderboard_dirty = true;
        Ok(())
    }

    /// Advances `igt_ms` only; treated as a timestamp-bearing update so
    /// monotonicity discards stale replays naturally across reconnects.
    pub async fn apply_event_flag(&self, participant_id: Uuid, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Running {
            return Err(reason::RACE_NOT_RUNNING);
        }
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(reason::NOT_ELIGIBLE);
        };
        if p.status.is_terminal() {
            return Err(reason::PARTICIPANT_TERMINAL);
        }

        let mut changed = false;

        if p.status == ParticipantStatus::Ready || p.status == ParticipantStatus::Registered {
            p.status = ParticipantStatus::Playing;
            changed = true;
        }
        // A replayed event_flag with igt_ms <= the stored value is a no-op.
        if igt_ms > p.igt_ms {
            p.igt_ms = igt_ms;
            p.last_igt_change_at = Some(Utc::now());
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let p = p.clone();
        self.persist_and_notify_player(&state, &p).await;
        Ok(())
    }

    pub async fn apply_finished(&self, participant_id: Uuid, igt_ms: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Running {
            return Err(reason::RACE_NOT_RUNNING);
        }
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(reason::NOT_ELIGIBLE);
        };
        if p.status != ParticipantStatus::Playing {
            return Err(reason::PARTICIPANT_TERMINAL);
        }
        if igt_ms > p.igt_ms {
            p.igt_ms = igt_ms;
        }
        p.status = ParticipantStatus::Finished;
        p.finished_at = Some(Utc::now());
        let p = p.clone();
        self.persist_and_notify_player(&state, &p).await;
        state.leaderboard_dirty = true;
        drop(state);
        self.auto_finish_check().await;
        Ok(())
    }

    async fn abandon(&self, participant_id: Uuid, is_force: bool) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if !is_force && state.race.status != RaceStatus::Running {
            return Err(ControlError::RaceNotRunning);
        }
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(ControlError::ParticipantNotEligible);
        };
        if !is_force && p.status != ParticipantStatus::Playing {
            return Err(ControlError::ParticipantNotEligible);
        }
        if p.status.is_terminal() {
            return Ok(());
        }
        p.status = ParticipantStatus::Abandoned;
        p.finished_at = Some(Utc::now());
        let p = p.clone();
        self.persist_and_notify_player(&state, &p).await;
        state.leaderboard_dirty = true;
        drop(state);
        self.auto_finish_check().await;
        Ok(())
    }

    pub async fn self_abandon(&self, participant_id: Uuid) -> Result<(), ControlError> {
        self.abandon(participant_id, false).await
    }

    pub async fn force_abandon(&self, participant_id: Uuid) -> Result<(), ControlError> {
        self.abandon(participant_id, true).await
    }

    pub async fn apply_ready(&self, participant_id: Uuid) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Setup {
            return Err(ControlError::RaceNotInSetup);
        }
        let Some(p) = Self::find_mut(&mut state, participant_id) else {
            return Err(ControlError::ParticipantNotEligible);
        };
        p.status = ParticipantStatus::Ready;
        state.leaderboard_dirty = true;
        Ok(())
    }

    pub async fn release_seeds(&self, caller: Uuid) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if state.race.organizer_id != caller {
            return Err(ControlError::NotOrganizer);
        }
        if state.race.status != RaceStatus::Setup || state.race.seeds_released_at.is_some() {
            return Err(ControlError::RaceNotInSetup);
        }
        state.race.seeds_released_at = Some(Utc::now());
        self.save_race_optimistic(&mut state).await?;
        let frame = self.build_race_state_frame(&state);
        self.registry.broadcast(self.race_id, frame).await;
        Ok(())
    }

    pub async fn start_race(&self, caller: Uuid) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if state.race.organizer_id != caller {
            return Err(ControlError::NotOrganizer);
        }
        if state.race.status != RaceStatus::Setup {
            return Err(ControlError::RaceNotInSetup);
        }
        if state.race.seeds_released_at.is_none() {
            return Err(ControlError::SeedsNotReleased);
        }
        state.race.status = RaceStatus::Running;
        state.race.started_at = Some(Utc::now());
        self.save_race_optimistic(&mut state).await?;

        self.registry.broadcast(self.race_id, ServerFrameV1::RaceStart {}).await;
        let frame = self.build_race_state_frame(&state);
        self.registry.broadcast(self.race_id, frame).await;
        Ok(())
    }

    pub async fn reroll_seed(&self, caller: Uuid, pool_name: &str) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if state.race.organizer_id != caller {
            return Err(ControlError::NotOrganizer);
        }
        if state.race.status != RaceStatus::Setup {
            return Err(ControlError::RaceNotInSetup);
        }

        let new_seed = seed_queries::claim_seed(&self.pool, pool_name)
            .await
            .map_err(ControlError::Store)?
            .ok_or(ControlError::SeedUnavailable)?;

        if let Some(old_seed_id) = state.race.seed_id {
            let _ = seed_queries::release_seed(&self.pool, old_seed_id).await;
        }

        state.race.seed_id = Some(new_seed.id);
        state.race.seeds_released_at = None;
        state.seed = new_seed;
        self.save_race_optimistic(&mut state).await?;

        let frame = self.build_race_state_frame(&state);
        self.registry.broadcast(self.race_id, frame).await;
        Ok(())
    }

    pub async fn add_caster(&self, user_id: Uuid, display_name: &str) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        if state.participants.iter().any(|p| p.user_id == user_id) {
            return Err(ControlError::MutualExclusion);
        }
        crate::db::queries::casters::add_caster(&self.pool, self.race_id, user_id, display_name)
            .await
            .map_err(ControlError::Store)?;
        state.casters.push(Caster {
            race_id: self.race_id,
            user_id,
            display_name: display_name.to_string(),
        });
        let casters = state.casters.iter().map(Caster::to_wire).collect();
        self.registry
            .broadcast(self.race_id, ServerFrameV1::CasterUpdate { casters })
            .await;
        Ok(())
    }

    pub async fn remove_caster(&self, user_id: Uuid) -> Result<(), ControlError> {
        let mut state = self.state.lock().await;
        crate::db::queries::casters::remove_caster(&self.pool, self.race_id, user_id)
            .await
            .map_err(ControlError::Store)?;
        state.casters.retain(|c| c.user_id != user_id);
        let casters = state.casters.iter().map(Caster::to_wire).collect();
        self.registry
            .broadcast(self.race_id, ServerFrameV1::CasterUpdate { casters })
            .await;
        Ok(())
    }

    /// Auto-finish: reload-and-retry-once under optimistic lock, then give
    /// up — a later mutation will re-check.
    async fn auto_finish_check(&self) {
        let mut state = self.state.lock().await;
        if state.race.status != RaceStatus::Running {
            return;
        }
        let all_terminal = state.participants.iter().all(|p| p.status.is_terminal());
        if !all_terminal {
            return;
        }

        state.race.status = RaceStatus::Finished;
        if self.save_race_optimistic(&mut state).await.is_err() {
            if let Ok(Some(fresh)) = race_queries::get_race(&self.pool, self.race_id).await {
                state.race = fresh;
                state.race.status = RaceStatus::Finished;
                let _ = self.save_race_optimistic(&mut state).await;
            }
        }

        info!(race_id = %self.race_id, "race auto-finished");
        self.registry
            .broadcast(
                self.race_id,
                ServerFrameV1::RaceStatusChange { status: state.race.status.into() },
            )
            .await;
    }

    async fn save_race_optimistic(&self, state: &mut RoomState) -> Result<(), ControlError> {
        let expected_version = state.race.version;
        match race_queries::save_race(&self.pool, &state.race, expected_version).await {
            Ok(()) => {
                state.race.version += 1;
                Ok(())
            }
            Err(StoreError::VersionConflict) => Err(ControlError::Store(StoreError::VersionConflict)),
            Err(e) => Err(ControlError::Store(e)),
        }
    }

    /// Called every 100 ms by the room's background ticker.
    pub async fn tick_leaderboard(&self) {
        let mut state = self.state.lock().await;
        if !state.leaderboard_dirty {
            return;
        }
        state.leaderboard_dirty = false;
        let order = state.registration_order.clone();
        let sorted = leaderboard::sort_participants(&state.participants, &state.seed, &order);
        let gaps = leaderboard::compute_gaps(&sorted, &state.seed);
        let participants = sorted.into_iter().zip(gaps).map(|(p, gap)| p.to_wire(gap)).collect();
        drop(state);
        self.registry
            .broadcast(self.race_id, ServerFrameV1::LeaderboardUpdate { participants })
            .await;
    }

    /// Called every 30 s by the room's ping ticker.
    pub async fn tick_ping(&self) {
        let participant_ids: Vec<Uuid> = {
            let state = self.state.lock().await;
            state.participants.iter().map(|p| p.id).collect()
        };

        self.registry.broadcast_to_mods(self.race_id, ServerFrameV1::Ping {}).await;

        let mut state = self.state.lock().await;
        for id in participant_ids {
            let missed = state.missed_pongs.entry(id).or_insert(0);
            *missed += 1;
            if *missed > MAX_MISSED_PONGS {
                *missed = 0;
                drop(state);
                self.registry.detach_mod(self.race_id, id).await;
                state = self.state.lock().await;
            }
        }
    }

    pub async fn record_pong(&self, participant_id: Uuid) {
        let mut state = self.state.lock().await;
        state.missed_pongs.insert(participant_id, 0);
    }

    pub async fn is_finished(&self) -> bool {
        self.state.lock().await.race.status == RaceStatus::Finished
    }

    /// Participants whose gameplay has been idle past `threshold_secs`
    /// seconds. Never includes a participant who has not yet started
    /// playing (`last_igt_change_at` null).
    pub async fn inactive_playing_participants(&self, threshold_secs: i64) -> Vec<Uuid> {
        let state = self.state.lock().await;
        let now = Utc::now();
        state
            .participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Playing)
            .filter_map(|p| {
                let last = p.last_igt_change_at?;
                if (now - last).num_seconds() >= threshold_secs {
                    Some(p.id)
                } else {
                    None
                }
            })
            .collect()
    }
}
