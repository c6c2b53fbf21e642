//! The HTTP-facing control surface: resolves a target race or training
//! session and forwards into its room's mutation methods. Kept as free
//! functions over `AppState` rather than methods on `RaceRoom` so every
//! operation has one call site, independent of how the room was reached
//! (HTTP handler, sweeper, test).

use uuid::Uuid;

use crate::api::state::AppState;
use crate::errors::{ControlError, StoreError};

pub async fn release_seeds(state: &AppState, race_id: Uuid, caller: Uuid) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.release_seeds(caller).await
}

pub async fn start_race(state: &AppState, race_id: Uuid, caller: Uuid) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.start_race(caller).await
}

pub async fn reroll_seed(
    state: &AppState,
    race_id: Uuid,
    caller: Uuid,
    pool_name: &str,
) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.reroll_seed(caller, pool_name).await
}

/// Self-abandon: the caller is identified by their own participant id,
/// resolved to its owning race.
pub async fn self_abandon(state: &AppState, participant_id: Uuid) -> Result<(), ControlError> {
    let race_id = participant_race_id(state, participant_id).await?;
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.self_abandon(participant_id).await
}

/// Force-abandon: organizer-invoked, or invoked idempotently by the
/// inactivity sweeper.
pub async fn force_abandon(state: &AppState, participant_id: Uuid) -> Result<(), ControlError> {
    let race_id = participant_race_id(state, participant_id).await?;
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.force_abandon(participant_id).await
}

pub async fn cast_join(
    state: &AppState,
    race_id: Uuid,
    user_id: Uuid,
    display_name: &str,
) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.add_caster(user_id, display_name).await
}

pub async fn cast_leave(state: &AppState, race_id: Uuid, user_id: Uuid) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_race(race_id).await.map_err(ControlError::Store)?;
    room.remove_caster(user_id).await
}

/// Abandons a training session. Training sessions are not reachable by the
/// inactivity sweeper, which only scans race participants, so this is the
/// only path to `Abandoned` besides finishing.
pub async fn abandon_training(state: &AppState, session_id: Uuid) -> Result<(), ControlError> {
    let room = state.rooms.get_or_load_training(session_id).await.map_err(ControlError::Store)?;
    room.abandon().await.map_err(|_| ControlError::ParticipantNotEligible)
}

async fn participant_race_id(state: &AppState, participant_id: Uuid) -> Result<Uuid, ControlError> {
    // No dedicated "get by id" query exists yet because every other path
    // resolves participants via mod_token or race listing; reuse the room's
    // own lookup once a race id is known would be circular here, so this
    // reads the store directly.
    let row = sqlx::query_as::<_, (String,)>("SELECT race_id FROM participants WHERE id = ?")
        .bind(participant_id.to_string())
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ControlError::Store(StoreError::Db(e)))?;

    let (race_id,) = row.ok_or(ControlError::ParticipantNotEligible)?;
    race_id.parse().map_err(|_| ControlError::ParticipantNotEligible)
}
