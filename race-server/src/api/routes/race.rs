use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::control;

#[derive(Debug, Deserialize)]
pub struct CallerBody {
    pub caller: Uuid,
}

/// POST /api/races/{race_id}/release-seeds
pub async fn release_seeds(
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
    Json(body): Json<CallerBody>,
) -> Result<(), ApiError> {
    control::release_seeds(&state, race_id, body.caller).await?;
    Ok(())
}

/// POST /api/races/{race_id}/start
pub async fn start_race(
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
    Json(body): Json<CallerBody>,
) -> Result<(), ApiError> {
    control::start_race(&state, race_id, body.caller).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RerollBody {
    pub caller: Uuid,
    pub pool_name: String,
}

/// POST /api/races/{race_id}/reroll-seed
pub async fn reroll_seed(
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
    Json(body): Json<RerollBody>,
) -> Result<(), ApiError> {
    control::reroll_seed(&state, race_id, body.caller, &body.pool_name).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ParticipantBody {
    pub participant_id: Uuid,
}

/// POST /api/participants/self-abandon
pub async fn self_abandon(
    State(state): State<AppState>,
    Json(body): Json<ParticipantBody>,
) -> Result<(), ApiError> {
    control::self_abandon(&state, body.participant_id).await?;
    Ok(())
}

/// POST /api/participants/force-abandon
pub async fn force_abandon(
    State(state): State<AppState>,
    Json(body): Json<ParticipantBody>,
) -> Result<(), ApiError> {
    control::force_abandon(&state, body.participant_id).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CastJoinBody {
    pub user_id: Uuid,
    pub display_name: String,
}

/// POST /api/races/{race_id}/cast-join
pub async fn cast_join(
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
    Json(body): Json<CastJoinBody>,
) -> Result<(), ApiError> {
    control::cast_join(&state, race_id, body.user_id, &body.display_name).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CastLeaveBody {
    pub user_id: Uuid,
}

/// POST /api/races/{race_id}/cast-leave
pub async fn cast_leave(
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
    Json(body): Json<CastLeaveBody>,
) -> Result<(), ApiError> {
    control::cast_leave(&state, race_id, body.user_id).await?;
    Ok(())
}
