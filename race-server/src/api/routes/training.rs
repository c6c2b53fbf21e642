use axum::extract::{Path, State};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::control;

/// POST /api/training/{session_id}/abandon
pub async fn abandon(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Result<(), ApiError> {
    control::abandon_training(&state, session_id).await?;
    Ok(())
}
