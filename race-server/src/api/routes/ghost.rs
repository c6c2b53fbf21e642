use axum::extract::{Query, State};
use axum::Json;
use race_contracts::GhostRunV1;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::ghost;

#[derive(Debug, Deserialize)]
pub struct GhostQuery {
    pub session_id: Uuid,
}

/// GET /api/ghosts?session_id=...
pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<GhostQuery>,
) -> Result<Json<Vec<GhostRunV1>>, ApiError> {
    let ghosts = ghost::list_ghosts(&state.db, q.session_id).await?;
    Ok(Json(ghosts))
}
