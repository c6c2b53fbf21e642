use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::{ControlError, StoreError};

/// Maps control/store failures onto the wire `reason` taxonomy for HTTP
/// callers. Identity and auth are assumed to have already happened
/// upstream of this crate; this only reports what the operation did.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    reason: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.reason }))).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        let (status, reason) = match e {
            ControlError::RaceNotInSetup => (StatusCode::CONFLICT, "race_not_in_setup"),
            ControlError::RaceNotRunning => (StatusCode::CONFLICT, race_contracts::reason::RACE_NOT_RUNNING),
            ControlError::SeedsNotReleased => (StatusCode::CONFLICT, race_contracts::reason::SEEDS_NOT_RELEASED),
            ControlError::SeedUnavailable => (StatusCode::CONFLICT, race_contracts::reason::SEED_UNAVAILABLE),
            ControlError::ParticipantNotEligible => (StatusCode::FORBIDDEN, race_contracts::reason::NOT_ELIGIBLE),
            ControlError::MutualExclusion => (StatusCode::CONFLICT, race_contracts::reason::MUTUAL_EXCLUSION),
            ControlError::NotOrganizer => (StatusCode::FORBIDDEN, race_contracts::reason::NOT_ORGANIZER),
            ControlError::Store(StoreError::VersionConflict) => {
                (StatusCode::CONFLICT, race_contracts::reason::RACE_MODIFIED)
            }
            ControlError::Store(StoreError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
            ControlError::Store(StoreError::Db(ref err)) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        ApiError { status, reason }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ControlError::Store(e).into()
    }
}
