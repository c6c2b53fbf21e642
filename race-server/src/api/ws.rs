use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::sessions::{mod_session, spectator_session};

/// `/ws/mod` — mod connections identify themselves via `mod_token` in the
/// first frame, so no path parameter is needed here.
pub async fn ws_mod_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| mod_session::handle_mod_socket(socket, state))
}

/// `/ws/spectate/{race_id}` — spectators are unauthenticated and scoped to
/// one race by path.
pub async fn ws_spectator_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(race_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| spectator_session::handle_spectator_socket(socket, state, race_id))
}
