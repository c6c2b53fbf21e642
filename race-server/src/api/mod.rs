pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/mod", get(ws::ws_mod_handler))
        .route("/ws/spectate/{race_id}", get(ws::ws_spectator_handler))
        .route("/api/races/{race_id}/release-seeds", post(routes::race::release_seeds))
        .route("/api/races/{race_id}/start", post(routes::race::start_race))
        .route("/api/races/{race_id}/reroll-seed", post(routes::race::reroll_seed))
        .route("/api/races/{race_id}/cast-join", post(routes::race::cast_join))
        .route("/api/races/{race_id}/cast-leave", post(routes::race::cast_leave))
        .route("/api/participants/self-abandon", post(routes::race::self_abandon))
        .route("/api/participants/force-abandon", post(routes::race::force_abandon))
        .route("/api/training/{session_id}/abandon", post(routes::training::abandon))
        .route("/api/ghosts", get(routes::ghost::list))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
