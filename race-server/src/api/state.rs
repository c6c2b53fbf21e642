use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::engine::{ConnectionRegistry, RoomManager};

/// Shared application state available to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomManager,
    pub config: Arc<RuntimeConfig>,
}

/// Timing knobs pulled from CLI args.
pub struct RuntimeConfig {
    pub auth_timeout: Duration,
    pub ping_interval: Duration,
    pub leaderboard_coalesce: Duration,
    pub inactivity_threshold: Duration,
    pub sweep_interval: Duration,
}

impl AppState {
    pub fn new(db: SqlitePool, config: RuntimeConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomManager::new(db.clone(), registry.clone(), config.clone());
        Self {
            db,
            registry,
            rooms,
            config,
        }
    }
}
