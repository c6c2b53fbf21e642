pub mod leaderboard;
pub mod registry;
pub mod room;
pub mod training_room;

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use registry::ConnectionRegistry;
pub use room::RaceRoom;
pub use training_room::TrainingRoom;

use crate::api::state::RuntimeConfig;
use crate::errors::StoreError;

/// Owns every live race room and training room, lazily loading from the
/// store on first reference and spawning each room's background tickers
/// exactly once.
#[derive(Clone)]
pub struct RoomManager {
    pool: SqlitePool,
    registry: Arc<ConnectionRegistry>,
    config: Arc<RuntimeConfig>,
    races: Arc<Mutex<HashMap<Uuid, Arc<RaceRoom>>>>,
    training: Arc<Mutex<HashMap<Uuid, Arc<TrainingRoom>>>>,
}

impl RoomManager {
    pub fn new(pool: SqlitePool, registry: Arc<ConnectionRegistry>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            pool,
            registry,
            config,
            races: Arc::new(Mutex::new(HashMap::new())),
            training: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get_or_load_race(&self, race_id: Uuid) -> Result<Arc<RaceRoom>, StoreError> {
        let mut races = self.races.lock().await;
        if let Some(room) = races.get(&race_id) {
            return Ok(room.clone());
        }
        let room = RaceRoom::load(self.pool.clone(), self.registry.clone(), race_id).await?;
        races.insert(race_id, room.clone());
        spawn_race_tickers(room.clone(), self.config.clone());
        Ok(room)
    }

    pub async fn get_or_load_training(&self, session_id: Uuid) -> Result<Arc<TrainingRoom>, StoreError> {
        let mut training = self.training.lock().await;
        if let Some(room) = training.get(&session_id) {
            return Ok(room.clone());
        }
        let room = TrainingRoom::load(self.pool.clone(), self.registry.clone(), session_id).await?;
        training.insert(session_id, room.clone());
        Ok(room)
    }

    pub async fn all_race_ids(&self) -> Vec<Uuid> {
        self.races.lock().await.keys().copied().collect()
    }

    /// Drops terminal rooms from the in-memory cache so a long-lived
    /// process doesn't accumulate finished races indefinitely.
    pub async fn evict_finished(&self) {
        let mut races = self.races.lock().await;
        let mut finished = Vec::new();
        for (id, room) in races.iter() {
            if room.is_finished().await {
                finished.push(*id);
            }
        }
        for id in finished {
            races.remove(&id);
        }
    }
}

fn spawn_race_tickers(room: Arc<RaceRoom>, config: Arc<RuntimeConfig>) {
    let leaderboard_room = room.clone();
    let leaderboard_tick = config.leaderboard_coalesce;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(leaderboard_tick);
        loop {
            interval.tick().await;
            if leaderboard_room.is_finished().await {
                break;
            }
            leaderboard_room.tick_leaderboard().await;
        }
    });

    let ping_room = room;
    let ping_tick = config.ping_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_tick);
        loop {
            interval.tick().await;
            if ping_room.is_finished().await {
                break;
            }
            ping_room.tick_ping().await;
        }
    });
}
