use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeedRow {
    pub id: String,
    pub pool_name: String,
    pub total_layers: i64,
    pub consumed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeedNodeRow {
    pub seed_id: String,
    pub node_id: String,
    pub tier: i64,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RaceRow {
    pub id: String,
    pub name: String,
    pub organizer_id: String,
    pub status: String,
    pub seed_id: Option<String>,
    pub seeds_released_at: Option<String>,
    pub started_at: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParticipantRow {
    pub id: String,
    pub race_id: String,
    pub user_id: String,
    pub login: String,
    pub display_name: String,
    pub mod_token: String,
    pub status: String,
    pub current_zone: Option<String>,
    pub current_layer: i64,
    pub igt_ms: i64,
    pub death_count: i64,
    pub zone_history: String,
    pub last_igt_change_at: Option<String>,
    pub finished_at: Option<String>,
    pub color_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CasterRow {
    pub race_id: String,
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrainingSessionRow {
    pub id: String,
    pub user_id: String,
    pub login: String,
    pub display_name: String,
    pub seed_id: String,
    pub mod_token: String,
    pub status: String,
    pub current_zone: Option<String>,
    pub current_layer: i64,
    pub igt_ms: i64,
    pub death_count: i64,
    pub progress_nodes: String,
    pub last_igt_change_at: Option<String>,
    pub finished_at: Option<String>,
}
