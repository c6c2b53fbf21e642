use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::participant::ZoneHistoryEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStatus {
    Active,
    Finished,
    Abandoned,
}

impl TrainingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainingStatus::Finished | TrainingStatus::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Active => "active",
            TrainingStatus::Finished => "finished",
            TrainingStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TrainingStatus::Active),
            "finished" => Some(TrainingStatus::Finished),
            "abandoned" => Some(TrainingStatus::Abandoned),
            _ => None,
        }
    }
}

/// A degenerate, single-participant race. Never consumes a seed from the
/// pool — the same seed may back unboundedly many sessions.
#[derive(Debug, Clone)]
pub struct TrainingSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub login: String,
    pub display_name: String,
    pub seed_id: Uuid,
    pub mod_token: String,
    pub status: TrainingStatus,
    pub current_zone: Option<String>,
    pub current_layer: i32,
    pub igt_ms: i64,
    pub death_count: i64,
    pub progress_nodes: Vec<ZoneHistoryEntry>,
    pub last_igt_change_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrainingSession {
    /// Training sessions reuse the participant wire shape — same gameplay
    /// fields, no leaderboard-only data like `gap_ms`.
    pub fn to_wire_as_participant(&self) -> race_contracts::ParticipantInfoV1 {
        race_contracts::ParticipantInfoV1 {
            id: self.id,
            user: race_contracts::UserInfoV1 {
                id: self.user_id,
                login: self.login.clone(),
                display_name: self.display_name.clone(),
                color_index: 0,
            },
            status: self.status.into(),
            current_zone: self.current_zone.clone(),
            current_layer: self.current_layer,
            igt_ms: self.igt_ms,
            death_count: self.death_count,
            zone_history: self
                .progress_nodes
                .iter()
                .map(|e| race_contracts::ZoneHistoryEntryV1 {
                    node_id: e.node_id.clone(),
                    igt_ms: e.igt_ms,
                    deaths: e.deaths,
                })
                .collect(),
            gap_ms: None,
            is_live: true,
        }
    }
}

impl From<TrainingStatus> for race_contracts::ParticipantStatusV1 {
    fn from(value: TrainingStatus) -> Self {
        match value {
            TrainingStatus::Active => race_contracts::ParticipantStatusV1::Playing,
            TrainingStatus::Finished => race_contracts::ParticipantStatusV1::Finished,
            TrainingStatus::Abandoned => race_contracts::ParticipantStatusV1::Abandoned,
        }
    }
}
