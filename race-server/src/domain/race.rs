use chrono::{DateTime, Utc};
use race_contracts::RaceStatusV1;
use uuid::Uuid;

/// Authoritative race record. Lives in the store; the race room keeps an
/// in-memory copy it mutates under its single-writer discipline.
#[derive(Debug, Clone)]
pub struct Race {
    pub id: Uuid,
    pub name: String,
    pub organizer_id: Uuid,
    pub status: RaceStatus,
    pub seed_id: Option<Uuid>,
    pub seeds_released_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceStatus {
    Setup,
    Running,
    Finished,
}

impl RaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceStatus::Setup => "setup",
            RaceStatus::Running => "running",
            RaceStatus::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "setup" => Some(RaceStatus::Setup),
            "running" => Some(RaceStatus::Running),
            "finished" => Some(RaceStatus::Finished),
            _ => None,
        }
    }
}

impl From<RaceStatus> for RaceStatusV1 {
    fn from(value: RaceStatus) -> Self {
        match value {
            RaceStatus::Setup => RaceStatusV1::Setup,
            RaceStatus::Running => RaceStatusV1::Running,
            RaceStatus::Finished => RaceStatusV1::Finished,
        }
    }
}

impl Race {
    pub fn to_wire(&self) -> race_contracts::RaceInfoV1 {
        race_contracts::RaceInfoV1 {
            id: self.id,
            name: self.name.clone(),
            status: self.status.into(),
            started_at: self.started_at,
            seeds_released_at: self.seeds_released_at,
        }
    }
}
