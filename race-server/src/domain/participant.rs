use chrono::{DateTime, Utc};
use race_contracts::ParticipantStatusV1;
use uuid::Uuid;

/// One entry in a participant's zone history. Entries are append-only and
/// unique by `node_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneHistoryEntry {
    pub node_id: String,
    pub igt_ms: i64,
    pub deaths: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Registered,
    Ready,
    Playing,
    Finished,
    Abandoned,
}

impl ParticipantStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ParticipantStatus::Finished | ParticipantStatus::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::Ready => "ready",
            ParticipantStatus::Playing => "playing",
            ParticipantStatus::Finished => "finished",
            ParticipantStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(ParticipantStatus::Registered),
            "ready" => Some(ParticipantStatus::Ready),
            "playing" => Some(ParticipantStatus::Playing),
            "finished" => Some(ParticipantStatus::Finished),
            "abandoned" => Some(ParticipantStatus::Abandoned),
            _ => None,
        }
    }
}

impl From<ParticipantStatus> for ParticipantStatusV1 {
    fn from(value: ParticipantStatus) -> Self {
        match value {
            ParticipantStatus::Registered => ParticipantStatusV1::Registered,
            ParticipantStatus::Ready => ParticipantStatusV1::Ready,
            ParticipantStatus::Playing => ParticipantStatusV1::Playing,
            ParticipantStatus::Finished => ParticipantStatusV1::Finished,
            ParticipantStatus::Abandoned => ParticipantStatusV1::Abandoned,
        }
    }
}

/// A participant's authoritative state within one race.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub race_id: Uuid,
    pub user_id: Uuid,
    pub login: String,
    pub display_name: String,
    pub mod_token: String,
    pub status: ParticipantStatus,
    pub current_zone: Option<String>,
    pub current_layer: i32,
    pub igt_ms: i64,
    pub death_count: i64,
    pub zone_history: Vec<ZoneHistoryEntry>,
    pub last_igt_change_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub color_index: i32,
    /// External presence signal (set true while a mod session is attached).
    pub is_live: bool,
}

impl Participant {
    /// Returns the first `igt_ms` at which this participant entered `tier`,
    /// given a node→tier lookup.
    pub fn layer_entry_igt(&self, tier: i32, tier_of: impl Fn(&str) -> Option<i32>) -> Option<i64> {
        self.zone_history
            .iter()
            .filter(|entry| tier_of(&entry.node_id) == Some(tier))
            .map(|entry| entry.igt_ms)
            .min()
    }

    /// Appends `node_id` to history if new, recomputes `current_layer`, and
    /// attributes any positive death delta to the matching zone entry.
    pub fn record_zone_and_deaths(
        &mut self,
        node_id: &str,
        tier: i32,
        new_death_count: i64,
    ) {
        let is_new = !self.zone_history.iter().any(|e| e.node_id == node_id);
        if is_new {
            self.zone_history.push(ZoneHistoryEntry {
                node_id: node_id.to_string(),
                igt_ms: self.igt_ms,
                deaths: 0,
            });
        }

        let delta = new_death_count - self.death_count;
        if delta > 0 {
            if let Some(entry) = self
                .zone_history
                .iter_mut()
                .find(|e| e.node_id == self.current_zone.as_deref().unwrap_or(node_id))
            {
                entry.deaths += delta;
            }
        }
        self.death_count = new_death_count;

        self.current_layer = self.current_layer.max(tier);
        self.current_zone = Some(node_id.to_string());
    }

    pub fn to_wire(&self, gap_ms: Option<i64>) -> race_contracts::ParticipantInfoV1 {
        race_contracts::ParticipantInfoV1 {
            id: self.id,
            user: race_contracts::UserInfoV1 {
                id: self.user_id,
                login: self.login.clone(),
                display_name: self.display_name.clone(),
                color_index: self.color_index,
            },
            status: self.status.into(),
            current_zone: self.current_zone.clone(),
            current_layer: self.current_layer,
            igt_ms: self.igt_ms,
            death_count: self.death_count,
            zone_history: self
                .zone_history
                .iter()
                .map(|e| race_contracts::ZoneHistoryEntryV1 {
                    node_id: e.node_id.clone(),
                    igt_ms: e.igt_ms,
                    deaths: e.deaths,
                })
                .collect(),
            gap_ms,
            is_live: self.is_live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(igt_ms: i64) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            race_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            login: "alice".into(),
            display_name: "Alice".into(),
            mod_token: "tok".into(),
            status: ParticipantStatus::Playing,
            current_zone: None,
            current_layer: 0,
            igt_ms,
            death_count: 0,
            zone_history: vec![],
            last_igt_change_at: None,
            finished_at: None,
            color_index: 0,
            is_live: true,
        }
    }

    #[test]
    fn new_zone_appends_history_entry_once() {
        let mut p = base(100);
        p.record_zone_and_deaths("z1", 1, 0);
        p.igt_ms = 150;
        p.record_zone_and_deaths("z1", 1, 0); // revisit, same node
        assert_eq!(p.zone_history.len(), 1);
        assert_eq!(p.zone_history[0].igt_ms, 100);
        assert_eq!(p.current_layer, 1);
    }

    #[test]
    fn death_delta_attributed_to_current_zone() {
        let mut p = base(100);
        p.record_zone_and_deaths("z1", 1, 0);
        p.record_zone_and_deaths("z1", 1, 2);
        assert_eq!(p.zone_history[0].deaths, 2);
        assert_eq!(p.death_count, 2);
    }

    #[test]
    fn current_layer_never_decreases_on_revisit() {
        let mut p = base(100);
        p.record_zone_and_deaths("z2", 2, 0);
        p.record_zone_and_deaths("z1", 1, 0);
        assert_eq!(p.current_layer, 2);
    }

    #[test]
    fn layer_entry_igt_uses_earliest_occurrence() {
        let mut p = base(100);
        p.record_zone_and_deaths("z1", 1, 0);
        p.igt_ms = 200;
        p.record_zone_and_deaths("z2", 1, 0);
        let tier_of = |id: &str| if id == "z1" || id == "z2" { Some(1) } else { None };
        assert_eq!(p.layer_entry_igt(1, tier_of), Some(100));
    }
}
