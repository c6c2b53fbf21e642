//! Shared wire contracts for the live race runtime.
//!
//! This crate is the JSON envelope codec plus the DTOs that cross the
//! WebSocket boundary between `race-server` and any client — the in-game
//! mod, a spectator overlay, or `race-mod-sim`. Nothing here talks to a
//! socket directly; it only defines what goes over one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `reason` strings used on the wire and in control-surface error bodies.
pub mod reason {
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const REPLACED: &str = "replaced";
    pub const RACE_NOT_RUNNING: &str = "race_not_running";
    pub const PARTICIPANT_TERMINAL: &str = "participant_terminal";
    pub const SERVER_SHUTTING_DOWN: &str = "server_shutting_down";
    pub const SEED_UNAVAILABLE: &str = "seed_unavailable";
    pub const RACE_MODIFIED: &str = "race_modified";
    pub const SEEDS_NOT_RELEASED: &str = "seeds_not_released";
    pub const NOT_ORGANIZER: &str = "not_organizer";
    pub const NOT_ELIGIBLE: &str = "not_eligible";
    pub const MUTUAL_EXCLUSION: &str = "mutual_exclusion";
    pub const AUTH_TIMEOUT: &str = "auth_timeout";
    pub const SEND_OVERFLOW: &str = "send_overflow";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatusV1 {
    Setup,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatusV1 {
    Registered,
    Ready,
    Playing,
    Finished,
    Abandoned,
}

impl ParticipantStatusV1 {
    pub fn is_terminal(self) -> bool {
        matches!(self, ParticipantStatusV1::Finished | ParticipantStatusV1::Abandoned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneHistoryEntryV1 {
    pub node_id: String,
    pub igt_ms: i64,
    pub deaths: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoV1 {
    pub id: Uuid,
    pub login: String,
    pub display_name: String,
    pub color_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfoV1 {
    pub id: Uuid,
    pub user: UserInfoV1,
    pub status: ParticipantStatusV1,
    pub current_zone: Option<String>,
    pub current_layer: i32,
    pub igt_ms: i64,
    pub death_count: i64,
    pub zone_history: Vec<ZoneHistoryEntryV1>,
    pub gap_ms: Option<i64>,
    pub is_live: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedNodeV1 {
    pub id: String,
    pub tier: i32,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedInfoV1 {
    pub id: Uuid,
    pub pool_name: String,
    pub total_layers: i32,
    pub total_nodes: i32,
    pub graph_json: Vec<SeedNodeV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceInfoV1 {
    pub id: Uuid,
    pub name: String,
    pub status: RaceStatusV1,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub seeds_released_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasterInfoV1 {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Frames sent by a mod or spectator client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrameV1 {
    #[serde(rename = "auth")]
    Auth { mod_token: String },

    #[serde(rename = "ready")]
    Ready {},

    #[serde(rename = "status_update")]
    StatusUpdate {
        igt_ms: i64,
        current_zone: Option<String>,
        death_count: i64,
    },

    #[serde(rename = "zone_entered")]
    ZoneEntered {
        from_zone: Option<String>,
        to_zone: String,
        igt_ms: i64,
    },

    #[serde(rename = "event_flag")]
    EventFlag { flag: String, igt_ms: i64 },

    #[serde(rename = "finished")]
    Finished { igt_ms: i64 },

    #[serde(rename = "pong")]
    Pong {},
}

/// Frames sent by the server to a mod or spectator client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrameV1 {
    #[serde(rename = "auth_ok")]
    AuthOk {
        race: RaceInfoV1,
        seed: SeedInfoV1,
        participants: Vec<ParticipantInfoV1>,
        my_participant_id: Uuid,
    },

    #[serde(rename = "auth_error")]
    AuthError { reason: String },

    #[serde(rename = "error")]
    Error { reason: String },

    #[serde(rename = "race_start")]
    RaceStart {},

    #[serde(rename = "race_status_change")]
    RaceStatusChange { status: RaceStatusV1 },

    #[serde(rename = "leaderboard_update")]
    LeaderboardUpdate { participants: Vec<ParticipantInfoV1> },

    #[serde(rename = "player_update")]
    PlayerUpdate { player: ParticipantInfoV1 },

    #[serde(rename = "race_state")]
    RaceState {
        race: RaceInfoV1,
        seed: SeedInfoV1,
        leaderboard: Vec<ParticipantInfoV1>,
        casters: Vec<CasterInfoV1>,
    },

    #[serde(rename = "zone_update")]
    ZoneUpdate { player: ParticipantInfoV1 },

    #[serde(rename = "ping")]
    Ping {},

    #[serde(rename = "caster_update")]
    CasterUpdate { casters: Vec<CasterInfoV1> },
}

/// One prior solo run returned by the ghost query. Carries no user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostRunV1 {
    pub zone_history: Vec<ZoneHistoryEntryV1>,
    pub igt_ms: i64,
    pub death_count: i64,
}

/// Suggested bounds for strings/frames crossing the wire.
pub mod limits {
    pub const MAX_TOKEN_LEN: usize = 128;
    pub const MAX_NODE_ID_LEN: usize = 128;
    pub const MAX_FRAME_BYTES: usize = 8 * 1024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_auth_round_trips() {
        let frame = ClientFrameV1::Auth {
            mod_token: "tok-123".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"auth\""));
        let back: ClientFrameV1 = serde_json::from_str(&json).unwrap();
        match back {
            ClientFrameV1::Auth { mod_token } => assert_eq!(mod_token, "tok-123"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = r#"{"type":"ready","unexpected":42}"#;
        let parsed: ClientFrameV1 = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, ClientFrameV1::Ready {}));
    }

    #[test]
    fn unknown_type_tag_fails_to_parse() {
        let raw = r#"{"type":"not_a_real_tag"}"#;
        let parsed: Result<ClientFrameV1, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn participant_status_terminal() {
        assert!(ParticipantStatusV1::Finished.is_terminal());
        assert!(ParticipantStatusV1::Abandoned.is_terminal());
        assert!(!ParticipantStatusV1::Playing.is_terminal());
    }

    #[test]
    fn server_frame_leaderboard_update_serializes_tag() {
        let frame = ServerFrameV1::LeaderboardUpdate {
            participants: vec![],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.starts_with("{\"type\":\"leaderboard_update\""));
    }
}
