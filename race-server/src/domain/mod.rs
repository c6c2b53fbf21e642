pub mod caster;
pub mod participant;
pub mod race;
pub mod seed;
pub mod training;

pub use caster::Caster;
pub use participant::{Participant, ParticipantStatus, ZoneHistoryEntry};
pub use race::{Race, RaceStatus};
pub use seed::{Seed, SeedNode};
pub use training::{TrainingSession, TrainingStatus};
