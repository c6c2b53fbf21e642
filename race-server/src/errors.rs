use thiserror::Error;

/// Errors surfaced by the store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("optimistic version conflict")]
    VersionConflict,

    #[error("not found")]
    NotFound,
}

/// Errors surfaced by race control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("race is not in setup")]
    RaceNotInSetup,

    #[error("race is not running")]
    RaceNotRunning,

    #[error("seeds have not been released")]
    SeedsNotReleased,

    #[error("no seed available in the requested pool")]
    SeedUnavailable,

    #[error("caller is not eligible for this operation")]
    ParticipantNotEligible,

    #[error("caller already holds a conflicting role in this race")]
    MutualExclusion,

    #[error("caller is not the organizer")]
    NotOrganizer,

    #[error(transparent)]
    Store(#[from] StoreError),
}
