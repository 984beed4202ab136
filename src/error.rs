/// Rejected review-session operations.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("a review session is already active for user {0}")]
    SessionActive(String),

    #[error("no cards are due for review")]
    NoDueCards,

    #[error("no active review session for user {0}")]
    NoSession(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("review quality must be between 0 and 5, got {0}")]
pub struct QualityError(pub u8);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid engagement policy: {0}")]
    InvalidPolicy(String),
}
