/// Errors returned by session engine operations.
///
/// Every variant reaches the caller; nothing here is swallowed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A referenced session, story or user does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller is known but may not do this (e.g. a non-host advancing a story).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal for the current story or session status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed request content (empty name, oversized vote value, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The state store did not answer in time.
    #[error("state store timed out")]
    StoreTimeout,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn session_not_found(id: &str) -> Self {
        Self::NotFound(format!("session {}", id))
    }

    pub(crate) fn story_not_found(id: &str) -> Self {
        Self::NotFound(format!("story {}", id))
    }
}
