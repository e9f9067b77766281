//! Error types for the session driver.

/// Session error type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The driver task is gone.
    #[error("Driver channel closed")]
    ChannelClosed,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error on the session stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
