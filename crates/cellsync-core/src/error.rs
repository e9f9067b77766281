//! Error types for cellsync-core.

use thiserror::Error;

/// Result type for cellsync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellsync-core.
///
/// Races with the evaluation session (events for deleted cells, stale
/// versions) are not errors; they are reported as dropped events.
#[derive(Debug, Error)]
pub enum Error {
    /// A change set does not fit the document it is applied to.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// A cell was created with inconsistent required fields.
    #[error("malformed cell{}: {message}", id.as_ref().map(|id| format!(" {}", id)).unwrap_or_default())]
    MalformedCell {
        id: Option<String>,
        message: String,
    },

    /// The command batch could not be handed to the evaluation session.
    #[error("failed to send {commands} command(s) to session: {message}")]
    Send { commands: usize, message: String },

}

impl Error {
    /// Shorthand for [`Error::InvalidChange`].
    pub fn invalid_change(message: impl Into<String>) -> Self {
        Self::InvalidChange(message.into())
    }

    /// Whether this error came from the transport rather than the document.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Send { .. })
    }
}
