//! Error types for cftunnel.

use thiserror::Error;

/// Result type alias using the cftunnel [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by tunnel management operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad user input; the caller re-prompts.
    #[error("{0}")]
    Validation(String),

    /// A tunnel (or one of its artifacts) already exists.
    #[error("tunnel '{0}' already exists")]
    AlreadyExists(String),

    /// No artifacts exist for the requested tunnel.
    #[error("tunnel '{0}' not found")]
    NotFound(String),

    /// An external command exited unsuccessfully.
    #[error("`{command}` failed ({}): {stderr}", exit_label(.exit_code))]
    Process {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A required external binary could not be located.
    #[error("'{0}' not found on PATH")]
    MissingBinary(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Terminal prompt error
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl Error {
    /// Shorthand for building a [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error came from an external command.
    pub const fn is_process(&self) -> bool {
        matches!(self, Self::Process { .. })
    }
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}"))
}
