//! Error types shared across VidFeed crates.

use std::path::PathBuf;

/// Top-level error type for VidFeed operations.
#[derive(Debug, thiserror::Error)]
pub enum VidfeedError {
    /// A source failed to seek, play, or decode. Terminal for the render job.
    #[error("Source decode error ({uri}): {message}")]
    SourceDecode { uri: String, message: String },

    /// An invalid edit request. Recovered locally by the caller.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The output encoder failed to start, accept data, or finalize.
    #[error("Encoder error: {message}")]
    Encoder { message: String },

    /// A render was requested in a state that does not allow it.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VidfeedError.
pub type VidfeedResult<T> = Result<T, VidfeedError>;

impl VidfeedError {
    pub fn source_decode(uri: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceDecode {
            uri: uri.into(),
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error ends a render job (as opposed to a locally
    /// recoverable edit rejection).
    pub fn is_terminal_for_job(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::Precondition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_name_the_source() {
        let err = VidfeedError::source_decode("blob:abc", "seek failed");
        assert_eq!(err.to_string(), "Source decode error (blob:abc): seek failed");
        assert!(err.is_terminal_for_job());
    }

    #[test]
    fn validation_and_precondition_are_not_terminal() {
        assert!(!VidfeedError::validation("start >= end").is_terminal_for_job());
        assert!(!VidfeedError::precondition("already running").is_terminal_for_job());
        assert!(VidfeedError::encoder("closed").is_terminal_for_job());
    }
}
