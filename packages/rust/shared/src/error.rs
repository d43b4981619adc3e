//! Error types for ddxbuilder.
//!
//! Library crates use [`DdxBuilderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! "No qualifying next question" and "duplicate code after fusion" are *not*
//! errors — they are defined terminal states resolved by the traversal and
//! fusion rules and never surface here.

use std::path::PathBuf;

/// Top-level error type for all ddxbuilder operations.
#[derive(Debug, thiserror::Error)]
pub enum DdxBuilderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a hierarchy node.
    #[error("network error: {0}")]
    Network(String),

    /// Unparseable document or missing expected field.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad anchor pattern, invalid page window, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DdxBuilderError>;

impl DdxBuilderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DdxBuilderError::config("missing hierarchy root URI");
        assert_eq!(err.to_string(), "config error: missing hierarchy root URI");

        let err = DdxBuilderError::validation("start_page 700 is past end_page 694");
        assert!(err.to_string().contains("start_page 700"));
    }
}
