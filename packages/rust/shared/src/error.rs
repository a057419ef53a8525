//! Error types for Distill.
//!
//! Library crates use [`DistillError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Distill operations.
#[derive(Debug, thiserror::Error)]
pub enum DistillError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The source document could not be acquired (missing file, HTTP failure,
    /// non-PDF response).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A call to the extraction or generative service failed (network, auth,
    /// quota, unexpected status).
    #[error("{service} service error: {message}")]
    ExternalService { service: String, message: String },

    /// The generative service answered, but not in the expected shape.
    #[error("malformed {context} output: {message}")]
    MalformedServiceOutput { context: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad parameter, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A stored cache record could not be read or decoded.
    ///
    /// The cache treats this as a miss; it is only ever logged.
    #[error("corrupt cache record at {path:?}: {message}")]
    CacheCorruption { path: PathBuf, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DistillError>;

impl DistillError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an external service error for the named service.
    pub fn external(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed-output error, `context` naming what was being parsed.
    pub fn malformed(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedServiceOutput {
            context: context.into(),
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
