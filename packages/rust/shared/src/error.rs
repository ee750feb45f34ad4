//! Error types for artmatch.
//!
//! Library crates use [`ArtMatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all artmatch operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtMatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transient upstream failure: transport error or a non-2xx status
    /// other than rate limiting.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The upstream signalled rate limiting.
    #[error("rate limited by upstream (HTTP {status})")]
    RateLimited { status: u16 },

    /// Every attempt of a single invocation failed.
    #[error("upstream exhausted after {attempts} attempts: {last_error}")]
    UpstreamExhausted { attempts: u32, last_error: String },

    /// A response reached the caller but could not be decoded.
    #[error("format error: {message}")]
    Format { message: String },

    /// Required input records are missing or malformed.
    #[error("input error: {message}")]
    Input { message: String },

    /// Delimited-record encode/decode error.
    #[error("table error: {0}")]
    Table(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A pipeline stage aborted the run.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        source: Box<ArtMatchError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArtMatchError>;

impl ArtMatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a format error from any displayable message.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format {
            message: msg.into(),
        }
    }

    /// Create a fatal input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
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

    /// Attribute an error to the pipeline stage that produced it.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Whether a single attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::RateLimited { .. })
    }

    /// Whether this error is a decode failure that stages degrade locally.
    pub fn is_format(&self) -> bool {
        match self {
            Self::Format { .. } => true,
            Self::Stage { source, .. } => source.is_format(),
            _ => false,
        }
    }
}
