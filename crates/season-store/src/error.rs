//! Error types for archive operations.

use season_core::TimeAxisError;
use thiserror::Error;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Primary error type for the seasonal grid archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested time resolves outside the dataset's declared span.
    #[error("time {key} is outside the season {start}..{end}")]
    Bounds {
        key: String,
        start: String,
        end: String,
    },

    /// No packing parameters could be determined and no override was given.
    #[error("cannot determine packing parameters for '{0}'")]
    UnpackableType(String),

    /// Payload shape disagrees with the dataset's declared spatial shape.
    #[error("payload shape {payload:?} does not match dataset spatial shape {expected:?}")]
    ShapeMismatch {
        payload: Vec<usize>,
        expected: Vec<usize>,
    },

    /// A forecast write starts before the season start.
    #[error("forecast starting {start} begins before the season start {season_start}")]
    SeasonBoundary {
        start: String,
        season_start: String,
    },

    /// The entire supplied forecast window is already superseded by
    /// observations. Fatal; never auto-recovered.
    #[error("forecast {start}..{end} is entirely superseded by observations through {last_obs}")]
    ForecastStale {
        start: String,
        end: String,
        last_obs: String,
    },

    /// No statistic generator is registered under the given name.
    #[error("unknown provenance generator: {0}")]
    UnknownGenerator(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or inconsistent dataset metadata.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),

    /// Dataset not found.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<TimeAxisError> for ArchiveError {
    fn from(err: TimeAxisError) -> Self {
        match err {
            TimeAxisError::OutOfBounds { key, start, end } => Self::Bounds { key, start, end },
            TimeAxisError::OffsetOutOfBounds { offset, len } => Self::Bounds {
                key: format!("offset {}", offset),
                start: "offset 0".to_string(),
                end: format!("offset {}", len.saturating_sub(1)),
            },
            other => Self::InvalidMetadata(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}
