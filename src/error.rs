//! Profile runtime error types

use thiserror::Error;

/// Profile runtime result type
pub type Result<T> = std::result::Result<T, ProfError>;

/// Errors surfaced by the profile runtime.
///
/// Node arena exhaustion is deliberately absent: a full arena drops the
/// observation instead of failing the instrumented code.
#[derive(Debug, Error)]
pub enum ProfError {
    /// The snapshot buffer could not be allocated
    #[error("out of memory: cannot allocate {requested} byte snapshot")]
    OutOfMemory { requested: usize },

    /// The handle has no snapshot behind it
    #[error("no snapshot for handle")]
    NoSnapshot,

    /// The serializer ran out of room in the output buffer
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The size calculator and serializer disagreed
    #[error("serialized {written} bytes but computed {computed}")]
    SizeMismatch { computed: usize, written: usize },

    /// The arena builder rejected a layout
    #[error("invalid arena layout: {0}")]
    InvalidLayout(String),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O error while writing a snapshot out
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
