//! Engine Error Types

use thiserror::Error;

/// Anonymization engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Out-of-range parameter, null-equivalent argument, or a handle that
    /// does not belong to this result
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An unforked output handle is outstanding; release it before
    /// requesting a forked one
    #[error("The output buffer is locked by a non-forked handle")]
    BufferLocked,

    /// Unexpected failure inside the engine while all data was already
    /// resident in memory
    #[error("Internal error: {0}")]
    Internal(String),

    /// The merge phase of a local-recoding step failed after it started
    /// mutating the output buffer. The handle is in an unknown state and
    /// must be rebuilt via `output_for` before it is used again.
    #[error("Local recoding failed mid-merge; rebuild the output handle: {0}")]
    RollbackRequired(String),

    /// Configuration load or parse failure
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Persisted state could not be decoded
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
