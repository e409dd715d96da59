//! Infrastructure and engine error types.

use thiserror::Error;

use stockbook_core::DomainError;

/// State store operation error.
///
/// These are **infrastructure errors** (locking, snapshot IO) as opposed to
/// domain errors (validation, availability, balance).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Error returned by every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }

    /// Stable code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(e) => e.code(),
            EngineError::Store(_) => "store",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
