//! Error types for the Keel state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A version number outside `1..=count` of its aggregate.
    #[error("version {version} was never allocated for {app}")]
    UnallocatedVersion { app: String, version: u32 },

    /// The stored `updated_hash` no longer matches the caller's token.
    #[error("document {0} changed since it was read")]
    HashMismatch(String),
}

impl StateError {
    /// Storage faults that may succeed if the caller tries again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StateError::Transaction(_) | StateError::Read(_) | StateError::Write(_)
        )
    }
}
