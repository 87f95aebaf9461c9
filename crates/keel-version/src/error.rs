//! Error types for the version registry.

use keel_state::StateError;
use thiserror::Error;

pub type VersionResult<T> = Result<T, VersionError>;

#[derive(Debug, Error)]
pub enum VersionError {
    /// The app has no aggregate, or nothing matched the lookup.
    #[error("no versions available for app")]
    NoVersionsAvailable,

    #[error("version {version} of app {app} is not available")]
    VersionNotAvailable { app: String, version: u32 },

    #[error("invalid version: {requested}")]
    InvalidVersion { requested: String },

    /// The aggregate changed between read and write.
    #[error("transaction cancelled by a concurrent change")]
    TransactionCancelledByChange,

    #[error("process {name} not found")]
    ProcessNotFound { name: String },

    #[error("invalid tsuru.yaml: {0}")]
    InvalidYaml(String),

    #[error(transparent)]
    Storage(StateError),
}

impl VersionError {
    /// Worth retrying after a fresh read.
    pub fn is_retryable(&self) -> bool {
        match self {
            VersionError::TransactionCancelledByChange => true,
            VersionError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Caused by caller input rather than system state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VersionError::InvalidVersion { .. }
                | VersionError::ProcessNotFound { .. }
                | VersionError::InvalidYaml(_)
        )
    }
}

impl From<StateError> for VersionError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(_) => VersionError::NoVersionsAvailable,
            StateError::HashMismatch(_) => VersionError::TransactionCancelledByChange,
            StateError::UnallocatedVersion { app, version } => {
                VersionError::VersionNotAvailable { app, version }
            }
            other => VersionError::Storage(other),
        }
    }
}
