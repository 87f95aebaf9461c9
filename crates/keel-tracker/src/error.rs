//! Instance tracker error types.

use keel_state::StateError;
use thiserror::Error;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("host identity: {0}")]
    Host(String),

    #[error("no network interfaces available")]
    NoInterfaces,

    #[error("interface named {0:?} not found")]
    InterfaceNotFound(String),

    #[error("invalid listen address {address:?}: {reason}")]
    InvalidListen { address: String, reason: String },

    #[error("tracker shutdown cancelled")]
    Cancelled,

    #[error("missing configuration key {0}")]
    MissingConfig(&'static str),

    #[error("kubernetes: {0}")]
    Kubernetes(String),

    #[error("kubernetes api: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] StateError),
}

impl TrackerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Http(_) | TrackerError::Kubernetes(_))
    }
}
