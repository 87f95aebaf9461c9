//! Error types for the cluster registry.

use keel_state::StateError;
use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Neither a pool-specific nor a default cluster exists.
    #[error("no cluster")]
    NoCluster,

    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    /// More than one cluster claims the same pool.
    #[error("too many clusters for pool {0}")]
    TooManyPools(String),

    #[error("unable to find cluster for pool {0:?}")]
    NoClusterForPool(String),

    #[error("invalid cluster: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StateError),
}

impl ClusterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::Storage(e) if e.is_transient())
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ClusterError::Validation(_) | ClusterError::ClusterNotFound(_)
        )
    }
}
