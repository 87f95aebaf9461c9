//! Build orchestrator error types.

use keel_cluster::ClusterError;
use keel_version::VersionError;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("app not provided")]
    AppNotProvided,

    #[error("job not provided")]
    JobNotProvided,

    #[error("event not provided")]
    EventNotProvided,

    #[error("app rebuild is deprecated")]
    RebuildDeprecated,

    /// The request carries nothing to build from.
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    #[error("build cancelled")]
    Cancelled,

    /// The cluster has no build service, or the agent does not speak this
    /// protocol.
    #[error("build v2 not supported")]
    BuildV2NotSupported,

    #[error("could not download archive from {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("archive is empty")]
    ArchiveEmpty,

    #[error("neither Procfile nor entrypoint and cmd set")]
    NoProcesses,

    #[error("rollback not implemented")]
    RollbackNotImplemented,

    #[error("no nodes available")]
    NoNodesAvailable,

    #[error("failed to connect to build agent at {address}: {reason}")]
    Connect { address: String, reason: String },

    /// A non-OK status from the agent, surfaced as-is.
    #[error("build agent: {0}")]
    Rpc(tonic::Status),

    #[error("output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Version(#[from] VersionError),
}

impl BuildError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BuildError::Connect { .. } => true,
            BuildError::DownloadFailed { .. } => true,
            BuildError::Rpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::ResourceExhausted | tonic::Code::Aborted
            ),
            BuildError::Cluster(e) => e.is_retryable(),
            BuildError::Version(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_user_error(&self) -> bool {
        match self {
            BuildError::AppNotProvided
            | BuildError::JobNotProvided
            | BuildError::EventNotProvided
            | BuildError::RebuildDeprecated
            | BuildError::InvalidRequest(_)
            | BuildError::ArchiveEmpty
            | BuildError::NoProcesses
            | BuildError::RollbackNotImplemented => true,
            BuildError::Cluster(e) => e.is_user_error(),
            BuildError::Version(e) => e.is_user_error(),
            _ => false,
        }
    }

    /// Translate an agent status: `Unimplemented` and `Cancelled` have
    /// dedicated kinds, everything else is kept verbatim.
    pub fn from_status(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unimplemented => BuildError::BuildV2NotSupported,
            tonic::Code::Cancelled => BuildError::Cancelled,
            _ => BuildError::Rpc(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_translation() {
        assert!(matches!(
            BuildError::from_status(tonic::Status::unimplemented("nope")),
            BuildError::BuildV2NotSupported
        ));
        assert!(matches!(
            BuildError::from_status(tonic::Status::cancelled("bye")),
            BuildError::Cancelled
        ));
        let err = BuildError::from_status(tonic::Status::internal("boom"));
        match &err {
            BuildError::Rpc(status) => assert_eq!(status.message(), "boom"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!err.is_retryable());
        assert!(BuildError::from_status(tonic::Status::unavailable("later")).is_retryable());
    }

    #[test]
    fn user_errors() {
        assert!(BuildError::ArchiveEmpty.is_user_error());
        assert!(BuildError::NoProcesses.is_user_error());
        assert!(!BuildError::Cancelled.is_user_error());
        assert!(BuildError::Cluster(ClusterError::Validation("x".into())).is_user_error());
    }
}
