//! keel-build: the build orchestrator.
//!
//! Turns a deploy request into a committed application version by
//! dispatching the image build to the build agent of the app's cluster.
//!
//! # Flow
//!
//! ```text
//! pre-flight ─► cluster selected ─► version allocated ─► rpc open
//!                                                          │
//!                                   output chunks ◄────────┤
//!                                   first TsuruConfig ◄────┤
//!                                                          ▼
//!                          rpc closed ─► metadata applied ─► base image committed
//! ```
//!
//! Every suspension point (archive download, agent connect, RPC open,
//! stream receive, store round trips) is raced against the caller's
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Nothing is
//! retried; a failed build leaves its pending version behind.

pub mod agent;
pub mod archive;
pub mod error;
pub mod metadata;
pub mod opts;
pub mod orchestrator;
pub mod output;

/// Generated protobuf types and gRPC stubs of the build agent protocol.
pub mod proto {
    tonic::include_proto!("grpc_build_v1");
}

pub use agent::{AgentEndpoint, BuildAgent, BuildAgentConnector, GrpcConnector};
pub use error::{BuildError, BuildResult};
pub use opts::{BuildOpts, BuildSource, JobBuildOpts, PlatformOptions};
pub use orchestrator::BuildOrchestrator;
