//! keel-cluster: the cluster registry.
//!
//! Maps `(provisioner, pool)` to a [`Cluster`](keel_state::Cluster)
//! descriptor, falling back to the provisioner's default cluster, and
//! reads the per-cluster build settings out of `custom_data`.

pub mod error;
pub mod registry;
pub mod settings;

pub use error::{ClusterError, ClusterResult};
pub use registry::ClusterRegistry;
pub use settings::ClusterSettings;
