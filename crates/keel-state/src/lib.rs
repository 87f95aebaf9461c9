//! keel-state: persistent store for the Keel control plane.
//!
//! Backed by [redb](https://docs.rs/redb), provides the three document
//! collections the control plane relies on: per-application version
//! aggregates, tracked control-plane replicas, and provisioner clusters.
//!
//! # Architecture
//!
//! All documents are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by their natural identifier (app name, hostname, cluster name).
//!
//! Every `app_versions` mutation runs inside a single write transaction
//! that checks the optional compare-and-swap token, applies the change,
//! and rotates `updated_hash`. redb serializes writers, so mutations on
//! one aggregate are linearizable.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` and implements the
//! storage traits consumed by the higher-level services through the
//! [`ServiceContext`] bundle.

pub mod context;
pub mod error;
pub mod store;
pub mod tables;
pub mod traits;
pub mod types;

pub use context::ServiceContext;
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use traits::*;
pub use types::*;
