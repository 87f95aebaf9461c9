//! keel-core: shared building blocks for the Keel control plane.
//!
//! Holds the `keel.toml` configuration model, the clock abstraction used
//! for every persisted timestamp, the deterministic image naming rules,
//! and the small descriptor types (apps, jobs, events) that flow between
//! the registry, the build orchestrator, and the tracker.

pub mod clock;
pub mod config;
pub mod image;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::KeelConfig;
pub use image::ImageNaming;
pub use types::*;
