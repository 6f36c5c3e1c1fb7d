//! Application layer: use cases and the traits they depend on.
//!
//! Nothing in here calls an OS API. Every platform service is reached
//! through a trait implemented in `infrastructure`, which keeps this layer
//! testable on any host.

pub mod device_registry;
pub mod engine;
pub mod pipelines;
pub mod scheduler;
pub mod settings;
pub mod tap_manager;
pub mod window_geometry;
