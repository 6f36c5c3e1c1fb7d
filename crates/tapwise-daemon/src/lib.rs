//! # tapwise-daemon
//!
//! The live half of Tapwise: event taps, device monitoring, window geometry
//! and the transform pipelines that rewrite input events in flight.
//!
//! - **`application`** holds the tap lifecycle manager, the device registry,
//!   the geometry cache, the four pipelines and the [`Engine`] that wires
//!   them together. It depends on traits only.
//! - **`infrastructure`** implements those traits against Quartz, IOKit,
//!   the window server and the Accessibility API on macOS, and provides
//!   in-memory fakes of each for tests.
//!
//! [`Engine`]: application::engine::Engine

pub mod application;
pub mod infrastructure;
