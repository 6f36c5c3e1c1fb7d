//! Infrastructure layer for the daemon.
//!
//! Contains OS-facing adapters: Quartz event taps, IOKit device monitoring,
//! the window server and Accessibility API, display enumeration, system
//! preferences, schedulers and file-system storage. Every adapter has an
//! always-compiled in-memory counterpart for tests.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `tapwise_core`, but MUST NOT be imported by the `application` layer.

pub mod devices;
pub mod displays;
pub mod event_tap;
pub mod permissions;
pub mod scheduler;
pub mod storage;
pub mod system_prefs;
pub mod windows;
