//! Event tap backends.
//!
//! A backend turns a [`TapSpec`] into a live OS interception handle and
//! delivers every intercepted event through the [`TapRoute`] it was given.
//! The [`TapManager`] owns the handles and decides what happens to events.
//!
//! | Module  | OS    | API used                                           |
//! |---------|-------|----------------------------------------------------|
//! | `macos` | macOS | `CGEventTapCreate` + `CFMachPort` run-loop source  |
//! | `mock`  | any   | in-memory; tests push [`SyntheticEvent`]s through  |
//!
//! The macOS backend is re-exported as `NativeTapBackend` so the binary can
//! refer to it without any `cfg` of its own.
//!
//! [`TapSpec`]: crate::application::tap_manager::TapSpec
//! [`TapRoute`]: crate::application::tap_manager::TapRoute
//! [`TapManager`]: crate::application::tap_manager::TapManager
//! [`SyntheticEvent`]: tapwise_core::event::SyntheticEvent

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "macos")]
pub use macos::QuartzTapBackend as NativeTapBackend;

pub use mock::{MockTapBackend, MockTapHandle};
