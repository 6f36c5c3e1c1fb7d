//! Pointing-device monitors.
//!
//! A monitor reports attach and detach events into a
//! [`DeviceSink`](crate::application::device_registry::DeviceSink); the
//! registry does the classification.
//!
//! | Module  | OS    | API used                                          |
//! |---------|-------|---------------------------------------------------|
//! | `macos` | macOS | `IOHIDManager` matching generic-desktop pointers  |
//! | `mock`  | any   | tests attach and detach descriptors by hand       |

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "macos")]
pub use macos::HidDeviceMonitor as NativeDeviceMonitor;

pub use mock::MockDeviceMonitor;
