//! Window list and window manipulation.
//!
//! | Module  | OS    | Query                          | Mover                     |
//! |---------|-------|--------------------------------|---------------------------|
//! | `macos` | macOS | `CGWindowListCopyWindowInfo`   | Accessibility `AXPosition`/`AXSize` |
//! | `mock`  | any   | in-memory window list          | records every move        |

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "macos")]
pub use macos::{AccessibilityWindowMover as NativeWindowMover, QuartzWindowQuery as NativeWindowQuery};

pub use mock::{MoveRecord, RecordingWindowMover, StaticWindowQuery};
