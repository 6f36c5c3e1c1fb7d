//! Display enumeration.
//!
//! Snap zones are built from the bounds of every active display, and a
//! change in the display set invalidates the cached window geometry. The
//! daemon polls the enumerator and hands the result to
//! [`Engine::on_display_change`](crate::application::engine::Engine::on_display_change).
//!
//! | Module  | OS    | API used                                     |
//! |---------|-------|----------------------------------------------|
//! | `macos` | macOS | `CGGetActiveDisplayList` + `CGDisplayBounds` |
//!
//! [`MockScreenEnumerator`] is always compiled so tests on any platform can
//! use it without a physical display.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tapwise_core::Rect;

use crate::application::engine::ScreenEnumerator;
use crate::application::window_geometry::GeometryError;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "macos")]
pub use macos::QuartzScreenEnumerator as NativeScreenEnumerator;

// ── Mock implementation (always compiled for tests) ───────────────────────────

/// A screen enumerator returning a configurable list of display frames.
pub struct MockScreenEnumerator {
    frames: Mutex<Result<Vec<Rect>, GeometryError>>,
}

impl MockScreenEnumerator {
    pub fn new(frames: Vec<Rect>) -> Self {
        Self {
            frames: Mutex::new(Ok(frames)),
        }
    }

    /// A single 1920×1080 display.
    pub fn single_1080p() -> Self {
        Self::new(vec![Rect::new(0.0, 0.0, 1920.0, 1080.0)])
    }

    /// Two 2560×1440 displays side by side, primary on the left.
    pub fn dual_1440p() -> Self {
        Self::new(vec![
            Rect::new(0.0, 0.0, 2560.0, 1440.0),
            Rect::new(2560.0, 0.0, 2560.0, 1440.0),
        ])
    }

    /// Replaces the display list, as if a display was plugged or unplugged.
    pub fn set_frames(&self, frames: Vec<Rect>) {
        *self.lock() = Ok(frames);
    }

    pub fn fail_with(&self, error: GeometryError) {
        *self.lock() = Err(error);
    }

    fn lock(&self) -> MutexGuard<'_, Result<Vec<Rect>, GeometryError>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScreenEnumerator for MockScreenEnumerator {
    fn screen_frames(&self) -> Result<Vec<Rect>, GeometryError> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_enumerator_single_1080p_returns_one_display() {
        // Arrange
        let enumerator = MockScreenEnumerator::single_1080p();

        // Act
        let frames = enumerator.screen_frames().expect("enumerate");

        // Assert
        assert_eq!(frames, vec![Rect::new(0.0, 0.0, 1920.0, 1080.0)]);
    }

    #[test]
    fn test_mock_enumerator_dual_1440p_places_second_display_to_the_right() {
        let frames = MockScreenEnumerator::dual_1440p().screen_frames().expect("enumerate");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].x, 2560.0);
    }

    #[test]
    fn test_set_frames_and_failure_are_observed() {
        let enumerator = MockScreenEnumerator::single_1080p();

        enumerator.set_frames(Vec::new());
        assert_eq!(enumerator.screen_frames(), Ok(Vec::new()));

        enumerator.fail_with(GeometryError::Unavailable("display server gone".to_string()));
        assert!(enumerator.screen_frames().is_err());
    }
}
