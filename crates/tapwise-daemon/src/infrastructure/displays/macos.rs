//! macOS display enumeration via Core Graphics (`CGDisplay`).
//!
//! Display bounds already use the global display space with a
//! top-left origin at the primary display, which is the space event
//! locations and window bounds use, so no Y flip is applied.

use core_graphics::display::CGDisplay;
use tapwise_core::Rect;

use crate::application::engine::ScreenEnumerator;
use crate::application::window_geometry::GeometryError;

#[derive(Debug, Default, Clone, Copy)]
pub struct QuartzScreenEnumerator;

impl QuartzScreenEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenEnumerator for QuartzScreenEnumerator {
    /// Frames of every active display, primary first.
    fn screen_frames(&self) -> Result<Vec<Rect>, GeometryError> {
        let mut displays = CGDisplay::active_displays()
            .map_err(|e| GeometryError::Unavailable(format!("CGGetActiveDisplayList failed: {e}")))?;
        if displays.is_empty() {
            return Err(GeometryError::Unavailable(
                "CGGetActiveDisplayList returned zero displays".to_string(),
            ));
        }

        let primary = CGDisplay::main().id;
        displays.sort_by_key(|&id| id != primary);

        Ok(displays
            .into_iter()
            .map(|id| {
                let bounds = CGDisplay::new(id).bounds();
                Rect::new(bounds.origin.x, bounds.origin.y, bounds.size.width, bounds.size.height)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smoke-test: on a macOS machine with at least one display this must succeed.
    #[test]
    fn test_quartz_enumerator_returns_primary_display_first() {
        let frames = QuartzScreenEnumerator::new().screen_frames().expect("enumerate");

        assert!(!frames.is_empty());
        assert_eq!((frames[0].x, frames[0].y), (0.0, 0.0));
    }
}
