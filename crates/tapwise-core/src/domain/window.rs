//! On-screen window descriptions as reported by the window server.

use std::fmt;

use super::geometry::{Point, Rect};

/// Window-server identifier of a window (`kCGWindowNumber`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single window with its frame in global display coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub frame: Rect,
    /// Process id of the owning application.
    pub owner_pid: i32,
    /// Owning application name (`kCGWindowOwnerName`).
    pub owner_name: String,
    /// Window layer. Regular document windows live on layer 0.
    pub layer: i32,
}

impl WindowInfo {
    /// Returns `true` for ordinary application windows (layer 0).
    pub fn is_normal_layer(&self) -> bool {
        self.layer == 0
    }
}

/// Returns the front-most normal window whose frame contains `point`.
///
/// `windows` must be ordered front-to-back, which is the order
/// `CGWindowListCopyWindowInfo` reports.
pub fn window_at(windows: &[WindowInfo], point: Point) -> Option<&WindowInfo> {
    windows
        .iter()
        .filter(|w| w.is_normal_layer())
        .find(|w| w.frame.contains(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: u32, frame: Rect, layer: i32) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            frame,
            owner_pid: 42,
            owner_name: "Finder".to_string(),
            layer,
        }
    }

    #[test]
    fn test_window_at_returns_front_most_match() {
        let windows = vec![
            window(1, Rect::new(0.0, 0.0, 400.0, 400.0), 0),
            window(2, Rect::new(0.0, 0.0, 800.0, 600.0), 0),
        ];
        let hit = window_at(&windows, Point::new(100.0, 100.0)).expect("window under point");
        assert_eq!(hit.id, WindowId(1));
    }

    #[test]
    fn test_window_at_skips_overlay_layers() {
        let windows = vec![
            window(9, Rect::new(0.0, 0.0, 1920.0, 25.0), 25),
            window(2, Rect::new(0.0, 0.0, 800.0, 600.0), 0),
        ];
        let hit = window_at(&windows, Point::new(10.0, 10.0)).expect("window under point");
        assert_eq!(hit.id, WindowId(2));
    }

    #[test]
    fn test_window_at_returns_none_on_bare_desktop() {
        let windows = vec![window(1, Rect::new(0.0, 0.0, 100.0, 100.0), 0)];
        assert!(window_at(&windows, Point::new(500.0, 500.0)).is_none());
    }
}
