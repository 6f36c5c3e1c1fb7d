//! Drag-to-edge snap zones.
//!
//! Each display gets seven zones: four corner squares, the left and right
//! edge strips and the top strip. A zone pairs a trigger rectangle (where the
//! drag must end) with a target rectangle (where the window goes).

use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect};

/// Default width of the edge trigger strips.
pub const DEFAULT_SNAP_THRESHOLD_PX: f64 = 20.0;

/// Named snap zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapZoneKind {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Left,
    Right,
    /// Full-screen (maximize).
    Top,
}

impl SnapZoneKind {
    pub fn is_corner(self) -> bool {
        matches!(
            self,
            SnapZoneKind::TopLeft
                | SnapZoneKind::TopRight
                | SnapZoneKind::BottomLeft
                | SnapZoneKind::BottomRight
        )
    }

    /// Target layout in normalized screen coordinates.
    pub fn normalized_target(self) -> Rect {
        match self {
            SnapZoneKind::TopLeft => Rect::new(0.0, 0.0, 0.5, 0.5),
            SnapZoneKind::TopRight => Rect::new(0.5, 0.0, 0.5, 0.5),
            SnapZoneKind::BottomLeft => Rect::new(0.0, 0.5, 0.5, 0.5),
            SnapZoneKind::BottomRight => Rect::new(0.5, 0.5, 0.5, 0.5),
            SnapZoneKind::Left => Rect::new(0.0, 0.0, 0.5, 1.0),
            SnapZoneKind::Right => Rect::new(0.5, 0.0, 0.5, 1.0),
            SnapZoneKind::Top => Rect::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}

/// A trigger rectangle and the window frame it snaps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapZone {
    pub kind: SnapZoneKind,
    /// Absolute screen coordinates where a drag must end.
    pub trigger: Rect,
    /// Absolute target frame.
    pub target: Rect,
    /// Target frame relative to the screen, in `0..1`.
    pub normalized_target: Rect,
}

/// Builds the seven snap zones for one screen.
///
/// Corners come first in the returned list, so iterating it in order already
/// gives corners priority over edges.
pub fn build_snap_zones(screen: &Rect, threshold_px: f64) -> Vec<SnapZone> {
    let t = threshold_px;
    let triggers = [
        (SnapZoneKind::TopLeft, Rect::new(screen.min_x(), screen.min_y(), t, t)),
        (SnapZoneKind::TopRight, Rect::new(screen.max_x() - t, screen.min_y(), t, t)),
        (SnapZoneKind::BottomLeft, Rect::new(screen.min_x(), screen.max_y() - t, t, t)),
        (SnapZoneKind::BottomRight, Rect::new(screen.max_x() - t, screen.max_y() - t, t, t)),
        (SnapZoneKind::Left, Rect::new(screen.min_x(), screen.min_y(), t, screen.height)),
        (SnapZoneKind::Right, Rect::new(screen.max_x() - t, screen.min_y(), t, screen.height)),
        (SnapZoneKind::Top, Rect::new(screen.min_x(), screen.min_y(), screen.width, t)),
    ];

    triggers
        .into_iter()
        .map(|(kind, trigger)| {
            let normalized_target = kind.normalized_target();
            SnapZone {
                kind,
                trigger,
                target: screen.denormalize(&normalized_target),
                normalized_target,
            }
        })
        .collect()
}

/// Returns the zone whose trigger contains `point`, corners before edges.
pub fn check_snap_zone(zones: &[SnapZone], point: Point) -> Option<&SnapZone> {
    zones
        .iter()
        .filter(|z| z.kind.is_corner())
        .chain(zones.iter().filter(|z| !z.kind.is_corner()))
        .find(|z| z.trigger.contains(point))
}

/// Snap zones for every attached display.
///
/// Rebuilt as a whole whenever the display configuration changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapZoneSet {
    screens: Vec<(Rect, Vec<SnapZone>)>,
}

impl SnapZoneSet {
    pub fn build(screens: &[Rect], threshold_px: f64) -> Self {
        Self {
            screens: screens
                .iter()
                .map(|s| (*s, build_snap_zones(s, threshold_px)))
                .collect(),
        }
    }

    /// Finds the zone for `point` on whichever screen contains it.
    ///
    /// Screens own their edges half-open: a point on the seam between two
    /// displays belongs to the screen that starts there. The far edge of a
    /// screen only counts when no neighbour starts at it.
    pub fn find(&self, point: Point) -> Option<&SnapZone> {
        let owner = self
            .screens
            .iter()
            .find(|(screen, _)| owns(screen, point))
            .or_else(|| self.screens.iter().find(|(screen, _)| screen.contains(point)))?;
        check_snap_zone(&owner.1, point)
    }

    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

fn owns(screen: &Rect, point: Point) -> bool {
    point.x >= screen.min_x()
        && point.x < screen.max_x()
        && point.y >= screen.min_y()
        && point.y < screen.max_y()
}
