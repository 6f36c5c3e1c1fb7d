//! Drag-to-edge window snapping.
//!
//! The transform watches left-button down/drag/up events and keeps a small
//! drag session:
//!
//! ```text
//!        left down             moved > drag threshold          left up
//! Idle ────────────▶ Pressed ─────────────────────────▶ Dragging ───────▶ Idle
//!                       │                                                  ▲
//!                       └──────────────── left up ─────────────────────────┘
//! ```
//!
//! When a drag ends inside a snap zone, the window move is deferred through
//! the [`Scheduler`] (Accessibility calls are far too slow for a tap
//! callback). The deferred task re-reads the window frame and only snaps if
//! the window actually moved, which tells a window drag apart from a text
//! selection or a drag inside the window's content.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tapwise_core::event::{EventMask, EventType, TapEvent, TapVerdict};
use tapwise_core::{Point, Rect, SnapZone, SnapZoneSet, WindowInfo};
use tracing::{debug, info, warn};

use super::{Feature, Transform};
use crate::application::scheduler::Scheduler;
use crate::application::settings::SnapSettings;
use crate::application::tap_manager::TapCallback;
use crate::application::window_geometry::{GeometryService, WindowMover};

/// Frames closer than this (px, per component) count as "not moved".
const MOVE_TOLERANCE_PX: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
enum DragSession {
    Idle,
    Pressed {
        start: Point,
        window: Option<WindowInfo>,
    },
    Dragging {
        window: Option<WindowInfo>,
    },
}

struct ZoneState {
    settings: SnapSettings,
    screens: Vec<Rect>,
    zones: SnapZoneSet,
}

pub struct SnapTransform {
    geometry: Arc<GeometryService>,
    mover: Arc<dyn WindowMover>,
    scheduler: Arc<dyn Scheduler>,
    zones: RwLock<ZoneState>,
    session: Mutex<DragSession>,
    snaps: Arc<AtomicU64>,
}

impl SnapTransform {
    pub fn new(
        geometry: Arc<GeometryService>,
        mover: Arc<dyn WindowMover>,
        scheduler: Arc<dyn Scheduler>,
        settings: SnapSettings,
    ) -> Self {
        Self {
            geometry,
            mover,
            scheduler,
            zones: RwLock::new(ZoneState {
                settings,
                screens: Vec::new(),
                zones: SnapZoneSet::default(),
            }),
            session: Mutex::new(DragSession::Idle),
            snaps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rebuilds the zones for a new display configuration.
    pub fn update_screens(&self, screens: &[Rect]) {
        let mut state = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        state.zones = SnapZoneSet::build(screens, state.settings.threshold_px);
        state.screens = screens.to_vec();
        debug!(screens = screens.len(), "snap zones rebuilt");
    }

    pub fn update_settings(&self, settings: SnapSettings) {
        let mut state = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        state.zones = SnapZoneSet::build(&state.screens, settings.threshold_px);
        state.settings = settings;
    }

    /// The zone a drag released at `point` would snap to.
    pub fn zone_at(&self, point: Point) -> Option<SnapZone> {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .zones
            .find(point)
            .copied()
    }

    pub fn screen_count(&self) -> usize {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).zones.screen_count()
    }

    /// Number of windows snapped since creation.
    pub fn snaps(&self) -> u64 {
        self.snaps.load(Ordering::Relaxed)
    }

    pub fn is_dragging(&self) -> bool {
        matches!(*self.session(), DragSession::Dragging { .. })
    }

    fn session(&self) -> MutexGuard<'_, DragSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drag_threshold(&self) -> f64 {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .settings
            .drag_threshold_px
    }

    fn on_press(&self, location: Point) {
        let window = match self.geometry.window_at(location) {
            Ok(window) => window,
            Err(e) => {
                debug!(error = %e, "no geometry at press; snap disabled for this drag");
                None
            }
        };
        *self.session() = DragSession::Pressed {
            start: location,
            window,
        };
    }

    fn on_drag(&self, location: Point) {
        let threshold = self.drag_threshold();
        let mut session = self.session();
        if let DragSession::Pressed { start, window } = &*session {
            if start.distance_squared(location) > threshold * threshold {
                let window = window.clone();
                *session = DragSession::Dragging { window };
            }
        }
    }

    fn on_release(&self, location: Point) {
        let finished = std::mem::replace(&mut *self.session(), DragSession::Idle);
        let DragSession::Dragging { window: Some(window) } = finished else {
            return;
        };
        let Some(zone) = self.zone_at(location) else {
            return;
        };

        debug!(window = %window.id, zone = ?zone.kind, "drag released in snap zone");
        let geometry = Arc::clone(&self.geometry);
        let mover = Arc::clone(&self.mover);
        let snaps = Arc::clone(&self.snaps);
        self.scheduler.schedule(
            Duration::ZERO,
            Box::new(move || snap_window(&geometry, mover.as_ref(), &window, &zone, &snaps)),
        );
    }
}

/// Deferred part of a snap: verify the window moved, then set its frame.
fn snap_window(
    geometry: &GeometryService,
    mover: &dyn WindowMover,
    window: &WindowInfo,
    zone: &SnapZone,
    snaps: &AtomicU64,
) {
    let current = match geometry.fresh_frame(window.id) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(window = %window.id, error = %e, "cannot re-read window frame; snap abandoned");
            return;
        }
    };
    if current.approx_eq(&window.frame, MOVE_TOLERANCE_PX) {
        debug!(window = %window.id, "window did not move during drag; not snapping");
        return;
    }

    match mover.set_frame(window, zone.target) {
        Ok(()) => {
            snaps.fetch_add(1, Ordering::Relaxed);
            info!(
                window = %window.id,
                owner = %window.owner_name,
                zone = ?zone.kind,
                target = ?zone.target,
                "window snapped"
            );
        }
        Err(e) => warn!(window = %window.id, error = %e, "window snap failed"),
    }
}

impl TapCallback for SnapTransform {
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        let location = event.location();
        match event_type {
            EventType::LeftMouseDown => self.on_press(location),
            EventType::LeftMouseDragged => self.on_drag(location),
            EventType::LeftMouseUp => self.on_release(location),
            _ => {}
        }
        TapVerdict::Forward
    }
}

impl Transform for SnapTransform {
    fn feature(&self) -> Feature {
        Feature::Snap
    }

    fn event_mask(&self) -> EventMask {
        EventMask::of(&[
            EventType::LeftMouseDown,
            EventType::LeftMouseDragged,
            EventType::LeftMouseUp,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapwise_core::event::SyntheticEvent;
    use tapwise_core::{Size, SnapZoneKind, WindowId};

    use crate::application::scheduler::Task;
    use crate::application::window_geometry::{GeometryError, MockWindowQuery, SystemClock};

    const SCREEN: Rect = Rect::new(0.0, 0.0, 1440.0, 900.0);
    const START: Rect = Rect::new(200.0, 200.0, 600.0, 400.0);

    #[derive(Default)]
    struct Queue(Mutex<Vec<Task>>);

    impl Queue {
        fn run(&self) -> usize {
            let tasks: Vec<Task> = self.0.lock().expect("lock").drain(..).collect();
            let n = tasks.len();
            tasks.into_iter().for_each(|t| t());
            n
        }
    }

    impl Scheduler for Queue {
        fn schedule(&self, _delay: Duration, task: Task) {
            self.0.lock().expect("lock").push(task);
        }
    }

    #[derive(Default)]
    struct Frames(Mutex<Vec<Rect>>);

    impl WindowMover for Frames {
        fn move_window(&self, _w: &WindowInfo, origin: Point) -> Result<(), GeometryError> {
            self.0.lock().expect("lock").push(Rect::new(origin.x, origin.y, 0.0, 0.0));
            Ok(())
        }
        fn resize_window(&self, _w: &WindowInfo, size: Size) -> Result<(), GeometryError> {
            let mut frames = self.0.lock().expect("lock");
            if let Some(last) = frames.last_mut() {
                last.width = size.width;
                last.height = size.height;
            }
            Ok(())
        }
    }

    fn setup(frame_after_drag: Rect) -> (SnapTransform, Arc<Queue>, Arc<Frames>) {
        let mut query = MockWindowQuery::new();
        query.expect_all_windows().returning(|_| {
            Ok(vec![WindowInfo {
                id: WindowId(5),
                frame: START,
                owner_pid: 77,
                owner_name: "Notes".to_string(),
                layer: 0,
            }])
        });
        query.expect_window_frame().returning(move |_| Ok(frame_after_drag));
        let geometry = Arc::new(GeometryService::new(
            Arc::new(query),
            Arc::new(SystemClock),
            Duration::from_millis(100),
        ));
        let queue = Arc::new(Queue::default());
        let frames = Arc::new(Frames::default());
        let snap = SnapTransform::new(
            geometry,
            Arc::clone(&frames) as Arc<dyn WindowMover>,
            Arc::clone(&queue) as Arc<dyn Scheduler>,
            SnapSettings::default(),
        );
        snap.update_screens(&[SCREEN]);
        (snap, queue, frames)
    }

    fn send(snap: &SnapTransform, ty: EventType, x: f64, y: f64) {
        let mut event = SyntheticEvent::new(ty, Point::new(x, y));
        assert_eq!(snap.on_event(ty, &mut event), TapVerdict::Forward);
    }

    #[test]
    fn test_drag_released_at_left_edge_snaps_to_left_half() {
        // Arrange
        let (snap, queue, frames) = setup(Rect::new(5.0, 250.0, 600.0, 400.0));

        // Act
        send(&snap, EventType::LeftMouseDown, 400.0, 210.0);
        send(&snap, EventType::LeftMouseDragged, 200.0, 300.0);
        send(&snap, EventType::LeftMouseDragged, 5.0, 450.0);
        send(&snap, EventType::LeftMouseUp, 5.0, 450.0);
        let ran = queue.run();

        // Assert
        assert_eq!(ran, 1);
        assert_eq!(*frames.0.lock().expect("lock"), vec![Rect::new(0.0, 0.0, 720.0, 900.0)]);
        assert_eq!(snap.snaps(), 1);
    }

    #[test]
    fn test_release_in_corner_prefers_corner_zone() {
        let (snap, queue, frames) = setup(Rect::new(0.0, 0.0, 600.0, 400.0));

        send(&snap, EventType::LeftMouseDown, 400.0, 210.0);
        send(&snap, EventType::LeftMouseDragged, 3.0, 3.0);
        send(&snap, EventType::LeftMouseUp, 3.0, 3.0);
        queue.run();

        assert_eq!(*frames.0.lock().expect("lock"), vec![Rect::new(0.0, 0.0, 720.0, 450.0)]);
        assert_eq!(snap.zone_at(Point::new(3.0, 3.0)).map(|z| z.kind), Some(SnapZoneKind::TopLeft));
    }

    #[test]
    fn test_small_wiggle_is_not_a_drag() {
        let (snap, queue, _frames) = setup(START);

        send(&snap, EventType::LeftMouseDown, 10.0, 450.0);
        send(&snap, EventType::LeftMouseDragged, 12.0, 451.0);
        assert!(!snap.is_dragging());
        send(&snap, EventType::LeftMouseUp, 12.0, 451.0);

        assert_eq!(queue.run(), 0);
    }

    #[test]
    fn test_release_outside_zones_does_nothing() {
        let (snap, queue, _frames) = setup(Rect::new(300.0, 300.0, 600.0, 400.0));

        send(&snap, EventType::LeftMouseDown, 400.0, 210.0);
        send(&snap, EventType::LeftMouseDragged, 700.0, 500.0);
        send(&snap, EventType::LeftMouseUp, 700.0, 500.0);

        assert_eq!(queue.run(), 0);
    }

    #[test]
    fn test_unmoved_window_is_not_snapped() {
        // Arrange: a text selection dragged to the edge; the frame never changes
        let (snap, queue, frames) = setup(START);

        // Act
        send(&snap, EventType::LeftMouseDown, 400.0, 300.0);
        send(&snap, EventType::LeftMouseDragged, 1435.0, 400.0);
        send(&snap, EventType::LeftMouseUp, 1435.0, 400.0);
        queue.run();

        // Assert
        assert!(frames.0.lock().expect("lock").is_empty());
        assert_eq!(snap.snaps(), 0);
    }

    #[test]
    fn test_press_on_desktop_never_snaps() {
        let (snap, queue, _frames) = setup(Rect::new(0.0, 0.0, 600.0, 400.0));

        send(&snap, EventType::LeftMouseDown, 1300.0, 800.0);
        send(&snap, EventType::LeftMouseDragged, 5.0, 450.0);
        send(&snap, EventType::LeftMouseUp, 5.0, 450.0);

        assert_eq!(queue.run(), 0);
    }

    #[test]
    fn test_threshold_change_rebuilds_zones() {
        let (snap, _queue, _frames) = setup(START);
        assert!(snap.zone_at(Point::new(30.0, 450.0)).is_none());

        snap.update_settings(SnapSettings {
            threshold_px: 40.0,
            ..SnapSettings::default()
        });

        assert_eq!(snap.zone_at(Point::new(30.0, 450.0)).map(|z| z.kind), Some(SnapZoneKind::Left));
    }
}
