//! Integration tests for the transform pipelines.
//!
//! Events are pushed through `MockTapBackend` into taps owned by a real
//! `Engine`, so every test covers the path an OS event takes: backend route,
//! tap manager dispatch, transform, verdict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tapwise_core::event::{EventField, EventType, SyntheticEvent, TapEvent, TapVerdict};
use tapwise_core::{
    AccelerationCurve, CurvePreset, DeviceType, Point, Rect, ScrollDirection, VelocityMapper, WindowId, WindowInfo,
};
use tapwise_daemon::application::engine::{Engine, EngineDeps};
use tapwise_daemon::application::settings::{AccelerationSettings, ScrollSettings, Settings};
use tapwise_daemon::application::window_geometry::SystemClock;
use tapwise_daemon::infrastructure::devices::mock::{builtin_trackpad, usb_mouse};
use tapwise_daemon::infrastructure::devices::MockDeviceMonitor;
use tapwise_daemon::infrastructure::displays::MockScreenEnumerator;
use tapwise_daemon::infrastructure::event_tap::MockTapBackend;
use tapwise_daemon::infrastructure::permissions::StaticPermissionChecker;
use tapwise_daemon::infrastructure::scheduler::ManualScheduler;
use tapwise_daemon::infrastructure::system_prefs::FixedScrollPreference;
use tapwise_daemon::infrastructure::windows::{MoveRecord, RecordingWindowMover, StaticWindowQuery};

const SCREEN: Rect = Rect::new(0.0, 0.0, 1440.0, 900.0);
const NOTES_FRAME: Rect = Rect::new(200.0, 200.0, 600.0, 400.0);
const NOTES: WindowId = WindowId(5);

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    engine: Engine,
    backend: Arc<MockTapBackend>,
    scheduler: Arc<ManualScheduler>,
    windows: Arc<StaticWindowQuery>,
    mover: Arc<RecordingWindowMover>,
}

fn notes_window() -> WindowInfo {
    WindowInfo {
        id: NOTES,
        frame: NOTES_FRAME,
        owner_pid: 77,
        owner_name: "Notes".to_string(),
        layer: 0,
    }
}

fn start_engine(settings: Settings, natural_scrolling: bool, devices: MockDeviceMonitor) -> Harness {
    let backend = Arc::new(MockTapBackend::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let windows = Arc::new(StaticWindowQuery::new(vec![notes_window()]));
    let mover = Arc::new(RecordingWindowMover::linked(Arc::clone(&windows)));

    let deps = EngineDeps {
        tap_backend: Arc::clone(&backend) as _,
        permissions: Arc::new(StaticPermissionChecker::granted()),
        scheduler: Arc::clone(&scheduler) as _,
        device_monitor: Arc::new(devices),
        window_query: Arc::clone(&windows) as _,
        window_mover: Arc::clone(&mover) as _,
        scroll_preference: Arc::new(FixedScrollPreference::new(natural_scrolling)),
        screens: Arc::new(MockScreenEnumerator::new(vec![SCREEN])),
        clock: Arc::new(SystemClock),
    };
    let engine = Engine::new(deps, settings);
    let report = engine.start();
    assert!(!report.has_failures(), "engine must start cleanly: {report:?}");

    Harness {
        engine,
        backend,
        scheduler,
        windows,
        mover,
    }
}

fn scroll_settings(per_type: &[(DeviceType, ScrollDirection)]) -> Settings {
    Settings {
        scroll: ScrollSettings {
            per_type: per_type.iter().copied().collect(),
            per_device: HashMap::new(),
        },
        ..Settings::default()
    }
}

fn axes(event: &SyntheticEvent) -> (i64, i64) {
    (
        event.integer_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1),
        event.integer_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_2),
    )
}

fn send(harness: &Harness, event_type: EventType, x: f64, y: f64) -> TapVerdict {
    let mut event = SyntheticEvent::new(event_type, Point::new(x, y));
    harness.backend.broadcast(&mut event)
}

// ── Scroll direction ──────────────────────────────────────────────────────────

#[test]
fn test_traditional_mouse_scroll_is_inverted_under_natural_system_setting() {
    // Arrange
    let harness = start_engine(
        scroll_settings(&[(DeviceType::Mouse, ScrollDirection::Traditional)]),
        true,
        MockDeviceMonitor::with_devices(vec![usb_mouse()]),
    );
    let mut event = SyntheticEvent::scroll(3, -2);

    // Act
    let verdict = harness.backend.deliver("scroll", &mut event).expect("scroll tap must be live");

    // Assert
    assert_eq!(verdict, TapVerdict::Forward);
    assert_eq!(axes(&event), (-3, 2), "both axes must flip sign");
    assert_eq!(event.double_field(EventField::SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_1), -3.0);
    assert_eq!(event.integer_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2), 20);
}

#[test]
fn test_momentum_scroll_passes_through_untouched() {
    let harness = start_engine(
        scroll_settings(&[(DeviceType::Trackpad, ScrollDirection::Traditional)]),
        true,
        MockDeviceMonitor::with_devices(vec![builtin_trackpad()]),
    );
    let mut event = SyntheticEvent::scroll(4, 0).with_continuous(true).with_momentum_phase(2);

    harness.backend.deliver("scroll", &mut event).expect("scroll tap must be live");

    assert_eq!(axes(&event), (4, 0));
}

#[test]
fn test_matching_direction_leaves_scroll_alone() {
    let harness = start_engine(
        scroll_settings(&[(DeviceType::Mouse, ScrollDirection::Natural)]),
        true,
        MockDeviceMonitor::new(),
    );
    let mut event = SyntheticEvent::scroll(1, 1);

    harness.backend.deliver("scroll", &mut event).expect("scroll tap must be live");

    assert_eq!(axes(&event), (1, 1));
}

#[test]
fn test_continuous_scroll_uses_trackpad_entry_while_wheel_uses_mouse_entry() {
    // Arrange: mouse wants traditional, trackpad follows the system (natural)
    let harness = start_engine(
        scroll_settings(&[
            (DeviceType::Mouse, ScrollDirection::Traditional),
            (DeviceType::Trackpad, ScrollDirection::Natural),
        ]),
        true,
        MockDeviceMonitor::with_devices(vec![usb_mouse(), builtin_trackpad()]),
    );
    let mut wheel = SyntheticEvent::scroll(2, 0);
    let mut swipe = SyntheticEvent::scroll(2, 0).with_continuous(true);

    // Act
    harness.backend.deliver("scroll", &mut wheel);
    harness.backend.deliver("scroll", &mut swipe);

    // Assert
    assert_eq!(axes(&wheel), (-2, 0));
    assert_eq!(axes(&swipe), (2, 0));
}

#[test]
fn test_per_device_entry_beats_per_type_entry() {
    let mut settings = scroll_settings(&[(DeviceType::Mouse, ScrollDirection::Traditional)]);
    settings
        .scroll
        .per_device
        .insert(usb_mouse().device_id(), ScrollDirection::Natural);
    let harness = start_engine(settings, true, MockDeviceMonitor::with_devices(vec![usb_mouse()]));
    let mut event = SyntheticEvent::scroll(5, 0);

    harness.backend.deliver("scroll", &mut event);

    assert_eq!(axes(&event), (5, 0));
}

// ── Snap ──────────────────────────────────────────────────────────────────────

#[test]
fn test_drag_ending_at_left_edge_snaps_window_to_left_half() {
    // Arrange
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());

    // Act: press on the window, drag it to the left edge, release at mid-height
    send(&harness, EventType::LeftMouseDown, 400.0, 300.0);
    send(&harness, EventType::LeftMouseDragged, 300.0, 350.0);
    send(&harness, EventType::LeftMouseDragged, 5.0, 450.0);
    harness.windows.set_frame(NOTES, Rect::new(-195.0, 350.0, 600.0, 400.0));
    send(&harness, EventType::LeftMouseUp, 5.0, SCREEN.height / 2.0);
    let ran = harness.scheduler.run_due();

    // Assert
    let left_half = Rect::new(0.0, 0.0, 720.0, 900.0);
    assert_eq!(ran, 1, "the window move must be deferred to the scheduler");
    assert_eq!(harness.mover.final_frame(NOTES, NOTES_FRAME), left_half);
    assert_eq!(harness.engine.snap().transform().snaps(), 1);
}

#[test]
fn test_snap_is_deferred_not_run_inside_the_callback() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());

    send(&harness, EventType::LeftMouseDown, 400.0, 300.0);
    send(&harness, EventType::LeftMouseDragged, 5.0, 450.0);
    harness.windows.set_frame(NOTES, Rect::new(-195.0, 350.0, 600.0, 400.0));
    send(&harness, EventType::LeftMouseUp, 5.0, 450.0);

    assert!(harness.mover.records().is_empty());
    assert_eq!(harness.scheduler.pending(), 1);
}

#[test]
fn test_drag_that_did_not_move_the_window_does_not_snap() {
    // A text selection dragged to the screen edge leaves the window in place.
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());

    send(&harness, EventType::LeftMouseDown, 400.0, 300.0);
    send(&harness, EventType::LeftMouseDragged, 5.0, 450.0);
    send(&harness, EventType::LeftMouseUp, 5.0, 450.0);
    harness.scheduler.run_due();

    assert!(harness.mover.records().is_empty());
    assert_eq!(harness.engine.snap().transform().snaps(), 0);
}

#[test]
fn test_click_without_drag_never_schedules_a_snap() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());

    send(&harness, EventType::LeftMouseDown, 5.0, 450.0);
    send(&harness, EventType::LeftMouseUp, 5.0, 450.0);

    assert_eq!(harness.scheduler.pending(), 0);
}

#[test]
fn test_refused_window_move_is_not_counted_as_a_snap() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());
    harness.mover.refuse(true);

    send(&harness, EventType::LeftMouseDown, 400.0, 300.0);
    send(&harness, EventType::LeftMouseDragged, 5.0, 450.0);
    harness.windows.set_frame(NOTES, Rect::new(-195.0, 350.0, 600.0, 400.0));
    send(&harness, EventType::LeftMouseUp, 5.0, 450.0);
    harness.scheduler.run_due();

    assert_eq!(harness.engine.snap().transform().snaps(), 0);
    assert!(!harness
        .mover
        .records()
        .iter()
        .any(|r| matches!(r, MoveRecord::Resized { .. })));
}

// ── Corner fix ────────────────────────────────────────────────────────────────

#[test]
fn test_click_in_corner_dead_zone_is_moved_onto_the_corner() {
    // Arrange
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());
    let mut event = SyntheticEvent::new(EventType::LeftMouseDown, Point::new(202.0, 202.0));

    // Act
    let verdict = harness
        .backend
        .deliver("corner-fix", &mut event)
        .expect("corner fix tap must be live");

    // Assert
    assert_eq!(verdict, TapVerdict::Forward);
    let p = event.location();
    assert!((p.x - 200.0).abs() <= 1.0 && (p.y - 200.0).abs() <= 1.0, "got {p:?}");
    assert_eq!(harness.engine.corner_fix().transform().corrections(), 1);
}

#[test]
fn test_pointer_in_window_interior_is_not_moved() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());
    let mut event = SyntheticEvent::mouse_moved(Point::new(500.0, 400.0), 1.0, 1.0);

    harness.backend.deliver("corner-fix", &mut event);

    assert_eq!(event.location(), Point::new(500.0, 400.0));
}

// ── Acceleration ──────────────────────────────────────────────────────────────

fn acceleration_settings(preset: CurvePreset) -> Settings {
    Settings {
        acceleration: AccelerationSettings {
            enabled: true,
            mapper: VelocityMapper::new(AccelerationCurve::preset(preset), 0.5, 60.0),
        },
        ..Settings::default()
    }
}

#[test]
fn test_gaming_curve_amplifies_slow_motion_and_keeps_direction() {
    // Arrange
    let harness = start_engine(acceleration_settings(CurvePreset::Gaming), true, MockDeviceMonitor::new());
    let mut event = SyntheticEvent::mouse_moved(Point::new(1000.0, 100.0), 3.0, 4.0);

    // Act
    harness
        .backend
        .deliver("acceleration", &mut event)
        .expect("acceleration tap must be live");

    // Assert
    let dx = event.double_field(EventField::MOUSE_EVENT_DELTA_X);
    let dy = event.double_field(EventField::MOUSE_EVENT_DELTA_Y);
    assert!(dx > 3.0, "gaming curve must speed up slow motion, got {dx}");
    assert!((dx / dy - 0.75).abs() < 1e-9, "direction must be preserved");
}

#[test]
fn test_motion_below_min_velocity_is_not_scaled() {
    let harness = start_engine(acceleration_settings(CurvePreset::Gaming), true, MockDeviceMonitor::new());
    let mut event = SyntheticEvent::mouse_moved(Point::new(1000.0, 100.0), 0.2, 0.1);

    harness.backend.deliver("acceleration", &mut event);

    assert_eq!(event.double_field(EventField::MOUSE_EVENT_DELTA_X), 0.2);
    assert_eq!(event.location(), Point::new(1000.0, 100.0));
}

#[test]
fn test_acceleration_is_off_by_default() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());

    assert!(harness.backend.handle("acceleration").is_none());
    assert!(!harness.engine.acceleration().is_running());
}

// ── Pipeline lifecycle ────────────────────────────────────────────────────────

#[test]
fn test_pipeline_start_and_stop_are_idempotent() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());
    let snap = harness.engine.snap();
    let created = harness.backend.created_count();

    snap.start().expect("second start is a no-op");
    assert_eq!(harness.backend.created_count(), created);

    assert!(snap.stop());
    assert!(!snap.stop());
    assert!(!snap.is_running());
    assert!(harness.backend.handle("snap").is_none());
}

#[test]
fn test_stopped_pipeline_no_longer_sees_events() {
    let harness = start_engine(Settings::default(), true, MockDeviceMonitor::new());
    harness.engine.corner_fix().stop();
    let mut event = SyntheticEvent::new(EventType::LeftMouseDown, Point::new(202.0, 202.0));

    let verdict = harness.backend.broadcast(&mut event);

    assert_eq!(verdict, TapVerdict::Forward);
    assert_eq!(event.location(), Point::new(202.0, 202.0));
}

// ── Latency ───────────────────────────────────────────────────────────────────

#[test]
fn test_per_event_latency_stays_inside_tap_budget() {
    // Arrange: every pointer pipeline on, plus a crowded window list
    let harness = start_engine(acceleration_settings(CurvePreset::System), true, MockDeviceMonitor::new());
    let crowd: Vec<WindowInfo> = (0..60u32)
        .map(|i| WindowInfo {
            id: WindowId(100 + i),
            frame: Rect::new(f64::from(i) * 20.0, f64::from(i) * 10.0, 500.0, 400.0),
            owner_pid: 1000 + i as i32,
            owner_name: format!("app-{i}"),
            layer: 0,
        })
        .collect();
    harness.windows.set_windows(crowd);
    harness.engine.geometry().invalidate();

    // Act
    let mut samples: Vec<Duration> = Vec::with_capacity(5_000);
    for i in 0..5_000u32 {
        let x = f64::from(i % 1400);
        let y = f64::from((i * 7) % 880);
        let mut event = SyntheticEvent::mouse_moved(Point::new(x, y), 6.0, -3.0);
        let started = Instant::now();
        harness.backend.broadcast(&mut event);
        samples.push(started.elapsed());
    }

    // Assert
    samples.sort();
    let p99 = samples[samples.len() * 99 / 100];
    assert!(p99 < Duration::from_millis(5), "p99 latency {p99:?} exceeds the 5ms tap budget");
}
