//! Window geometry access with a short-lived cache.
//!
//! Asking the window server for the window list costs a few milliseconds,
//! which is too much to pay on every mouse move. [`GeometryService`] keeps
//! the last list for a short TTL (100ms by default) and serves it from
//! memory. A snapshot older than the TTL is never served; the next read
//! refreshes it.
//!
//! The cache has its own mutex, separate from the tap registry. It is never
//! held across a window-server query.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tapwise_core::{window_at, Point, Rect, Size, WindowId, WindowInfo};
use thiserror::Error;
use tracing::trace;

/// Default lifetime of a cached window snapshot.
pub const DEFAULT_GEOMETRY_TTL: Duration = Duration::from_millis(100);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// The window server could not be queried.
    #[error("window geometry unavailable: {0}")]
    Unavailable(String),

    #[error("window {0} not found")]
    WindowNotFound(WindowId),

    #[error("failed to move or resize window: {0}")]
    MoveFailed(String),
}

/// Read access to on-screen windows.
#[cfg_attr(test, mockall::automock)]
pub trait WindowQuery: Send + Sync {
    /// Windows ordered front to back.
    fn all_windows(&self, on_screen_only: bool) -> Result<Vec<WindowInfo>, GeometryError>;

    fn frontmost_window(&self) -> Result<Option<WindowInfo>, GeometryError>;

    fn window_frame(&self, id: WindowId) -> Result<Rect, GeometryError>;
}

/// Write access to window frames.
pub trait WindowMover: Send + Sync {
    fn move_window(&self, window: &WindowInfo, origin: Point) -> Result<(), GeometryError>;

    fn resize_window(&self, window: &WindowInfo, size: Size) -> Result<(), GeometryError>;

    /// Moves, then resizes. Moving first keeps the resize from being
    /// clamped against the old position's screen edge.
    fn set_frame(&self, window: &WindowInfo, frame: Rect) -> Result<(), GeometryError> {
        self.move_window(window, frame.origin())?;
        self.resize_window(window, frame.size())
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Snapshot<T> {
    value: T,
    captured_at: Instant,
}

struct CacheState {
    ttl: Duration,
    windows: Option<Snapshot<Arc<Vec<WindowInfo>>>>,
    frames: HashMap<WindowId, Snapshot<Rect>>,
    /// Bumped by every invalidation so that a query started before it
    /// does not write its result back.
    generation: u64,
}

impl CacheState {
    fn is_fresh(&self, captured_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(captured_at) < self.ttl
    }
}

/// Cached window geometry shared by the corner-fix and snap pipelines.
pub struct GeometryService {
    query: Arc<dyn WindowQuery>,
    clock: Arc<dyn Clock>,
    cache: Mutex<CacheState>,
}

impl GeometryService {
    pub fn new(query: Arc<dyn WindowQuery>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            query,
            clock,
            cache: Mutex::new(CacheState {
                ttl,
                windows: None,
                frames: HashMap::new(),
                generation: 0,
            }),
        }
    }

    fn cache(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.cache().ttl
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.cache().ttl = ttl;
    }

    /// Normal-layer on-screen windows, front to back.
    ///
    /// # Errors
    ///
    /// [`GeometryError::Unavailable`] when the snapshot is stale and the
    /// window server cannot be queried.
    pub fn windows(&self) -> Result<Arc<Vec<WindowInfo>>, GeometryError> {
        let now = self.clock.now();
        let generation = {
            let cache = self.cache();
            if let Some(snapshot) = &cache.windows {
                if cache.is_fresh(snapshot.captured_at, now) {
                    return Ok(Arc::clone(&snapshot.value));
                }
            }
            cache.generation
        };

        let mut windows = self.query.all_windows(true)?;
        windows.retain(WindowInfo::is_normal_layer);
        let windows = Arc::new(windows);
        trace!(count = windows.len(), "window snapshot refreshed");

        let mut cache = self.cache();
        if cache.generation != generation {
            trace!("cache invalidated during refresh; snapshot not stored");
            return Ok(windows);
        }
        cache.frames = windows
            .iter()
            .map(|window| {
                (
                    window.id,
                    Snapshot {
                        value: window.frame,
                        captured_at: now,
                    },
                )
            })
            .collect();
        cache.windows = Some(Snapshot {
            value: Arc::clone(&windows),
            captured_at: now,
        });
        Ok(windows)
    }

    /// The front-most window under `point`, if any.
    pub fn window_at(&self, point: Point) -> Result<Option<WindowInfo>, GeometryError> {
        let windows = self.windows()?;
        Ok(window_at(&windows, point).cloned())
    }

    /// Frame of one window, served from the cache while fresh.
    pub fn frame(&self, id: WindowId) -> Result<Rect, GeometryError> {
        let now = self.clock.now();
        {
            let cache = self.cache();
            if let Some(snapshot) = cache.frames.get(&id) {
                if cache.is_fresh(snapshot.captured_at, now) {
                    return Ok(snapshot.value);
                }
            }
        }
        self.fresh_frame(id)
    }

    /// Frame of one window straight from the window server. Updates the cache.
    pub fn fresh_frame(&self, id: WindowId) -> Result<Rect, GeometryError> {
        let generation = self.cache().generation;
        let frame = self.query.window_frame(id)?;
        let now = self.clock.now();
        let mut cache = self.cache();
        if cache.generation != generation {
            return Ok(frame);
        }
        cache.frames.insert(
            id,
            Snapshot {
                value: frame,
                captured_at: now,
            },
        );
        Ok(frame)
    }

    pub fn frontmost_window(&self) -> Result<Option<WindowInfo>, GeometryError> {
        self.query.frontmost_window()
    }

    /// Drops every snapshot. The next read goes to the window server.
    pub fn invalidate(&self) {
        let mut cache = self.cache();
        cache.windows = None;
        cache.frames.clear();
        cache.generation = cache.generation.wrapping_add(1);
        trace!("window geometry cache invalidated");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn new() -> Self {
            Self(Mutex::new(Instant::now()))
        }
        fn advance(&self, by: Duration) {
            *self.0.lock().expect("lock") += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().expect("lock")
        }
    }

    fn window(id: u32, frame: Rect, layer: i32) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            frame,
            owner_pid: 100,
            owner_name: "TextEdit".to_string(),
            layer,
        }
    }

    fn service(query: MockWindowQuery, clock: &Arc<ManualClock>) -> GeometryService {
        GeometryService::new(
            Arc::new(query),
            Arc::clone(clock) as Arc<dyn Clock>,
            DEFAULT_GEOMETRY_TTL,
        )
    }

    #[test]
    fn test_windows_served_from_cache_within_ttl() {
        // Arrange
        let mut query = MockWindowQuery::new();
        query
            .expect_all_windows()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(vec![window(1, Rect::new(0.0, 0.0, 100.0, 100.0), 0)]));
        let clock = Arc::new(ManualClock::new());
        let geometry = service(query, &clock);

        // Act
        geometry.windows().expect("first read");
        clock.advance(Duration::from_millis(99));
        let second = geometry.windows().expect("cached read");

        // Assert
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_refreshed_not_served() {
        // Arrange
        let mut query = MockWindowQuery::new();
        let mut calls = 0;
        query.expect_all_windows().times(2).returning(move |_| {
            calls += 1;
            Ok(vec![window(calls, Rect::new(0.0, 0.0, 100.0, 100.0), 0)])
        });
        let clock = Arc::new(ManualClock::new());
        let geometry = service(query, &clock);

        // Act
        let first = geometry.windows().expect("first read");
        clock.advance(Duration::from_millis(100));
        let second = geometry.windows().expect("refreshed read");

        // Assert
        assert_eq!(first[0].id, WindowId(1));
        assert_eq!(second[0].id, WindowId(2));
    }

    #[test]
    fn test_invalidate_forces_requery() {
        let mut query = MockWindowQuery::new();
        query.expect_all_windows().times(2).returning(|_| Ok(Vec::new()));
        let clock = Arc::new(ManualClock::new());
        let geometry = service(query, &clock);

        geometry.windows().expect("first read");
        geometry.invalidate();
        geometry.windows().expect("second read");
    }

    #[test]
    fn test_windows_keep_only_normal_layer() {
        let mut query = MockWindowQuery::new();
        query.expect_all_windows().returning(|_| {
            Ok(vec![
                window(1, Rect::new(0.0, 0.0, 1440.0, 25.0), 25),
                window(2, Rect::new(0.0, 0.0, 100.0, 100.0), 0),
            ])
        });
        let geometry = service(query, &Arc::new(ManualClock::new()));

        let windows = geometry.windows().expect("read");

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, WindowId(2));
    }

    #[test]
    fn test_query_failure_is_surfaced() {
        let mut query = MockWindowQuery::new();
        query
            .expect_all_windows()
            .returning(|_| Err(GeometryError::Unavailable("window server busy".to_string())));
        let geometry = service(query, &Arc::new(ManualClock::new()));

        assert!(matches!(geometry.windows(), Err(GeometryError::Unavailable(_))));
        assert!(matches!(
            geometry.window_at(Point::new(1.0, 1.0)),
            Err(GeometryError::Unavailable(_))
        ));
    }

    #[test]
    fn test_frame_uses_snapshot_then_fresh_frame_bypasses_it() {
        // Arrange
        let mut query = MockWindowQuery::new();
        query
            .expect_all_windows()
            .times(1)
            .returning(|_| Ok(vec![window(7, Rect::new(10.0, 10.0, 200.0, 100.0), 0)]));
        query
            .expect_window_frame()
            .with(eq(WindowId(7)))
            .times(1)
            .returning(|_| Ok(Rect::new(300.0, 10.0, 200.0, 100.0)));
        let geometry = service(query, &Arc::new(ManualClock::new()));
        geometry.windows().expect("prime");

        // Act
        let cached = geometry.frame(WindowId(7)).expect("cached");
        let fresh = geometry.fresh_frame(WindowId(7)).expect("fresh");

        // Assert
        assert_eq!(cached, Rect::new(10.0, 10.0, 200.0, 100.0));
        assert_eq!(fresh, Rect::new(300.0, 10.0, 200.0, 100.0));
        assert_eq!(geometry.frame(WindowId(7)).expect("recached"), fresh);
    }

    #[test]
    fn test_window_at_returns_front_most_hit() {
        let mut query = MockWindowQuery::new();
        query.expect_all_windows().returning(|_| {
            Ok(vec![
                window(1, Rect::new(0.0, 0.0, 100.0, 100.0), 0),
                window(2, Rect::new(0.0, 0.0, 400.0, 400.0), 0),
            ])
        });
        let geometry = service(query, &Arc::new(ManualClock::new()));

        let hit = geometry.window_at(Point::new(50.0, 50.0)).expect("read");

        assert_eq!(hit.map(|w| w.id), Some(WindowId(1)));
    }

    #[test]
    fn test_set_frame_moves_then_resizes() {
        // Arrange
        struct Recorder(Mutex<Vec<String>>);
        impl WindowMover for Recorder {
            fn move_window(&self, _w: &WindowInfo, origin: Point) -> Result<(), GeometryError> {
                self.0.lock().expect("lock").push(format!("move {} {}", origin.x, origin.y));
                Ok(())
            }
            fn resize_window(&self, _w: &WindowInfo, size: Size) -> Result<(), GeometryError> {
                self.0.lock().expect("lock").push(format!("resize {} {}", size.width, size.height));
                Ok(())
            }
        }
        let mover = Recorder(Mutex::new(Vec::new()));

        // Act
        mover
            .set_frame(&window(1, Rect::default(), 0), Rect::new(0.0, 25.0, 720.0, 875.0))
            .expect("set_frame");

        // Assert
        assert_eq!(*mover.0.lock().expect("lock"), vec!["move 0 25", "resize 720 875"]);
    }

    #[test]
    fn test_closed_window_is_dropped_from_frame_cache_on_refresh() {
        // Arrange: window 7 closes between the two snapshots
        let mut query = MockWindowQuery::new();
        let mut calls = 0;
        query.expect_all_windows().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![
                    window(7, Rect::new(10.0, 10.0, 200.0, 100.0), 0),
                    window(8, Rect::new(400.0, 10.0, 200.0, 100.0), 0),
                ])
            } else {
                Ok(vec![window(8, Rect::new(400.0, 10.0, 200.0, 100.0), 0)])
            }
        });
        query
            .expect_window_frame()
            .with(eq(WindowId(7)))
            .times(1)
            .returning(|id| Err(GeometryError::WindowNotFound(id)));
        let clock = Arc::new(ManualClock::new());
        let geometry = service(query, &clock);
        geometry.windows().expect("first read");

        // Act
        clock.advance(Duration::from_millis(100));
        geometry.windows().expect("refreshed read");

        // Assert
        assert_eq!(geometry.cache().frames.len(), 1);
        assert_eq!(geometry.frame(WindowId(7)), Err(GeometryError::WindowNotFound(WindowId(7))));
        assert_eq!(geometry.frame(WindowId(8)), Ok(Rect::new(400.0, 10.0, 200.0, 100.0)));
    }

    #[test]
    fn test_invalidate_during_refresh_discards_the_stale_snapshot() {
        // Arrange: the display changes while the first query is in flight
        struct Racing {
            geometry: Mutex<Weak<GeometryService>>,
            calls: AtomicUsize,
        }
        impl WindowQuery for Racing {
            fn all_windows(&self, _on_screen_only: bool) -> Result<Vec<WindowInfo>, GeometryError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    if let Some(geometry) = self.geometry.lock().expect("lock").upgrade() {
                        geometry.invalidate();
                    }
                }
                Ok(vec![window(1, Rect::new(0.0, 0.0, 100.0, 100.0), 0)])
            }
            fn frontmost_window(&self) -> Result<Option<WindowInfo>, GeometryError> {
                Ok(None)
            }
            fn window_frame(&self, id: WindowId) -> Result<Rect, GeometryError> {
                Err(GeometryError::WindowNotFound(id))
            }
        }
        let query = Arc::new(Racing {
            geometry: Mutex::new(Weak::new()),
            calls: AtomicUsize::new(0),
        });
        let geometry = Arc::new(GeometryService::new(
            Arc::clone(&query) as Arc<dyn WindowQuery>,
            Arc::new(ManualClock::new()),
            DEFAULT_GEOMETRY_TTL,
        ));
        *query.geometry.lock().expect("lock") = Arc::downgrade(&geometry);

        // Act
        let first = geometry.windows().expect("racing read");
        geometry.windows().expect("second read");

        // Assert: the racing result was returned but not cached
        assert_eq!(first.len(), 1);
        assert_eq!(query.calls.load(Ordering::SeqCst), 2);
    }
}
