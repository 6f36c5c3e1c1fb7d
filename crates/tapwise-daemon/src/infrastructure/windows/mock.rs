//! In-memory window server for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tapwise_core::{Point, Rect, Size, WindowId, WindowInfo};

use crate::application::window_geometry::{GeometryError, WindowMover, WindowQuery};

/// A window list set by the test, front to back.
#[derive(Default)]
pub struct StaticWindowQuery {
    windows: Mutex<Vec<WindowInfo>>,
    failure: Mutex<Option<GeometryError>>,
    queries: AtomicUsize,
}

impl StaticWindowQuery {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self {
            windows: Mutex::new(windows),
            ..Self::default()
        }
    }

    pub fn set_windows(&self, windows: Vec<WindowInfo>) {
        *self.lock() = windows;
    }

    /// Changes one window's frame, as if the user moved it.
    pub fn set_frame(&self, id: WindowId, frame: Rect) {
        if let Some(window) = self.lock().iter_mut().find(|w| w.id == id) {
            window.frame = frame;
        }
    }

    /// Makes every query fail with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<GeometryError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Number of `all_windows` calls served.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), GeometryError> {
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WindowInfo>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowQuery for StaticWindowQuery {
    fn all_windows(&self, _on_screen_only: bool) -> Result<Vec<WindowInfo>, GeometryError> {
        self.check()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().clone())
    }

    fn frontmost_window(&self) -> Result<Option<WindowInfo>, GeometryError> {
        self.check()?;
        Ok(self.lock().iter().find(|w| w.is_normal_layer()).cloned())
    }

    fn window_frame(&self, id: WindowId) -> Result<Rect, GeometryError> {
        self.check()?;
        self.lock()
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.frame)
            .ok_or(GeometryError::WindowNotFound(id))
    }
}

/// One call made on a [`RecordingWindowMover`].
#[derive(Debug, Clone, PartialEq)]
pub enum MoveRecord {
    Moved { window: WindowId, origin: Point },
    Resized { window: WindowId, size: Size },
}

/// Records moves and, when linked to a [`StaticWindowQuery`], applies them
/// to its window list.
#[derive(Default)]
pub struct RecordingWindowMover {
    records: Mutex<Vec<MoveRecord>>,
    linked: Option<Arc<StaticWindowQuery>>,
    refuse: AtomicBool,
}

impl RecordingWindowMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked(query: Arc<StaticWindowQuery>) -> Self {
        Self {
            linked: Some(query),
            ..Self::default()
        }
    }

    /// Makes every following call fail with [`GeometryError::MoveFailed`].
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<MoveRecord> {
        self.lock().clone()
    }

    /// The frame a window ends up with after every recorded call, starting
    /// from `initial`.
    pub fn final_frame(&self, id: WindowId, initial: Rect) -> Rect {
        self.lock().iter().fold(initial, |frame, record| match record {
            MoveRecord::Moved { window, origin } if *window == id => {
                Rect::new(origin.x, origin.y, frame.width, frame.height)
            }
            MoveRecord::Resized { window, size } if *window == id => {
                Rect::new(frame.x, frame.y, size.width, size.height)
            }
            _ => frame,
        })
    }

    fn record(&self, record: MoveRecord) -> Result<(), GeometryError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GeometryError::MoveFailed("AXError -25204 (cannot complete)".to_string()));
        }
        if let Some(query) = &self.linked {
            let id = match &record {
                MoveRecord::Moved { window, .. } | MoveRecord::Resized { window, .. } => *window,
            };
            let current = query.window_frame(id)?;
            let next = match &record {
                MoveRecord::Moved { origin, .. } => Rect::new(origin.x, origin.y, current.width, current.height),
                MoveRecord::Resized { size, .. } => Rect::new(current.x, current.y, size.width, size.height),
            };
            query.set_frame(id, next);
        }
        self.lock().push(record);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MoveRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowMover for RecordingWindowMover {
    fn move_window(&self, window: &WindowInfo, origin: Point) -> Result<(), GeometryError> {
        self.record(MoveRecord::Moved {
            window: window.id,
            origin,
        })
    }

    fn resize_window(&self, window: &WindowInfo, size: Size) -> Result<(), GeometryError> {
        self.record(MoveRecord::Resized { window: window.id, size })
    }
}
