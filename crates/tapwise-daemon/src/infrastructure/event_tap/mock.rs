//! In-memory tap backend for tests.
//!
//! Behaves like the OS as far as the manager can tell: taps are created
//! disabled, only enabled taps see events, only events in the tap's mask are
//! delivered, and a disable is announced with a `TapDisabledBy*` pseudo
//! event.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tapwise_core::event::{EventType, SyntheticEvent, TapEvent, TapVerdict};
use tapwise_core::Point;

use crate::application::tap_manager::{OsTap, TapBackend, TapError, TapRoute, TapSpec};

/// Observable state of one mock tap.
#[derive(Debug, Default)]
pub struct MockTapHandle {
    enabled: AtomicBool,
    invalidated: AtomicBool,
}

impl MockTapHandle {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Turns the tap off without telling anyone, the way a tap can silently
    /// stop after the process loses its accessibility grant.
    pub fn simulate_silent_disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

struct HandleRef(Arc<MockTapHandle>);

impl OsTap for HandleRef {
    fn set_enabled(&self, enabled: bool) {
        if !self.0.is_invalidated() {
            self.0.enabled.store(enabled, Ordering::SeqCst);
        }
    }

    fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    fn invalidate(&self) {
        self.0.enabled.store(false, Ordering::SeqCst);
        self.0.invalidated.store(true, Ordering::SeqCst);
    }
}

struct MockTap {
    spec: TapSpec,
    route: TapRoute,
    handle: Arc<MockTapHandle>,
}

#[derive(Default)]
pub struct MockTapBackend {
    taps: Mutex<Vec<MockTap>>,
    refuse: AtomicBool,
    created: AtomicUsize,
}

impl MockTapBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `create_tap` fail as if `CGEventTapCreate`
    /// returned NULL.
    pub fn refuse_creation(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Taps created over the backend's lifetime, including removed ones.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Taps that have not been invalidated.
    pub fn live_count(&self) -> usize {
        self.lock().iter().filter(|t| !t.handle.is_invalidated()).count()
    }

    /// Labels of the live taps, in creation order.
    pub fn live_labels(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|t| !t.handle.is_invalidated())
            .map(|t| t.spec.label.clone())
            .collect()
    }

    /// Handle of the most recent live tap with `label`.
    pub fn handle(&self, label: &str) -> Option<Arc<MockTapHandle>> {
        self.find(label).map(|(_, _, handle)| handle)
    }

    pub fn spec(&self, label: &str) -> Option<TapSpec> {
        self.find(label).map(|(spec, _, _)| spec)
    }

    /// Delivers `event` to the tap labelled `label`.
    ///
    /// Returns `None` when the OS would not have delivered it: the tap does
    /// not exist, is disabled, or does not listen for this event type.
    pub fn deliver(&self, label: &str, event: &mut SyntheticEvent) -> Option<TapVerdict> {
        let (spec, route, handle) = self.find(label)?;
        if !handle.is_enabled() || !spec.mask.contains(event.event_type()) {
            return None;
        }
        Some(route.deliver(event.event_type(), event))
    }

    /// Runs `event` through every enabled tap that listens for it, in
    /// creation order, stopping at the first `Suppress`.
    pub fn broadcast(&self, event: &mut SyntheticEvent) -> TapVerdict {
        let targets: Vec<TapRoute> = self
            .lock()
            .iter()
            .filter(|t| t.handle.is_enabled() && t.spec.mask.contains(event.event_type()))
            .map(|t| t.route.clone())
            .collect();
        for route in targets {
            if route.deliver(event.event_type(), event) == TapVerdict::Suppress {
                return TapVerdict::Suppress;
            }
        }
        TapVerdict::Forward
    }

    /// Disables the tap and sends it the matching pseudo event, as the OS
    /// does after a callback timeout or on secure input.
    pub fn deliver_disabled(&self, label: &str, reason: EventType) -> Option<TapVerdict> {
        debug_assert!(reason.is_tap_disabled());
        let (_, route, handle) = self.find(label)?;
        handle.enabled.store(false, Ordering::SeqCst);
        let mut event = SyntheticEvent::new(reason, Point::default());
        Some(route.deliver(reason, &mut event))
    }

    fn find(&self, label: &str) -> Option<(TapSpec, TapRoute, Arc<MockTapHandle>)> {
        self.lock()
            .iter()
            .rev()
            .find(|t| t.spec.label == label && !t.handle.is_invalidated())
            .map(|t| (t.spec.clone(), t.route.clone(), Arc::clone(&t.handle)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MockTap>> {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TapBackend for MockTapBackend {
    fn create_tap(&self, spec: &TapSpec, route: TapRoute) -> Result<Box<dyn OsTap>, TapError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TapError::CreationFailed("CGEventTapCreate returned NULL".to_string()));
        }
        let handle = Arc::new(MockTapHandle::default());
        self.lock().push(MockTap {
            spec: spec.clone(),
            route,
            handle: Arc::clone(&handle),
        });
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HandleRef(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapwise_core::event::EventMask;

    use crate::application::tap_manager::TapManager;
    use crate::infrastructure::permissions::StaticPermissionChecker;
    use crate::infrastructure::scheduler::ManualScheduler;

    fn manager(backend: Arc<MockTapBackend>) -> (TapManager, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let manager = TapManager::new(
            backend,
            Arc::new(StaticPermissionChecker::granted()),
            Arc::clone(&scheduler) as _,
        );
        (manager, scheduler)
    }

    fn suppress_all(_: EventType, _: &mut dyn TapEvent) -> TapVerdict {
        TapVerdict::Suppress
    }

    #[test]
    fn test_created_tap_is_enabled_by_manager() {
        // Arrange
        let backend = Arc::new(MockTapBackend::new());
        let (manager, _) = manager(Arc::clone(&backend));

        // Act
        manager
            .create_tap(TapSpec::new("pointer", EventMask::of(&[EventType::MouseMoved])), Arc::new(suppress_all))
            .expect("create");

        // Assert
        assert!(backend.handle("pointer").expect("handle").is_enabled());
        assert_eq!(backend.live_labels(), vec!["pointer".to_string()]);
    }

    #[test]
    fn test_deliver_respects_mask_and_enabled_state() {
        let backend = Arc::new(MockTapBackend::new());
        let (manager, _) = manager(Arc::clone(&backend));
        manager
            .create_tap(TapSpec::new("pointer", EventMask::of(&[EventType::MouseMoved])), Arc::new(suppress_all))
            .expect("create");

        let mut scroll = SyntheticEvent::scroll(1, 0);
        let mut moved = SyntheticEvent::mouse_moved(Point::new(1.0, 1.0), 1.0, 0.0);

        assert_eq!(backend.deliver("pointer", &mut scroll), None);
        assert_eq!(backend.deliver("pointer", &mut moved), Some(TapVerdict::Suppress));

        backend.handle("pointer").expect("handle").simulate_silent_disable();
        assert_eq!(backend.deliver("pointer", &mut moved), None);
    }

    #[test]
    fn test_removed_tap_is_invalidated_and_not_live() {
        let backend = Arc::new(MockTapBackend::new());
        let (manager, _) = manager(Arc::clone(&backend));
        let id = manager
            .create_tap(TapSpec::new("pointer", EventMask::of(&[EventType::MouseMoved])), Arc::new(suppress_all))
            .expect("create");
        let handle = backend.handle("pointer").expect("handle");

        manager.remove_tap(id);

        assert!(handle.is_invalidated());
        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.created_count(), 1);
    }

    #[test]
    fn test_refused_creation_surfaces_as_tap_error() {
        let backend = Arc::new(MockTapBackend::new());
        backend.refuse_creation(true);
        let (manager, _) = manager(Arc::clone(&backend));

        let result = manager.create_tap(
            TapSpec::new("pointer", EventMask::of(&[EventType::MouseMoved])),
            Arc::new(suppress_all),
        );

        assert!(matches!(result, Err(TapError::CreationFailed(_))));
        assert_eq!(backend.live_count(), 0);
    }
}
