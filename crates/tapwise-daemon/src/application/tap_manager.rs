//! Event tap lifecycle management.
//!
//! [`TapManager`] owns every OS interception handle. Pipelines ask it for a
//! tap with a given event mask and get back an opaque [`TapId`]; they never
//! touch the handle itself.
//!
//! # State machine
//!
//! ```text
//!            create_tap ok              remove_tap / remove_all_taps
//! Inactive ───────────────▶ Active ───────────────────────────────▶ Inactive
//!                            │  ▲
//!     TapDisabledBy* event   │  │ scheduled re-enable (reenable_delay)
//!                            ▼  │
//!                         OsDisabled
//! ```
//!
//! The OS switches a tap off when a callback is too slow or when secure
//! input kicks in, and tells us by delivering a `TapDisabledBy*` pseudo
//! event. The manager marks the tap `OsDisabled` and schedules a re-enable
//! through the injected [`Scheduler`]. No caller involvement is needed.
//!
//! # Locking
//!
//! The registry sits behind one `Mutex`. The dispatch path takes it only to
//! clone the callback `Arc` and releases it before running the callback, so
//! a callback may itself call [`TapManager::remove_tap`]. OS handles are
//! enabled, disabled and invalidated outside the lock.
//!
//! The backend never gets a strong reference to the manager. Each tap's
//! callback context is a [`TapRoute`]: the `TapId` plus a `Weak` pointer,
//! resolved against the registry on every event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tapwise_core::event::{EventMask, EventType, TapEvent, TapVerdict};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::scheduler::Scheduler;

/// Delay between an OS-disable notification and the automatic re-enable.
pub const DEFAULT_REENABLE_DELAY: Duration = Duration::from_millis(100);

/// Opaque identifier of a registered tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TapId(Uuid);

impl TapId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where in the event stream the tap is inserted (`CGEventTapLocation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapLocation {
    /// Where HID events enter the window server.
    Hid,
    /// Where HID and remote-control events enter a login session.
    Session,
    /// Where session events are annotated for delivery to an application.
    AnnotatedSession,
}

impl TapLocation {
    pub fn raw(self) -> u32 {
        match self {
            TapLocation::Hid => 0,
            TapLocation::Session => 1,
            TapLocation::AnnotatedSession => 2,
        }
    }
}

/// Ordering relative to other taps at the same location (`CGEventTapPlacement`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapPlacement {
    HeadInsert,
    TailAppend,
}

impl TapPlacement {
    pub fn raw(self) -> u32 {
        match self {
            TapPlacement::HeadInsert => 0,
            TapPlacement::TailAppend => 1,
        }
    }
}

/// Everything needed to create one tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapSpec {
    /// Human-readable name used in logs and thread names.
    pub label: String,
    pub location: TapLocation,
    pub placement: TapPlacement,
    pub mask: EventMask,
}

impl TapSpec {
    /// A session-level, head-inserted tap.
    pub fn new(label: impl Into<String>, mask: EventMask) -> Self {
        Self {
            label: label.into(),
            location: TapLocation::Session,
            placement: TapPlacement::HeadInsert,
            mask,
        }
    }

    pub fn with_location(mut self, location: TapLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_placement(mut self, placement: TapPlacement) -> Self {
        self.placement = placement;
        self
    }
}

/// Lifecycle state of a tap as reported by [`TapManager::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    /// Not registered (never created, failed, or removed).
    Inactive,
    /// Registered and receiving events.
    Active,
    /// Switched off by the OS; a re-enable is pending.
    OsDisabled,
}

/// Errors returned by [`TapManager::create_tap`].
#[derive(Debug, Error)]
pub enum TapError {
    /// Accessibility / input monitoring has not been granted to this process.
    #[error("accessibility permission not granted; event taps cannot be created")]
    PermissionDenied,

    /// The OS refused to create the tap.
    #[error("event tap creation failed: {0}")]
    CreationFailed(String),

    /// A tap with the same location and mask is already registered.
    #[error("a tap at {location:?} with event mask {mask:#x} is already registered")]
    DuplicateTap { location: TapLocation, mask: u64 },
}

/// Per-tap event handler.
///
/// Runs on the tap's run-loop thread inside the OS latency budget. It must
/// not block. A panic is caught by [`TapRoute::deliver`] and the event is
/// forwarded unchanged.
pub trait TapCallback: Send + Sync {
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict;
}

impl<F> TapCallback for F
where
    F: Fn(EventType, &mut dyn TapEvent) -> TapVerdict + Send + Sync,
{
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        self(event_type, event)
    }
}

/// Answers whether the process may create input-intercepting taps.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionChecker: Send + Sync {
    fn is_trusted(&self) -> bool;
}

/// One live OS interception handle.
///
/// Implementations must tolerate calls after [`OsTap::invalidate`] (they
/// become no-ops) and calls from any thread, including the tap's own
/// callback thread.
pub trait OsTap: Send + Sync {
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Releases the handle and its run-loop registration.
    fn invalidate(&self);
}

/// Factory for OS interception handles.
pub trait TapBackend: Send + Sync {
    /// Creates a tap for `spec`, initially disabled. Events must be delivered
    /// through `route`.
    fn create_tap(&self, spec: &TapSpec, route: TapRoute) -> Result<Box<dyn OsTap>, TapError>;
}

/// Callback context handed to the backend for one tap.
#[derive(Clone)]
pub struct TapRoute {
    id: TapId,
    manager: Weak<ManagerInner>,
}

impl TapRoute {
    pub fn id(&self) -> TapId {
        self.id
    }

    /// Routes one event to the tap's callback.
    ///
    /// Forwards the event unchanged when the manager is gone, the tap has
    /// been removed, it is not currently `Active` or the callback panics.
    pub fn deliver(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        let Some(inner) = self.manager.upgrade() else {
            return TapVerdict::Forward;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            ManagerInner::dispatch(&inner, self.id, event_type, event)
        }));
        outcome.unwrap_or_else(|_| {
            error!(tap = %self.id, ?event_type, "tap callback panicked; event forwarded");
            TapVerdict::Forward
        })
    }
}

impl fmt::Debug for TapRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapRoute").field("id", &self.id).finish_non_exhaustive()
    }
}

struct TapEntry {
    spec: TapSpec,
    callback: Arc<dyn TapCallback>,
    handle: Arc<dyn OsTap>,
    state: TapState,
    reenable_pending: bool,
    os_disable_count: u64,
}

struct ManagerInner {
    taps: Mutex<HashMap<TapId, TapEntry>>,
    backend: Arc<dyn TapBackend>,
    permissions: Arc<dyn PermissionChecker>,
    scheduler: Arc<dyn Scheduler>,
    reenable_delay_ms: AtomicU64,
}

impl ManagerInner {
    fn reenable_delay(&self) -> Duration {
        Duration::from_millis(self.reenable_delay_ms.load(Ordering::Relaxed))
    }

    /// Locks the registry, recovering from poisoning: a panic elsewhere must
    /// never turn into a panic on the event delivery path.
    fn taps(&self) -> MutexGuard<'_, HashMap<TapId, TapEntry>> {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(this: &Arc<Self>, id: TapId, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        if event_type.is_tap_disabled() {
            Self::on_os_disabled(this, id, event_type);
            return TapVerdict::Forward;
        }

        let callback = {
            let taps = this.taps();
            match taps.get(&id) {
                Some(entry) if entry.state == TapState::Active => Arc::clone(&entry.callback),
                _ => return TapVerdict::Forward,
            }
        };
        callback.on_event(event_type, event)
    }

    fn on_os_disabled(this: &Arc<Self>, id: TapId, reason: EventType) {
        let needs_schedule = {
            let mut taps = this.taps();
            let Some(entry) = taps.get_mut(&id) else {
                return;
            };
            entry.state = TapState::OsDisabled;
            entry.os_disable_count += 1;
            warn!(
                tap = %id,
                label = %entry.spec.label,
                reason = ?reason,
                "event tap disabled by the OS; re-enabling in {:?}",
                this.reenable_delay()
            );
            !std::mem::replace(&mut entry.reenable_pending, true)
        };

        if needs_schedule {
            let weak = Arc::downgrade(this);
            this.scheduler.schedule(
                this.reenable_delay(),
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.reenable(id);
                    }
                }),
            );
        }
    }

    fn reenable(&self, id: TapId) {
        let handle = {
            let mut taps = self.taps();
            let Some(entry) = taps.get_mut(&id) else {
                debug!(tap = %id, "tap removed before scheduled re-enable");
                return;
            };
            entry.reenable_pending = false;
            if entry.state != TapState::OsDisabled {
                return;
            }
            Arc::clone(&entry.handle)
        };

        handle.set_enabled(true);

        let mut taps = self.taps();
        if let Some(entry) = taps.get_mut(&id) {
            if entry.state == TapState::OsDisabled {
                entry.state = TapState::Active;
                info!(tap = %id, label = %entry.spec.label, "event tap re-enabled");
            }
        }
    }
}

fn duration_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Owns and supervises all event taps. Cheap to clone.
#[derive(Clone)]
pub struct TapManager {
    inner: Arc<ManagerInner>,
}

impl TapManager {
    pub fn new(
        backend: Arc<dyn TapBackend>,
        permissions: Arc<dyn PermissionChecker>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_reenable_delay(backend, permissions, scheduler, DEFAULT_REENABLE_DELAY)
    }

    pub fn with_reenable_delay(
        backend: Arc<dyn TapBackend>,
        permissions: Arc<dyn PermissionChecker>,
        scheduler: Arc<dyn Scheduler>,
        reenable_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                taps: Mutex::new(HashMap::new()),
                backend,
                permissions,
                scheduler,
                reenable_delay_ms: AtomicU64::new(duration_millis(reenable_delay)),
            }),
        }
    }

    pub fn reenable_delay(&self) -> Duration {
        self.inner.reenable_delay()
    }

    /// Changes the delay used for re-enables scheduled from now on.
    pub fn set_reenable_delay(&self, delay: Duration) {
        self.inner
            .reenable_delay_ms
            .store(duration_millis(delay), Ordering::Relaxed);
    }

    /// Creates, registers and enables a tap.
    ///
    /// # Errors
    ///
    /// - [`TapError::PermissionDenied`] when the permission checker says no.
    ///   Creation is not attempted.
    /// - [`TapError::DuplicateTap`] when the same location and mask is
    ///   already tapped.
    /// - [`TapError::CreationFailed`] when the backend refuses.
    pub fn create_tap(&self, spec: TapSpec, callback: Arc<dyn TapCallback>) -> Result<TapId, TapError> {
        if !self.inner.permissions.is_trusted() {
            warn!(label = %spec.label, "refusing to create event tap: permission not granted");
            return Err(TapError::PermissionDenied);
        }
        self.ensure_unique(&spec)?;

        let id = TapId::new();
        let route = TapRoute {
            id,
            manager: Arc::downgrade(&self.inner),
        };
        let handle: Arc<dyn OsTap> = Arc::from(self.inner.backend.create_tap(&spec, route)?);

        let label = spec.label.clone();
        let mask = spec.mask.bits();
        {
            let mut taps = self.inner.taps();
            let duplicate = taps
                .values()
                .any(|e| e.spec.location == spec.location && e.spec.mask == spec.mask);
            if duplicate {
                drop(taps);
                handle.invalidate();
                return Err(TapError::DuplicateTap {
                    location: spec.location,
                    mask,
                });
            }
            taps.insert(
                id,
                TapEntry {
                    spec,
                    callback,
                    handle: Arc::clone(&handle),
                    state: TapState::Active,
                    reenable_pending: false,
                    os_disable_count: 0,
                },
            );
        }

        handle.set_enabled(true);
        info!(tap = %id, label = %label, mask = format_args!("{mask:#x}"), "event tap active");
        Ok(id)
    }

    fn ensure_unique(&self, spec: &TapSpec) -> Result<(), TapError> {
        let taps = self.inner.taps();
        if taps
            .values()
            .any(|e| e.spec.location == spec.location && e.spec.mask == spec.mask)
        {
            return Err(TapError::DuplicateTap {
                location: spec.location,
                mask: spec.mask.bits(),
            });
        }
        Ok(())
    }

    /// Disables and forgets one tap. Returns `false` if it was not registered.
    ///
    /// Idempotent and callable from any thread, including from inside the
    /// tap's own callback.
    pub fn remove_tap(&self, id: TapId) -> bool {
        let entry = self.inner.taps().remove(&id);
        match entry {
            Some(entry) => {
                entry.handle.set_enabled(false);
                entry.handle.invalidate();
                info!(tap = %id, label = %entry.spec.label, "event tap removed");
                true
            }
            None => false,
        }
    }

    /// Removes every tap. Afterwards no OS handle is held.
    pub fn remove_all_taps(&self) -> usize {
        let entries: Vec<(TapId, TapEntry)> = self.inner.taps().drain().collect();
        for (id, entry) in &entries {
            entry.handle.set_enabled(false);
            entry.handle.invalidate();
            debug!(tap = %id, label = %entry.spec.label, "event tap removed");
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "all event taps removed");
        }
        entries.len()
    }

    pub fn state(&self, id: TapId) -> TapState {
        self.inner
            .taps()
            .get(&id)
            .map_or(TapState::Inactive, |e| e.state)
    }

    pub fn is_active(&self, id: TapId) -> bool {
        self.state(id) == TapState::Active
    }

    pub fn tap_ids(&self) -> Vec<TapId> {
        self.inner.taps().keys().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .taps()
            .values()
            .filter(|e| e.state == TapState::Active)
            .count()
    }

    /// Number of times the OS has switched this tap off since creation.
    pub fn os_disable_count(&self, id: TapId) -> u64 {
        self.inner.taps().get(&id).map_or(0, |e| e.os_disable_count)
    }

    pub fn spec(&self, id: TapId) -> Option<TapSpec> {
        self.inner.taps().get(&id).map(|e| e.spec.clone())
    }

    /// Cross-checks every `Active` tap against its OS handle.
    ///
    /// Some disables (for example across sleep/wake) happen without a
    /// `TapDisabledBy*` notification. A tap found disabled goes through the
    /// same `OsDisabled` path as a notified one. Returns the number found.
    pub fn health_check(&self) -> usize {
        let candidates: Vec<(TapId, Arc<dyn OsTap>)> = self
            .inner
            .taps()
            .iter()
            .filter(|(_, e)| e.state == TapState::Active)
            .map(|(id, e)| (*id, Arc::clone(&e.handle)))
            .collect();

        let mut found = 0;
        for (id, handle) in candidates {
            if !handle.is_enabled() {
                found += 1;
                ManagerInner::on_os_disabled(&self.inner, id, EventType::TapDisabledByTimeout);
            }
        }
        found
    }
}

impl fmt::Debug for TapManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapManager")
            .field("taps", &self.inner.taps().len())
            .field("reenable_delay", &self.inner.reenable_delay())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
