//! Quartz event taps.
//!
//! Each tap gets its own thread. The thread creates the tap with
//! `CGEventTapCreate`, wraps the returned mach port in a run-loop source and
//! spins its run loop in short slices until the tap is invalidated. The
//! callback runs on that thread.
//!
//! The high-level `core_graphics::event::CGEventTap` wrapper is not used:
//! its callback cannot return NULL, so an event can never be suppressed.
//! The tap is declared here against the raw CoreGraphics entry points
//! instead, with `core-foundation` handling the mach port and run loop.
//!
//! # Callback contract
//!
//! The trampoline gets a pointer to a boxed [`TrampolineContext`] holding the
//! tap's [`TapRoute`]. The box is owned by the tap thread and freed only after
//! the run loop has stopped, so the pointer is valid whenever the callback
//! can run. Panics are caught at the FFI boundary and the event is forwarded
//! untouched.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::geometry::CGPoint;
use tapwise_core::event::{EventField, EventType, SyntheticEvent, TapEvent, TapVerdict};
use tapwise_core::Point;
use tracing::{debug, error};

use crate::application::tap_manager::{OsTap, TapBackend, TapError, TapRoute, TapSpec};

type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;
type CGEventTapCallBack =
    unsafe extern "C" fn(CGEventTapProxy, u32, CGEventRef, *mut c_void) -> CGEventRef;

/// `kCGEventTapOptionDefault`: an active filter that may modify or drop events.
const TAP_OPTION_DEFAULT: u32 = 0;

/// How long one run-loop slice lasts before the stop flag is checked again.
const RUN_SLICE: Duration = Duration::from_millis(250);

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventTapIsEnabled(tap: CFMachPortRef) -> bool;
    fn CGEventGetLocation(event: CGEventRef) -> CGPoint;
    fn CGEventSetLocation(event: CGEventRef, location: CGPoint);
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventSetIntegerValueField(event: CGEventRef, field: u32, value: i64);
    fn CGEventGetDoubleValueField(event: CGEventRef, field: u32) -> f64;
    fn CGEventSetDoubleValueField(event: CGEventRef, field: u32, value: f64);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortInvalidate(port: CFMachPortRef);
}

// ── Event wrapper ─────────────────────────────────────────────────────────────

/// A live `CGEventRef` borrowed for the duration of one callback.
struct QuartzEvent {
    raw: CGEventRef,
    event_type: EventType,
}

impl TapEvent for QuartzEvent {
    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn location(&self) -> Point {
        let p = unsafe { CGEventGetLocation(self.raw) };
        Point::new(p.x, p.y)
    }

    fn set_location(&mut self, location: Point) {
        unsafe { CGEventSetLocation(self.raw, CGPoint::new(location.x, location.y)) }
    }

    fn integer_field(&self, field: EventField) -> i64 {
        unsafe { CGEventGetIntegerValueField(self.raw, field.0) }
    }

    fn set_integer_field(&mut self, field: EventField, value: i64) {
        unsafe { CGEventSetIntegerValueField(self.raw, field.0, value) }
    }

    fn double_field(&self, field: EventField) -> f64 {
        unsafe { CGEventGetDoubleValueField(self.raw, field.0) }
    }

    fn set_double_field(&mut self, field: EventField, value: f64) {
        unsafe { CGEventSetDoubleValueField(self.raw, field.0, value) }
    }
}

// ── Trampoline ────────────────────────────────────────────────────────────────

struct TrampolineContext {
    route: TapRoute,
}

unsafe extern "C" fn tap_trampoline(
    _proxy: CGEventTapProxy,
    raw_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    if user_info.is_null() {
        return event;
    }
    let context = &*(user_info as *const TrampolineContext);
    let Some(event_type) = EventType::from_raw(raw_type) else {
        return event;
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if event.is_null() {
            // Disable notifications may arrive without an event attached.
            let mut placeholder = SyntheticEvent::new(event_type, Point::default());
            context.route.deliver(event_type, &mut placeholder)
        } else {
            let mut wrapped = QuartzEvent { raw: event, event_type };
            context.route.deliver(event_type, &mut wrapped)
        }
    }));

    match outcome {
        Ok(TapVerdict::Forward) => event,
        Ok(TapVerdict::Suppress) => std::ptr::null_mut(),
        Err(_) => {
            error!(tap = %context.route.id(), ?event_type, "tap callback panicked; event forwarded");
            event
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// A retained mach port that may be touched from any thread.
///
/// `CGEventTapEnable`, `CGEventTapIsEnabled` and `CFMachPortInvalidate` are
/// all documented thread-safe, and CF retain/release is atomic.
#[derive(Clone)]
struct SharedPort(CFMachPort);

unsafe impl Send for SharedPort {}
unsafe impl Sync for SharedPort {}

impl SharedPort {
    fn raw(&self) -> CFMachPortRef {
        self.0.as_concrete_TypeRef()
    }
}

struct QuartzTap {
    label: String,
    port: SharedPort,
    stop: Arc<AtomicBool>,
    invalidated: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl OsTap for QuartzTap {
    fn set_enabled(&self, enabled: bool) {
        if !self.invalidated.load(Ordering::Acquire) {
            unsafe { CGEventTapEnable(self.port.raw(), enabled) }
        }
    }

    fn is_enabled(&self) -> bool {
        !self.invalidated.load(Ordering::Acquire) && unsafe { CGEventTapIsEnabled(self.port.raw()) }
    }

    fn invalidate(&self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe {
            CGEventTapEnable(self.port.raw(), false);
            CFMachPortInvalidate(self.port.raw());
        }
        self.stop.store(true, Ordering::Release);

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            // Removal from inside the tap's own callback cannot wait for itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!(label = %self.label, "tap thread panicked during shutdown");
            }
        }
        debug!(label = %self.label, "quartz tap invalidated");
    }
}

impl Drop for QuartzTap {
    fn drop(&mut self) {
        self.invalidate();
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// Creates Quartz event taps, one run-loop thread per tap.
#[derive(Debug, Default)]
pub struct QuartzTapBackend;

impl QuartzTapBackend {
    pub fn new() -> Self {
        Self
    }
}

struct TapParams {
    location: u32,
    placement: u32,
    mask: u64,
    route: TapRoute,
}

impl TapBackend for QuartzTapBackend {
    fn create_tap(&self, spec: &TapSpec, route: TapRoute) -> Result<Box<dyn OsTap>, TapError> {
        let params = TapParams {
            location: spec.location.raw(),
            placement: spec.placement.raw(),
            mask: spec.mask.bits(),
            route,
        };
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("tap-{}", spec.label))
            .spawn(move || run_tap_thread(params, thread_stop, ready_tx))
            .map_err(|e| TapError::CreationFailed(format!("spawning tap thread: {e}")))?;

        let port = match ready_rx.recv() {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(TapError::CreationFailed("tap thread exited during setup".to_string()));
            }
        };

        debug!(label = %spec.label, mask = format_args!("{:#x}", spec.mask.bits()), "quartz tap created");
        Ok(Box::new(QuartzTap {
            label: spec.label.clone(),
            port,
            stop,
            invalidated: AtomicBool::new(false),
            thread: Mutex::new(Some(thread)),
        }))
    }
}

fn run_tap_thread(
    params: TapParams,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<SharedPort, TapError>>,
) {
    let context = Box::into_raw(Box::new(TrampolineContext { route: params.route }));
    let raw = unsafe {
        CGEventTapCreate(
            params.location,
            params.placement,
            TAP_OPTION_DEFAULT,
            params.mask,
            tap_trampoline,
            context.cast::<c_void>(),
        )
    };
    if raw.is_null() {
        drop(unsafe { Box::from_raw(context) });
        let _ = ready.send(Err(TapError::CreationFailed("CGEventTapCreate returned NULL".to_string())));
        return;
    }

    let port = unsafe { CFMachPort::wrap_under_create_rule(raw) };
    // Taps start enabled; the manager enables them once registered.
    unsafe { CGEventTapEnable(raw, false) };

    let Ok(source) = port.create_runloop_source(0) else {
        unsafe { CFMachPortInvalidate(raw) };
        drop(port);
        drop(unsafe { Box::from_raw(context) });
        let _ = ready.send(Err(TapError::CreationFailed(
            "CFMachPortCreateRunLoopSource failed".to_string(),
        )));
        return;
    };
    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });

    if ready.send(Ok(SharedPort(port.clone()))).is_ok() {
        while !stop.load(Ordering::Acquire) {
            CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, RUN_SLICE, false);
        }
    }

    run_loop.remove_source(&source, unsafe { kCFRunLoopCommonModes });
    unsafe { CFMachPortInvalidate(raw) };
    drop(source);
    drop(port);
    // The run loop has stopped; no callback can observe the context anymore.
    drop(unsafe { Box::from_raw(context) });
}
