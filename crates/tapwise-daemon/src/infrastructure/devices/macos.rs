//! IOKit HID device monitoring.
//!
//! An `IOHIDManager` matching generic-desktop mice and pointers is scheduled
//! on a dedicated run-loop thread. Devices present at start are reported
//! before `start` returns; later matches and removals arrive through the
//! manager callbacks on that thread.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
use core_foundation::string::{CFString, CFStringRef};
use tapwise_core::DeviceDescriptor;
use tracing::{debug, info, warn};

use crate::application::device_registry::{DeviceMonitor, DeviceSink, SetupError};

type IOHIDManagerRef = *mut c_void;
type IOHIDDeviceRef = *mut c_void;
type IOReturn = i32;
type IOHIDDeviceCallback =
    unsafe extern "C" fn(context: *mut c_void, result: IOReturn, sender: *mut c_void, device: IOHIDDeviceRef);

const IO_RETURN_SUCCESS: IOReturn = 0;
const OPTIONS_NONE: u32 = 0;

const USAGE_PAGE_GENERIC_DESKTOP: i32 = 0x01;
const USAGE_POINTER: i32 = 0x01;
const USAGE_MOUSE: i32 = 0x02;

const RUN_SLICE: Duration = Duration::from_millis(250);

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IOHIDManagerCreate(allocator: *const c_void, options: u32) -> IOHIDManagerRef;
    fn IOHIDManagerSetDeviceMatchingMultiple(manager: IOHIDManagerRef, multiple: *const c_void);
    fn IOHIDManagerRegisterDeviceMatchingCallback(
        manager: IOHIDManagerRef,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    );
    fn IOHIDManagerRegisterDeviceRemovalCallback(
        manager: IOHIDManagerRef,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    );
    fn IOHIDManagerScheduleWithRunLoop(manager: IOHIDManagerRef, run_loop: *const c_void, mode: CFStringRef);
    fn IOHIDManagerUnscheduleFromRunLoop(manager: IOHIDManagerRef, run_loop: *const c_void, mode: CFStringRef);
    fn IOHIDManagerOpen(manager: IOHIDManagerRef, options: u32) -> IOReturn;
    fn IOHIDManagerClose(manager: IOHIDManagerRef, options: u32) -> IOReturn;
    fn IOHIDManagerCopyDevices(manager: IOHIDManagerRef) -> *const c_void;
    fn IOHIDDeviceGetProperty(device: IOHIDDeviceRef, key: CFStringRef) -> CFTypeRef;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRelease(cf: *const c_void);
    fn CFSetGetCount(set: *const c_void) -> isize;
    fn CFSetGetValues(set: *const c_void, values: *mut *const c_void);
}

// ── Property access ───────────────────────────────────────────────────────────

fn property(device: IOHIDDeviceRef, key: &'static str) -> Option<CFType> {
    let key = CFString::from_static_string(key);
    let raw = unsafe { IOHIDDeviceGetProperty(device, key.as_concrete_TypeRef()) };
    if raw.is_null() {
        None
    } else {
        // Get rule: the device owns the property value.
        Some(unsafe { CFType::wrap_under_get_rule(raw) })
    }
}

fn number_property(device: IOHIDDeviceRef, key: &'static str) -> Option<u32> {
    property(device, key)?
        .downcast::<CFNumber>()?
        .to_i64()
        .and_then(|n| u32::try_from(n).ok())
}

fn string_property(device: IOHIDDeviceRef, key: &'static str) -> Option<String> {
    property(device, key)?.downcast::<CFString>().map(|s| s.to_string())
}

fn flag_property(device: IOHIDDeviceRef, key: &'static str) -> bool {
    let Some(value) = property(device, key) else {
        return false;
    };
    if let Some(flag) = value.downcast::<CFBoolean>() {
        return bool::from(flag);
    }
    value
        .downcast::<CFNumber>()
        .and_then(|n| n.to_i64())
        .is_some_and(|n| n != 0)
}

fn describe(device: IOHIDDeviceRef) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: number_property(device, "VendorID").unwrap_or(0),
        product_id: number_property(device, "ProductID").unwrap_or(0),
        location_id: number_property(device, "LocationID").unwrap_or(0),
        product_name: string_property(device, "Product").unwrap_or_default(),
        transport: string_property(device, "Transport").unwrap_or_default(),
        is_builtin: flag_property(device, "Built-In"),
    }
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

struct MonitorContext {
    sink: DeviceSink,
}

unsafe extern "C" fn device_matched(context: *mut c_void, _: IOReturn, _: *mut c_void, device: IOHIDDeviceRef) {
    if context.is_null() || device.is_null() {
        return;
    }
    let context = &*(context as *const MonitorContext);
    let descriptor = describe(device);
    debug!(product = %descriptor.product_name, id = %descriptor.device_id(), "HID device matched");
    context.sink.device_attached(descriptor);
}

unsafe extern "C" fn device_removed(context: *mut c_void, _: IOReturn, _: *mut c_void, device: IOHIDDeviceRef) {
    if context.is_null() || device.is_null() {
        return;
    }
    let context = &*(context as *const MonitorContext);
    let id = describe(device).device_id();
    debug!(id = %id, "HID device removed");
    context.sink.device_removed(&id);
}

// ── Monitor ───────────────────────────────────────────────────────────────────

fn matching_dictionaries() -> CFArray<CFDictionary<CFString, CFNumber>> {
    let page_key = CFString::from_static_string("DeviceUsagePage");
    let usage_key = CFString::from_static_string("DeviceUsage");
    let dicts: Vec<CFDictionary<CFString, CFNumber>> = [USAGE_MOUSE, USAGE_POINTER]
        .into_iter()
        .map(|usage| {
            CFDictionary::from_CFType_pairs(&[
                (page_key.clone(), CFNumber::from(USAGE_PAGE_GENERIC_DESKTOP)),
                (usage_key.clone(), CFNumber::from(usage)),
            ])
        })
        .collect();
    CFArray::from_CFTypes(&dicts)
}

struct Running {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Watches HID pointing devices through `IOHIDManager`.
#[derive(Default)]
pub struct HidDeviceMonitor {
    running: Mutex<Option<Running>>,
}

impl HidDeviceMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceMonitor for HidDeviceMonitor {
    fn start(&self, sink: DeviceSink) -> Result<(), SetupError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(SetupError::AlreadyStarted);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("hid-monitor".to_string())
            .spawn(move || run_monitor_thread(sink, thread_stop, ready_tx))
            .map_err(|e| SetupError::MonitorCreation(format!("spawning monitor thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *running = Some(Running { stop, thread });
                info!("HID device monitor running");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(SetupError::MonitorCreation("monitor thread exited during setup".to_string()))
            }
        }
    }

    fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Running { stop, thread }) = running {
            stop.store(true, Ordering::Release);
            if thread.join().is_err() {
                warn!("HID monitor thread panicked");
            }
        }
    }
}

impl Drop for HidDeviceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_monitor_thread(sink: DeviceSink, stop: Arc<AtomicBool>, ready: mpsc::Sender<Result<(), SetupError>>) {
    let manager = unsafe { IOHIDManagerCreate(std::ptr::null(), OPTIONS_NONE) };
    if manager.is_null() {
        let _ = ready.send(Err(SetupError::MonitorCreation("IOHIDManagerCreate returned NULL".to_string())));
        return;
    }

    let context = Box::into_raw(Box::new(MonitorContext { sink: sink.clone() }));
    let matching = matching_dictionaries();
    let run_loop = CFRunLoop::get_current();
    let run_loop_ref = run_loop.as_concrete_TypeRef() as *const c_void;
    let mode = unsafe { kCFRunLoopDefaultMode };

    unsafe {
        IOHIDManagerSetDeviceMatchingMultiple(manager, matching.as_concrete_TypeRef() as *const c_void);
        IOHIDManagerRegisterDeviceMatchingCallback(manager, device_matched, context.cast());
        IOHIDManagerRegisterDeviceRemovalCallback(manager, device_removed, context.cast());
        IOHIDManagerScheduleWithRunLoop(manager, run_loop_ref, mode);
    }

    let status = unsafe { IOHIDManagerOpen(manager, OPTIONS_NONE) };
    if status != IO_RETURN_SUCCESS {
        unsafe {
            IOHIDManagerUnscheduleFromRunLoop(manager, run_loop_ref, mode);
            CFRelease(manager);
        }
        drop(unsafe { Box::from_raw(context) });
        let _ = ready.send(Err(SetupError::MonitorOpen(status)));
        return;
    }

    // Report what is plugged in now; the matching callback will report the
    // same devices again on the first run-loop pass and the registry
    // ignores repeats.
    report_present_devices(manager, &sink);

    if ready.send(Ok(())).is_ok() {
        while !stop.load(Ordering::Acquire) {
            CFRunLoop::run_in_mode(mode, RUN_SLICE, false);
        }
    }

    unsafe {
        IOHIDManagerUnscheduleFromRunLoop(manager, run_loop_ref, mode);
        IOHIDManagerClose(manager, OPTIONS_NONE);
        CFRelease(manager);
    }
    drop(unsafe { Box::from_raw(context) });
    debug!("HID monitor thread exiting");
}

fn report_present_devices(manager: IOHIDManagerRef, sink: &DeviceSink) {
    let set = unsafe { IOHIDManagerCopyDevices(manager) };
    if set.is_null() {
        return;
    }
    let count = usize::try_from(unsafe { CFSetGetCount(set) }).unwrap_or(0);
    let mut devices: Vec<*const c_void> = vec![std::ptr::null(); count];
    unsafe { CFSetGetValues(set, devices.as_mut_ptr()) };
    for device in devices.into_iter().filter(|d| !d.is_null()) {
        sink.device_attached(describe(device as IOHIDDeviceRef));
    }
    unsafe { CFRelease(set) };
}
