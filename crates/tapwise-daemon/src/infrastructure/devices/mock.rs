//! Mock device monitor for tests.
//!
//! Reports a fixed set of devices on start, like a HID manager that finds
//! what is already plugged in, and lets tests plug and unplug more.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tapwise_core::{DeviceDescriptor, DeviceId};

use crate::application::device_registry::{DeviceMonitor, DeviceSink, SetupError};

#[derive(Default)]
struct MonitorState {
    sink: Option<DeviceSink>,
    present: Vec<DeviceDescriptor>,
    fail_with: Option<i32>,
    start_calls: usize,
}

#[derive(Default)]
pub struct MockDeviceMonitor {
    state: Mutex<MonitorState>,
}

impl MockDeviceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A monitor that finds `devices` already attached when started.
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let monitor = Self::default();
        monitor.lock().present = devices;
        monitor
    }

    /// A monitor whose `start` fails with [`SetupError::MonitorOpen`].
    pub fn failing(status: i32) -> Self {
        let monitor = Self::default();
        monitor.lock().fail_with = Some(status);
        monitor
    }

    pub fn is_running(&self) -> bool {
        self.lock().sink.is_some()
    }

    pub fn start_calls(&self) -> usize {
        self.lock().start_calls
    }

    /// Plugs a device in. Reported only while the monitor is running.
    pub fn attach(&self, descriptor: DeviceDescriptor) {
        let sink = {
            let mut state = self.lock();
            state.present.push(descriptor.clone());
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.device_attached(descriptor);
        }
    }

    /// Unplugs a device. Reported only while the monitor is running.
    pub fn detach(&self, id: &DeviceId) {
        let sink = {
            let mut state = self.lock();
            state.present.retain(|d| &d.device_id() != id);
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.device_removed(id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceMonitor for MockDeviceMonitor {
    fn start(&self, sink: DeviceSink) -> Result<(), SetupError> {
        let present = {
            let mut state = self.lock();
            state.start_calls += 1;
            if let Some(status) = state.fail_with {
                return Err(SetupError::MonitorOpen(status));
            }
            state.sink = Some(sink.clone());
            state.present.clone()
        };
        for descriptor in present {
            sink.device_attached(descriptor);
        }
        Ok(())
    }

    fn stop(&self) {
        self.lock().sink = None;
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// An Apple Magic Mouse over Bluetooth.
pub fn magic_mouse() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x004C,
        product_id: 0x0269,
        location_id: 0x3c00_0000,
        product_name: "Magic Mouse".to_string(),
        transport: "Bluetooth".to_string(),
        is_builtin: false,
    }
}

/// A generic three-button USB wheel mouse.
pub fn usb_mouse() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x046D,
        product_id: 0xC077,
        location_id: 0x1420_0000,
        product_name: "USB Optical Mouse".to_string(),
        transport: "USB".to_string(),
        is_builtin: false,
    }
}

/// The internal trackpad of a MacBook.
pub fn builtin_trackpad() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x05AC,
        product_id: 0x0342,
        location_id: 0x0300_0000,
        product_name: "Apple Internal Keyboard / Trackpad".to_string(),
        transport: "SPI".to_string(),
        is_builtin: true,
    }
}
