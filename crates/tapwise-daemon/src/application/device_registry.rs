//! Pointing-device registry.
//!
//! Tracks every device a [`DeviceMonitor`] reports, classifies it and tells
//! subscribers about connects and disconnects. Unplugged devices stay in the
//! registry with `connected = false` so per-device settings survive a replug.
//!
//! # Locking
//!
//! The device table and the subscriber list have separate mutexes and are
//! never held together. Notifications are delivered after the table lock is
//! released, with a cloned subscriber list, so a subscriber may call back
//! into the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tapwise_core::{classify_device, Device, DeviceDescriptor, DeviceId, DeviceType};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while starting device monitoring.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The HID manager (or equivalent service) could not be created.
    #[error("failed to create device monitor: {0}")]
    MonitorCreation(String),

    /// The service was created but refused to open.
    #[error("failed to open device monitor (status {0:#x})")]
    MonitorOpen(i32),

    #[error("device monitoring has already been started")]
    AlreadyStarted,
}

/// Source of device attach/detach reports.
pub trait DeviceMonitor: Send + Sync {
    /// Begins reporting into `sink`. Devices already attached must be
    /// reported as attachments.
    fn start(&self, sink: DeviceSink) -> Result<(), SetupError>;

    fn stop(&self);
}

/// Handle a [`DeviceMonitor`] reports into.
///
/// Holds only a weak reference: reports after the registry is gone are
/// dropped.
#[derive(Clone)]
pub struct DeviceSink {
    registry: Weak<RegistryInner>,
}

impl DeviceSink {
    pub fn device_attached(&self, descriptor: DeviceDescriptor) {
        if let Some(inner) = self.registry.upgrade() {
            inner.attach(&descriptor);
        }
    }

    pub fn device_removed(&self, id: &DeviceId) {
        if let Some(inner) = self.registry.upgrade() {
            inner.detach(id);
        }
    }
}

/// Change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceNotification {
    Connected(Device),
    Disconnected(Device),
}

impl DeviceNotification {
    pub fn device(&self) -> &Device {
        match self {
            DeviceNotification::Connected(d) | DeviceNotification::Disconnected(d) => d,
        }
    }
}

/// Stable handle returned by [`DeviceRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&DeviceNotification) + Send + Sync>;

#[derive(Default)]
struct DeviceTable {
    /// In first-connected order.
    devices: Vec<Device>,
    overrides: HashMap<DeviceId, DeviceType>,
}

#[derive(Default)]
struct RegistryInner {
    table: Mutex<DeviceTable>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    monitor: Mutex<Option<Arc<dyn DeviceMonitor>>>,
}

impl RegistryInner {
    fn table(&self) -> MutexGuard<'_, DeviceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, descriptor: &DeviceDescriptor) {
        let device = {
            let mut table = self.table();
            let device = Device::from_descriptor(descriptor, &table.overrides);
            match table.devices.iter_mut().find(|d| d.id == device.id) {
                Some(existing) => {
                    if existing.connected {
                        debug!(device = %existing.id, "duplicate attach report ignored");
                        return;
                    }
                    *existing = device.clone();
                }
                None => table.devices.push(device.clone()),
            }
            device
        };

        info!(
            device = %device.id,
            kind = %device.device_type,
            name = %device.display_name,
            "pointing device connected"
        );
        self.notify(&DeviceNotification::Connected(device));
    }

    fn detach(&self, id: &DeviceId) {
        let device = {
            let mut table = self.table();
            match table.devices.iter_mut().find(|d| &d.id == id) {
                Some(existing) if existing.connected => {
                    existing.connected = false;
                    existing.clone()
                }
                _ => {
                    debug!(device = %id, "removal report for unknown or stale device ignored");
                    return;
                }
            }
        };

        info!(device = %device.id, kind = %device.device_type, "pointing device disconnected");
        self.notify(&DeviceNotification::Disconnected(device));
    }

    fn notify(&self, notification: &DeviceNotification) {
        let subscribers: Vec<Subscriber> = self
            .subscribers()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(notification);
        }
    }
}

/// Rebuilds the classification inputs of a tracked device.
fn descriptor_of(device: &Device) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: device.vendor_id,
        product_id: device.product_id,
        product_name: device.display_name.clone(),
        is_builtin: device.is_builtin,
        ..DeviceDescriptor::default()
    }
}

/// Registry of known pointing devices. Cheap to clone.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `monitor` and keeps it until [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// [`SetupError::AlreadyStarted`] if a monitor is already running, or
    /// whatever the monitor reports.
    pub fn start(&self, monitor: Arc<dyn DeviceMonitor>) -> Result<(), SetupError> {
        if self.is_started() {
            return Err(SetupError::AlreadyStarted);
        }
        // The monitor reports already-attached devices synchronously, and
        // subscribers may query the registry, so no lock is held here.
        monitor.start(DeviceSink {
            registry: Arc::downgrade(&self.inner),
        })?;
        *self.inner.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(monitor);
        info!("device monitoring started");
        Ok(())
    }

    /// Stops the monitor, if any. Known devices are kept.
    pub fn stop(&self) {
        let monitor = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
            info!("device monitoring stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Every known device, stale ones included.
    pub fn all_devices(&self) -> Vec<Device> {
        self.inner.table().devices.clone()
    }

    pub fn connected_devices(&self) -> Vec<Device> {
        self.inner
            .table()
            .devices
            .iter()
            .filter(|d| d.connected)
            .cloned()
            .collect()
    }

    /// Connected devices of type `device_type`, in first-connected order.
    pub fn devices_of_type(&self, device_type: DeviceType) -> Vec<Device> {
        self.inner
            .table()
            .devices
            .iter()
            .filter(|d| d.connected && d.device_type == device_type)
            .cloned()
            .collect()
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.inner.table().devices.iter().find(|d| &d.id == id).cloned()
    }

    fn has_connected(&self, device_type: DeviceType) -> bool {
        self.inner
            .table()
            .devices
            .iter()
            .any(|d| d.connected && d.device_type == device_type)
    }

    /// Guesses which kind of device produced a scroll event.
    ///
    /// Scroll events carry no device id, only whether they were continuous.
    /// Wheel mice send discrete events. Continuous events come from a
    /// trackpad when one is connected, else from a Magic Mouse when one is
    /// connected, else a trackpad is assumed.
    pub fn resolve_scroll_device(&self, is_continuous: bool) -> DeviceType {
        if !is_continuous {
            return DeviceType::Mouse;
        }
        if self.has_connected(DeviceType::Trackpad) {
            DeviceType::Trackpad
        } else if self.has_connected(DeviceType::MagicMouse) {
            DeviceType::MagicMouse
        } else {
            DeviceType::Trackpad
        }
    }

    /// Replaces the manual type overrides and reclassifies known devices.
    ///
    /// A device whose override was dropped falls back to the heuristic.
    pub fn set_type_overrides(&self, overrides: HashMap<DeviceId, DeviceType>) {
        let mut table = self.inner.table();
        for device in &mut table.devices {
            let device_type = overrides
                .get(&device.id)
                .copied()
                .unwrap_or_else(|| classify_device(&descriptor_of(device)));
            if device.device_type != device_type {
                debug!(device = %device.id, from = %device.device_type, to = %device_type, "device reclassified");
                device.device_type = device_type;
            }
        }
        table.overrides = overrides;
    }

    /// Registers `callback` for every future notification.
    ///
    /// The callback runs on the monitor's thread with no registry lock held.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceNotification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers().push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if !removed {
            warn!(subscription = id.0, "unsubscribe for unknown subscription");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
