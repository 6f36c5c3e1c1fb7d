//! Per-device scroll direction.
//!
//! Scroll events do not say which device sent them, so the device type is
//! inferred from whether the event is continuous (see
//! [`DeviceRegistry::resolve_scroll_device`]). The configured direction for
//! that type is compared with the system-wide natural scrolling setting and
//! the deltas are flipped when they disagree.
//!
//! Resolution depends only on the settings and the set of connected devices,
//! so both outcomes (discrete and continuous) are computed ahead of time and
//! refreshed on settings changes and device notifications. The event path
//! does a single read-locked lookup.
//!
//! Momentum (inertial) scroll events are never touched.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tapwise_core::domain::scroll::{invert_scroll_deltas, is_continuous, is_momentum, should_invert};
use tapwise_core::event::{EventMask, EventType, TapEvent, TapVerdict};
use tapwise_core::{DeviceType, ScrollDirection};
use tracing::{debug, trace};

use super::{Feature, Transform};
use crate::application::device_registry::{DeviceRegistry, SubscriptionId};
use crate::application::settings::ScrollSettings;
use crate::application::tap_manager::TapCallback;

/// The OS-wide "natural scrolling" preference.
pub trait ScrollPreference: Send + Sync {
    fn natural_scrolling(&self) -> bool;
}

#[derive(Default)]
struct ScrollState {
    settings: ScrollSettings,
    /// Indexed by `is_continuous as usize`.
    resolved: [Option<ScrollDirection>; 2],
}

pub struct ScrollTransform {
    registry: DeviceRegistry,
    preference: Arc<dyn ScrollPreference>,
    state: RwLock<ScrollState>,
    subscription: OnceLock<SubscriptionId>,
}

impl ScrollTransform {
    /// Builds the transform and subscribes it to device notifications.
    pub fn new(
        registry: DeviceRegistry,
        preference: Arc<dyn ScrollPreference>,
        settings: ScrollSettings,
    ) -> Arc<Self> {
        let transform = Arc::new(Self {
            registry: registry.clone(),
            preference,
            state: RwLock::new(ScrollState {
                settings,
                resolved: [None, None],
            }),
            subscription: OnceLock::new(),
        });
        transform.refresh();

        let weak = Arc::downgrade(&transform);
        let id = registry.subscribe(move |_| {
            if let Some(transform) = weak.upgrade() {
                transform.refresh();
            }
        });
        let _ = transform.subscription.set(id);
        transform
    }

    pub fn update_settings(&self, settings: ScrollSettings) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).settings = settings;
        self.refresh();
    }

    /// Direction that will be enforced for the given kind of scroll event.
    pub fn resolved_direction(&self, continuous: bool) -> Option<ScrollDirection> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).resolved[usize::from(continuous)]
    }

    /// Recomputes both resolution outcomes.
    ///
    /// The settings are copied out first so that the state lock is not held
    /// while the registry is queried.
    pub fn refresh(&self) {
        self.refresh_with(|settings| [self.resolve(settings, false), self.resolve(settings, true)]);
    }

    /// Stores the table computed by `resolve`, recomputing until it was
    /// computed from the settings currently stored.
    fn refresh_with<F>(&self, mut resolve: F)
    where
        F: FnMut(&ScrollSettings) -> [Option<ScrollDirection>; 2],
    {
        let mut settings = self.state.read().unwrap_or_else(PoisonError::into_inner).settings.clone();
        loop {
            let resolved = resolve(&settings);
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.settings == settings {
                state.resolved = resolved;
                debug!(discrete = ?resolved[0], continuous = ?resolved[1], "scroll direction table refreshed");
                return;
            }
            trace!("settings changed during refresh; recomputing");
            settings = state.settings.clone();
        }
    }

    /// Per-device entry of the first connected device of the inferred type,
    /// then the per-type entry, then nothing.
    fn resolve(&self, settings: &ScrollSettings, continuous: bool) -> Option<ScrollDirection> {
        let device_type: DeviceType = self.registry.resolve_scroll_device(continuous);
        self.registry
            .devices_of_type(device_type)
            .iter()
            .find_map(|d| settings.per_device.get(&d.id).copied())
            .or_else(|| settings.per_type.get(&device_type).copied())
    }
}

impl Drop for ScrollTransform {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get() {
            self.registry.unsubscribe(*id);
        }
    }
}

impl TapCallback for ScrollTransform {
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        if event_type != EventType::ScrollWheel {
            return TapVerdict::Forward;
        }
        if is_momentum(event) {
            trace!("momentum scroll passed through");
            return TapVerdict::Forward;
        }

        let continuous = is_continuous(event);
        let Some(configured) = self.resolved_direction(continuous) else {
            return TapVerdict::Forward;
        };
        if should_invert(configured, self.preference.natural_scrolling()) {
            invert_scroll_deltas(event);
            trace!(continuous, ?configured, "scroll deltas inverted");
        }
        TapVerdict::Forward
    }
}

impl Transform for ScrollTransform {
    fn feature(&self) -> Feature {
        Feature::Scroll
    }

    fn event_mask(&self) -> EventMask {
        EventMask::of(&[EventType::ScrollWheel])
    }
}
