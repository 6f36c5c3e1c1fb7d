//! Rounded-corner dead-zone correction.
//!
//! Windows are drawn with rounded corners but resized by their rectangular
//! frame. A click in the transparent sliver between the rounded outline and
//! the true corner falls through to whatever is behind the window. This
//! transform pulls such pointer locations onto the true corner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tapwise_core::domain::hit_test::{corner_correction, find_window_and_edge, HitTestConfig};
use tapwise_core::event::{EventMask, EventType, TapEvent, TapVerdict};
use tracing::{debug, trace};

use super::{Feature, Transform};
use crate::application::tap_manager::TapCallback;
use crate::application::window_geometry::GeometryService;

pub struct CornerFixTransform {
    geometry: Arc<GeometryService>,
    config: RwLock<HitTestConfig>,
    corrections: AtomicU64,
}

impl CornerFixTransform {
    pub fn new(geometry: Arc<GeometryService>, config: HitTestConfig) -> Self {
        Self {
            geometry,
            config: RwLock::new(config),
            corrections: AtomicU64::new(0),
        }
    }

    pub fn set_config(&self, config: HitTestConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn config(&self) -> HitTestConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of events rewritten since creation.
    pub fn corrections(&self) -> u64 {
        self.corrections.load(Ordering::Relaxed)
    }
}

impl TapCallback for CornerFixTransform {
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        if !matches!(event_type, EventType::MouseMoved | EventType::LeftMouseDown) {
            return TapVerdict::Forward;
        }

        let config = self.config();
        let windows = match self.geometry.windows() {
            Ok(windows) => windows,
            Err(e) => {
                trace!(error = %e, "geometry unavailable; corner fix skipped");
                return TapVerdict::Forward;
            }
        };

        let point = event.location();
        let Some(hit) = find_window_and_edge(point, &windows, &config) else {
            return TapVerdict::Forward;
        };
        if let Some(adjusted) = corner_correction(point, &hit.window.frame, hit.edge, &config) {
            event.set_location(adjusted);
            self.corrections.fetch_add(1, Ordering::Relaxed);
            debug!(
                window = %hit.window.id,
                owner = %hit.window.owner_name,
                corner = ?hit.edge,
                from = ?point,
                to = ?adjusted,
                "pointer pulled out of corner dead zone"
            );
        }
        TapVerdict::Forward
    }
}

impl Transform for CornerFixTransform {
    fn feature(&self) -> Feature {
        Feature::CornerFix
    }

    fn event_mask(&self) -> EventMask {
        EventMask::of(&[EventType::MouseMoved, EventType::LeftMouseDown])
    }
}
