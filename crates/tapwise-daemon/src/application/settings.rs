//! Validated runtime settings.
//!
//! This is what the pipelines consume. It is built from the on-disk
//! configuration by `infrastructure::storage::config`, which owns all
//! parsing and validation.

use std::collections::HashMap;
use std::time::Duration;

use tapwise_core::domain::snap::DEFAULT_SNAP_THRESHOLD_PX;
use tapwise_core::{DeviceId, DeviceType, HitTestConfig, ScrollDirection, VelocityMapper};

use super::tap_manager::DEFAULT_REENABLE_DELAY;
use super::window_geometry::DEFAULT_GEOMETRY_TTL;

/// Pointer travel (px) after which a press becomes a drag.
pub const DEFAULT_DRAG_THRESHOLD_PX: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CornerFixSettings {
    pub enabled: bool,
    pub hit_test: HitTestConfig,
}

impl Default for CornerFixSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hit_test: HitTestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapSettings {
    pub enabled: bool,
    pub threshold_px: f64,
    pub drag_threshold_px: f64,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_px: DEFAULT_SNAP_THRESHOLD_PX,
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccelerationSettings {
    pub enabled: bool,
    pub mapper: VelocityMapper,
}

/// Scroll direction preferences. Per-device entries beat per-type entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrollSettings {
    pub per_type: HashMap<DeviceType, ScrollDirection>,
    pub per_device: HashMap<DeviceId, ScrollDirection>,
}

impl ScrollSettings {
    /// The scroll pipeline only runs when there is something to enforce.
    pub fn is_enabled(&self) -> bool {
        !self.per_type.is_empty() || !self.per_device.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSettings {
    pub geometry_cache_ttl: Duration,
    pub tap_reenable_delay: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            geometry_cache_ttl: DEFAULT_GEOMETRY_TTL,
            tap_reenable_delay: DEFAULT_REENABLE_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub corner_fix: CornerFixSettings,
    pub snap: SnapSettings,
    pub acceleration: AccelerationSettings,
    pub scroll: ScrollSettings,
    pub device_overrides: HashMap<DeviceId, DeviceType>,
    pub runtime: RuntimeSettings,
}
