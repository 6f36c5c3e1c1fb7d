//! Composition root for the input pipeline.
//!
//! [`Engine`] owns the tap manager, the device registry, the geometry cache
//! and the four pipelines. Every OS-facing collaborator is injected through
//! [`EngineDeps`]; the engine itself never touches an OS API.
//!
//! # Lifecycle
//!
//! ```text
//! Engine::new(deps, settings)
//!  └─ start()                 device monitor, snap zones, enabled pipelines
//!      ├─ apply_settings()    hot reload; flips only features whose
//!      │                      enabled state changed
//!      ├─ on_display_change() geometry cache + snap zones
//!      └─ shutdown()          every tap removed, device monitor stopped
//! ```
//!
//! A feature that fails to start is reported in [`StartReport`] and left
//! off; the others keep running.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tapwise_core::Rect;
use tracing::{error, info, warn};

use super::device_registry::{DeviceMonitor, DeviceRegistry, SetupError};
use super::pipelines::{
    AccelerationTransform, CornerFixTransform, Feature, Pipeline, ScrollPreference, ScrollTransform,
    SnapTransform,
};
use super::scheduler::Scheduler;
use super::settings::Settings;
use super::tap_manager::{PermissionChecker, TapBackend, TapError, TapManager};
use super::window_geometry::{Clock, GeometryError, GeometryService, WindowMover, WindowQuery};

/// Lists the bounds of every active display in global coordinates.
pub trait ScreenEnumerator: Send + Sync {
    fn screen_frames(&self) -> Result<Vec<Rect>, GeometryError>;
}

/// Everything the engine needs from the outside world.
pub struct EngineDeps {
    pub tap_backend: Arc<dyn TapBackend>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub scheduler: Arc<dyn Scheduler>,
    pub device_monitor: Arc<dyn DeviceMonitor>,
    pub window_query: Arc<dyn WindowQuery>,
    pub window_mover: Arc<dyn WindowMover>,
    pub scroll_preference: Arc<dyn ScrollPreference>,
    pub screens: Arc<dyn ScreenEnumerator>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to one feature during a start or reload.
#[derive(Debug)]
pub enum FeatureOutcome {
    Started,
    /// Turned off in settings.
    Disabled,
    /// Turned off because its tap could not be created.
    Failed(TapError),
    /// Already in the requested state; nothing done.
    Unchanged,
    Stopped,
}

impl FeatureOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FeatureOutcome::Failed(_))
    }
}

impl fmt::Display for FeatureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureOutcome::Started => f.write_str("started"),
            FeatureOutcome::Disabled => f.write_str("disabled"),
            FeatureOutcome::Failed(e) => write!(f, "failed: {e}"),
            FeatureOutcome::Unchanged => f.write_str("unchanged"),
            FeatureOutcome::Stopped => f.write_str("stopped"),
        }
    }
}

/// Per-feature result of [`Engine::start`] or [`Engine::apply_settings`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// `None` when device monitoring was not (re)started by this call.
    pub devices: Option<Result<(), SetupError>>,
    pub features: Vec<(Feature, FeatureOutcome)>,
}

impl StartReport {
    pub fn outcome(&self, feature: Feature) -> Option<&FeatureOutcome> {
        self.features.iter().find(|(f, _)| *f == feature).map(|(_, o)| o)
    }

    pub fn has_failures(&self) -> bool {
        self.features.iter().any(|(_, o)| o.is_failure())
            || matches!(self.devices, Some(Err(_)))
    }

    pub fn running(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features
            .iter()
            .filter(|(_, o)| matches!(o, FeatureOutcome::Started | FeatureOutcome::Unchanged))
            .map(|(f, _)| *f)
    }
}

pub struct Engine {
    taps: TapManager,
    devices: DeviceRegistry,
    device_monitor: Arc<dyn DeviceMonitor>,
    geometry: Arc<GeometryService>,
    screens: Arc<dyn ScreenEnumerator>,
    acceleration: Pipeline<AccelerationTransform>,
    scroll: Pipeline<ScrollTransform>,
    corner_fix: Pipeline<CornerFixTransform>,
    snap: Pipeline<SnapTransform>,
    settings: Mutex<Settings>,
    last_screens: Mutex<Vec<Rect>>,
}

impl Engine {
    pub fn new(deps: EngineDeps, settings: Settings) -> Self {
        let taps = TapManager::with_reenable_delay(
            deps.tap_backend,
            deps.permissions,
            Arc::clone(&deps.scheduler),
            settings.runtime.tap_reenable_delay,
        );
        let devices = DeviceRegistry::new();
        devices.set_type_overrides(settings.device_overrides.clone());
        let geometry = Arc::new(GeometryService::new(
            deps.window_query,
            deps.clock,
            settings.runtime.geometry_cache_ttl,
        ));

        let acceleration = Pipeline::new(
            taps.clone(),
            Arc::new(AccelerationTransform::new(settings.acceleration.mapper.clone())),
        );
        let scroll = Pipeline::new(
            taps.clone(),
            ScrollTransform::new(devices.clone(), deps.scroll_preference, settings.scroll.clone()),
        );
        let corner_fix = Pipeline::new(
            taps.clone(),
            Arc::new(CornerFixTransform::new(
                Arc::clone(&geometry),
                settings.corner_fix.hit_test,
            )),
        );
        let snap = Pipeline::new(
            taps.clone(),
            Arc::new(SnapTransform::new(
                Arc::clone(&geometry),
                deps.window_mover,
                deps.scheduler,
                settings.snap.clone(),
            )),
        );

        Self {
            taps,
            devices,
            device_monitor: deps.device_monitor,
            geometry,
            screens: deps.screens,
            acceleration,
            scroll,
            corner_fix,
            snap,
            settings: Mutex::new(settings),
            last_screens: Mutex::new(Vec::new()),
        }
    }

    fn current_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts device monitoring, builds snap zones and starts every enabled
    /// feature.
    pub fn start(&self) -> StartReport {
        let devices = self.devices.start(Arc::clone(&self.device_monitor));
        if let Err(e) = &devices {
            warn!(error = %e, "device monitoring unavailable; scroll device detection falls back to defaults");
        }
        self.on_display_change();

        let settings = self.current_settings().clone();
        let features = Feature::ALL
            .into_iter()
            .map(|feature| {
                let outcome = if feature_enabled(&settings, feature) {
                    self.start_feature(feature)
                } else {
                    FeatureOutcome::Disabled
                };
                (feature, outcome)
            })
            .collect();

        let report = StartReport {
            devices: Some(devices),
            features,
        };
        let running: Vec<&str> = report.running().map(Feature::name).collect();
        info!(features = ?running, "engine started");
        report
    }

    /// Applies new settings without recreating running taps.
    ///
    /// Transforms pick up their new parameters in place. Only features whose
    /// enabled state flipped are started or stopped.
    pub fn apply_settings(&self, settings: Settings) -> StartReport {
        *self.current_settings() = settings.clone();

        self.devices.set_type_overrides(settings.device_overrides.clone());
        self.geometry.set_ttl(settings.runtime.geometry_cache_ttl);
        self.taps.set_reenable_delay(settings.runtime.tap_reenable_delay);
        self.acceleration.transform().set_mapper(settings.acceleration.mapper.clone());
        self.scroll.transform().update_settings(settings.scroll.clone());
        self.corner_fix.transform().set_config(settings.corner_fix.hit_test);
        self.snap.transform().update_settings(settings.snap.clone());

        let features = Feature::ALL
            .into_iter()
            .map(|feature| {
                let was = self.is_running(feature);
                let now = feature_enabled(&settings, feature);
                let outcome = match (was, now) {
                    (false, true) => self.start_feature(feature),
                    (true, false) => {
                        self.stop_feature(feature);
                        FeatureOutcome::Stopped
                    }
                    (true, true) => FeatureOutcome::Unchanged,
                    (false, false) => FeatureOutcome::Disabled,
                };
                (feature, outcome)
            })
            .collect();

        info!("settings applied");
        StartReport {
            devices: None,
            features,
        }
    }

    /// Re-reads the display list. On change, invalidates the geometry cache
    /// and rebuilds the snap zones. Returns `true` if anything changed.
    pub fn on_display_change(&self) -> bool {
        let screens = match self.screens.screen_frames() {
            Ok(screens) => screens,
            Err(e) => {
                warn!(error = %e, "display enumeration failed; keeping previous layout");
                return false;
            }
        };
        {
            let mut last = self.last_screens.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == screens {
                return false;
            }
            last.clone_from(&screens);
        }

        self.geometry.invalidate();
        self.snap.transform().update_screens(&screens);
        info!(displays = screens.len(), "display configuration changed");
        true
    }

    /// Checks running taps for silent OS disables. Returns how many were found.
    pub fn health_check(&self) -> usize {
        let found = self.taps.health_check();
        if found > 0 {
            warn!(count = found, "event taps found disabled without notification");
        }
        found
    }

    /// Stops every pipeline, removes all taps and stops device monitoring.
    pub fn shutdown(&self) {
        for feature in Feature::ALL {
            self.stop_feature(feature);
        }
        let leftover = self.taps.remove_all_taps();
        if leftover > 0 {
            warn!(count = leftover, "removed taps left behind by pipelines");
        }
        self.devices.stop();
        info!("engine shut down");
    }

    pub fn is_running(&self, feature: Feature) -> bool {
        match feature {
            Feature::Acceleration => self.acceleration.is_running(),
            Feature::Scroll => self.scroll.is_running(),
            Feature::CornerFix => self.corner_fix.is_running(),
            Feature::Snap => self.snap.is_running(),
        }
    }

    pub fn tap_manager(&self) -> &TapManager {
        &self.taps
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn geometry(&self) -> &Arc<GeometryService> {
        &self.geometry
    }

    pub fn settings(&self) -> Settings {
        self.current_settings().clone()
    }

    pub fn acceleration(&self) -> &Pipeline<AccelerationTransform> {
        &self.acceleration
    }

    pub fn scroll(&self) -> &Pipeline<ScrollTransform> {
        &self.scroll
    }

    pub fn corner_fix(&self) -> &Pipeline<CornerFixTransform> {
        &self.corner_fix
    }

    pub fn snap(&self) -> &Pipeline<SnapTransform> {
        &self.snap
    }

    fn start_feature(&self, feature: Feature) -> FeatureOutcome {
        let result = match feature {
            Feature::Acceleration => self.acceleration.start(),
            Feature::Scroll => self.scroll.start(),
            Feature::CornerFix => self.corner_fix.start(),
            Feature::Snap => self.snap.start(),
        };
        match result {
            Ok(()) => {
                info!(feature = %feature, "feature started");
                FeatureOutcome::Started
            }
            Err(e) => {
                error!(feature = %feature, error = %e, "feature failed to start; leaving it off");
                FeatureOutcome::Failed(e)
            }
        }
    }

    fn stop_feature(&self, feature: Feature) {
        let stopped = match feature {
            Feature::Acceleration => self.acceleration.stop(),
            Feature::Scroll => self.scroll.stop(),
            Feature::CornerFix => self.corner_fix.stop(),
            Feature::Snap => self.snap.stop(),
        };
        if stopped {
            info!(feature = %feature, "feature stopped");
        }
    }
}

fn feature_enabled(settings: &Settings, feature: Feature) -> bool {
    match feature {
        Feature::Acceleration => settings.acceleration.enabled,
        Feature::Scroll => settings.scroll.is_enabled(),
        Feature::CornerFix => settings.corner_fix.enabled,
        Feature::Snap => settings.snap.enabled,
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.taps.remove_all_taps();
        self.devices.stop();
    }
}
