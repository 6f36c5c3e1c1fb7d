//! TOML-based configuration for the daemon.
//!
//! The file lives at:
//! - macOS:    `~/Library/Application Support/Tapwise/config.toml`
//! - elsewhere: `$XDG_CONFIG_HOME/tapwise/config.toml` (or `~/.config/tapwise`)
//!
//! Every field carries a serde default, so a missing file, a missing section
//! or a missing key all fall back to the built-in values:
//!
//! ```toml
//! [corner_fix]
//! enabled = true
//! hit_box_extension_px = 5.0
//!
//! [acceleration]
//! enabled = true
//! curve = { p1 = [0.4, 0.1], p2 = [0.8, 0.7] }
//!
//! [scroll.types]
//! mouse = "traditional"
//!
//! [devices.type_overrides]
//! "046d:c52b:14200000" = "mouse"
//! ```
//!
//! [`AppConfig`] is the raw schema. [`AppConfig::to_settings`] validates it
//! and produces the [`Settings`] the engine consumes; nothing downstream
//! ever sees an unvalidated curve or a negative threshold.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tapwise_core::curve::{DEFAULT_MAX_VELOCITY, DEFAULT_MIN_VELOCITY};
use tapwise_core::domain::hit_test::{
    DEFAULT_CORNER_SIZE_MULTIPLIER, DEFAULT_HIT_BOX_PX, DEFAULT_PRECISION_PX,
    DEFAULT_SYSTEM_CORNER_RADIUS_PX,
};
use tapwise_core::domain::snap::DEFAULT_SNAP_THRESHOLD_PX;
use tapwise_core::{
    AccelerationCurve, CurveError, CurvePreset, DeviceId, DeviceType, HitTestConfig, ScrollDirection,
    VelocityMapper,
};
use thiserror::Error;

use crate::application::settings::{
    AccelerationSettings, CornerFixSettings, RuntimeSettings, ScrollSettings, Settings, SnapSettings,
    DEFAULT_DRAG_THRESHOLD_PX,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The acceleration curve is not acceptable.
    #[error("invalid acceleration curve: {0}")]
    Curve(#[from] CurveError),

    /// A value parsed but is outside its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub corner_fix: CornerFixConfig,
    #[serde(default)]
    pub snap: SnapConfig,
    #[serde(default)]
    pub acceleration: AccelerationConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CornerFixConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Half-width of the band around each window edge.
    #[serde(default = "default_hit_box")]
    pub hit_box_extension_px: f64,
    /// Maximum distance from the true corner after correction.
    #[serde(default = "default_precision")]
    pub precision_px: f64,
    #[serde(default = "default_corner_radius")]
    pub system_corner_radius_px: f64,
    #[serde(default = "default_corner_multiplier")]
    pub corner_size_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Width of the trigger band along each screen edge.
    #[serde(default = "default_snap_threshold")]
    pub threshold_px: f64,
    /// Pointer travel before a press counts as a window drag.
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold_px: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccelerationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub curve: CurveConfig,
    #[serde(default = "default_min_velocity")]
    pub min_velocity: f64,
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
}

/// Either a preset name or the two inner control points of a custom curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CurveConfig {
    Preset(String),
    Custom { p1: [f64; 2], p2: [f64; 2] },
}

impl Default for CurveConfig {
    fn default() -> Self {
        CurveConfig::Preset(CurvePreset::Linear.name().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScrollConfig {
    /// Device type name (`mouse`, `trackpad`, `magicMouse`, ...) to direction.
    #[serde(default)]
    pub types: BTreeMap<String, ScrollDirection>,
    /// Device id to direction. Beats the per-type entry.
    #[serde(default)]
    pub devices: BTreeMap<String, ScrollDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DevicesConfig {
    /// Device id to forced device type, applied before classification.
    #[serde(default)]
    pub type_overrides: BTreeMap<String, DeviceType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_geometry_ttl_ms")]
    pub geometry_cache_ttl_ms: u64,
    #[serde(default = "default_reenable_delay_ms")]
    pub tap_reenable_delay_ms: u64,
}

// ── Default value functions (required by serde) ───────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_hit_box() -> f64 {
    DEFAULT_HIT_BOX_PX
}
fn default_precision() -> f64 {
    DEFAULT_PRECISION_PX
}
fn default_corner_radius() -> f64 {
    DEFAULT_SYSTEM_CORNER_RADIUS_PX
}
fn default_corner_multiplier() -> f64 {
    DEFAULT_CORNER_SIZE_MULTIPLIER
}
fn default_snap_threshold() -> f64 {
    DEFAULT_SNAP_THRESHOLD_PX
}
fn default_drag_threshold() -> f64 {
    DEFAULT_DRAG_THRESHOLD_PX
}
fn default_min_velocity() -> f64 {
    DEFAULT_MIN_VELOCITY
}
fn default_max_velocity() -> f64 {
    DEFAULT_MAX_VELOCITY
}
fn default_geometry_ttl_ms() -> u64 {
    100
}
fn default_reenable_delay_ms() -> u64 {
    100
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for CornerFixConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hit_box_extension_px: default_hit_box(),
            precision_px: default_precision(),
            system_corner_radius_px: default_corner_radius(),
            corner_size_multiplier: default_corner_multiplier(),
        }
    }
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold_px: default_snap_threshold(),
            drag_threshold_px: default_drag_threshold(),
        }
    }
}

impl Default for AccelerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            curve: CurveConfig::default(),
            min_velocity: default_min_velocity(),
            max_velocity: default_max_velocity(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            geometry_cache_ttl_ms: default_geometry_ttl_ms(),
            tap_reenable_delay_ms: default_reenable_delay_ms(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

const DEVICE_TYPES: [DeviceType; 5] = [
    DeviceType::Mouse,
    DeviceType::Trackpad,
    DeviceType::MagicMouse,
    DeviceType::Keyboard,
    DeviceType::Unknown,
];

fn parse_device_type(name: &str) -> Result<DeviceType, ConfigError> {
    DEVICE_TYPES
        .into_iter()
        .find(|t| t.to_string().eq_ignore_ascii_case(name))
        .ok_or_else(|| ConfigError::Invalid(format!("unknown device type `{name}` in [scroll.types]")))
}

fn require(ok: bool, what: &str, value: f64) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{what} = {value}")))
    }
}

impl CurveConfig {
    /// Resolves the preset or validates the custom control points.
    pub fn to_curve(&self) -> Result<AccelerationCurve, ConfigError> {
        match self {
            CurveConfig::Preset(name) => Ok(AccelerationCurve::preset(name.parse::<CurvePreset>()?)),
            CurveConfig::Custom { p1, p2 } => {
                Ok(AccelerationCurve::custom("custom", (p1[0], p1[1]), (p2[0], p2[1]))?)
            }
        }
    }
}

impl AppConfig {
    /// Validates the raw configuration and converts it into [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Curve`] for an unknown preset or an invalid
    /// custom curve, and [`ConfigError::Invalid`] for out-of-range numbers
    /// or unknown device type names.
    pub fn to_settings(&self) -> Result<Settings, ConfigError> {
        let cf = &self.corner_fix;
        require(cf.hit_box_extension_px >= 0.0, "corner_fix.hit_box_extension_px", cf.hit_box_extension_px)?;
        require(cf.precision_px >= 0.0, "corner_fix.precision_px", cf.precision_px)?;
        require(
            cf.system_corner_radius_px >= 0.0,
            "corner_fix.system_corner_radius_px",
            cf.system_corner_radius_px,
        )?;
        require(
            cf.corner_size_multiplier > 0.0,
            "corner_fix.corner_size_multiplier",
            cf.corner_size_multiplier,
        )?;

        let snap = &self.snap;
        require(snap.threshold_px > 0.0, "snap.threshold_px", snap.threshold_px)?;
        require(snap.drag_threshold_px >= 0.0, "snap.drag_threshold_px", snap.drag_threshold_px)?;

        let accel = &self.acceleration;
        require(accel.min_velocity >= 0.0, "acceleration.min_velocity", accel.min_velocity)?;
        require(
            accel.max_velocity > accel.min_velocity,
            "acceleration.max_velocity",
            accel.max_velocity,
        )?;
        let curve = accel.curve.to_curve()?;

        let per_type = self
            .scroll
            .types
            .iter()
            .map(|(name, dir)| Ok((parse_device_type(name)?, *dir)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        let per_device = self
            .scroll
            .devices
            .iter()
            .map(|(id, dir)| (DeviceId::from(id.as_str()), *dir))
            .collect();
        let device_overrides = self
            .devices
            .type_overrides
            .iter()
            .map(|(id, ty)| (DeviceId::from(id.as_str()), *ty))
            .collect();

        Ok(Settings {
            corner_fix: CornerFixSettings {
                enabled: cf.enabled,
                hit_test: HitTestConfig {
                    hit_box_px: cf.hit_box_extension_px,
                    system_corner_radius_px: cf.system_corner_radius_px,
                    corner_size_multiplier: cf.corner_size_multiplier,
                    precision_px: cf.precision_px,
                },
            },
            snap: SnapSettings {
                enabled: snap.enabled,
                threshold_px: snap.threshold_px,
                drag_threshold_px: snap.drag_threshold_px,
            },
            acceleration: AccelerationSettings {
                enabled: accel.enabled,
                mapper: VelocityMapper::new(curve, accel.min_velocity, accel.max_velocity),
            },
            scroll: ScrollSettings { per_type, per_device },
            device_overrides,
            runtime: RuntimeSettings {
                geometry_cache_ttl: Duration::from_millis(self.runtime.geometry_cache_ttl_ms),
                tap_reenable_delay: Duration::from_millis(self.runtime.tap_reenable_delay_ms),
            },
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, or from the default location when `path`
/// is `None`. A missing file yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Renders the default configuration as TOML text.
pub fn default_config_toml() -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(&AppConfig::default())?)
}

/// Persists `config` to `path` (or the default location), creating the
/// directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Tapwise"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tapwise"))
    }
}
