//! Event transform pipelines.
//!
//! Each feature is a [`Transform`]: a [`TapCallback`] that also knows its
//! minimal event mask. A [`Pipeline`] binds one transform to one tap on the
//! [`TapManager`] and owns that tap's lifetime.
//!
//! | Feature      | Events                                         |
//! |--------------|------------------------------------------------|
//! | acceleration | mouse moved, left/right/other dragged          |
//! | scroll       | scroll wheel                                   |
//! | corner fix   | mouse moved, left mouse down                   |
//! | snap         | left mouse down, left mouse dragged, left up   |

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tapwise_core::EventMask;
use tracing::debug;

use super::tap_manager::{TapCallback, TapError, TapId, TapManager, TapSpec};

pub mod acceleration;
pub mod corner_fix;
pub mod scroll;
pub mod snap;

pub use acceleration::AccelerationTransform;
pub use corner_fix::CornerFixTransform;
pub use scroll::{ScrollPreference, ScrollTransform};
pub use snap::SnapTransform;

/// User-visible features, one per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Acceleration,
    Scroll,
    CornerFix,
    Snap,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Acceleration,
        Feature::Scroll,
        Feature::CornerFix,
        Feature::Snap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Acceleration => "acceleration",
            Feature::Scroll => "scroll",
            Feature::CornerFix => "corner-fix",
            Feature::Snap => "snap",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature's event handler.
pub trait Transform: TapCallback {
    fn feature(&self) -> Feature;

    /// The smallest set of event types this transform needs.
    fn event_mask(&self) -> EventMask;
}

/// Start/stop controller binding one transform to one tap.
pub struct Pipeline<T: Transform + 'static> {
    taps: TapManager,
    transform: Arc<T>,
    tap: Mutex<Option<TapId>>,
}

impl<T: Transform + 'static> Pipeline<T> {
    pub fn new(taps: TapManager, transform: Arc<T>) -> Self {
        Self {
            taps,
            transform,
            tap: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<TapId>> {
        self.tap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the tap. A no-op when already running.
    ///
    /// # Errors
    ///
    /// Whatever [`TapManager::create_tap`] reports.
    pub fn start(&self) -> Result<(), TapError> {
        if self.slot().is_some() {
            return Ok(());
        }
        let feature = self.transform.feature();
        let spec = TapSpec::new(feature.name(), self.transform.event_mask());
        let callback: Arc<dyn TapCallback> = Arc::clone(&self.transform) as Arc<dyn TapCallback>;
        let id = self.taps.create_tap(spec, callback)?;
        *self.slot() = Some(id);
        debug!(feature = %feature, tap = %id, "pipeline started");
        Ok(())
    }

    /// Removes the tap. Returns `false` when it was not running.
    pub fn stop(&self) -> bool {
        let Some(id) = self.slot().take() else {
            return false;
        };
        self.taps.remove_tap(id);
        debug!(feature = %self.transform.feature(), tap = %id, "pipeline stopped");
        true
    }

    /// `true` while the pipeline holds a tap, whether or not the OS has
    /// temporarily disabled it.
    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    pub fn tap_id(&self) -> Option<TapId> {
        *self.slot()
    }

    pub fn transform(&self) -> &Arc<T> {
        &self.transform
    }

    pub fn feature(&self) -> Feature {
        self.transform.feature()
    }
}

impl<T: Transform + 'static> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
