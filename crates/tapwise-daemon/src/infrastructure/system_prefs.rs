//! The system "natural scrolling" preference.
//!
//! macOS stores it as `com.apple.swipescrolldirection` in the global
//! preferences domain. It is read on the scroll path, so the value is cached
//! for [`PREFERENCE_TTL`] and re-read lazily after that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::application::pipelines::ScrollPreference;
use crate::application::window_geometry::Clock;

pub const PREFERENCE_TTL: Duration = Duration::from_secs(1);

type Reader = Box<dyn Fn() -> bool + Send + Sync>;

/// Wraps a preference reader with a time-based cache.
pub struct CachedScrollPreference {
    read: Reader,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, bool)>>,
}

impl CachedScrollPreference {
    pub fn new<F>(read: F, clock: Arc<dyn Clock>, ttl: Duration) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            read: Box::new(read),
            clock,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

impl ScrollPreference for CachedScrollPreference {
    fn natural_scrolling(&self) -> bool {
        let now = self.clock.now();
        if let Some((read_at, value)) = *self.cached.lock().unwrap_or_else(PoisonError::into_inner) {
            if now.duration_since(read_at) < self.ttl {
                return value;
            }
        }
        let value = (self.read)();
        let previous = self
            .cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((now, value));
        if previous.is_some_and(|(_, old)| old != value) {
            debug!(natural = value, "system scroll direction changed");
        }
        value
    }
}

/// A preference with a fixed, adjustable answer.
#[derive(Debug)]
pub struct FixedScrollPreference(AtomicBool);

impl FixedScrollPreference {
    pub fn new(natural: bool) -> Self {
        Self(AtomicBool::new(natural))
    }

    pub fn set(&self, natural: bool) {
        self.0.store(natural, Ordering::SeqCst);
    }
}

impl ScrollPreference for FixedScrollPreference {
    fn natural_scrolling(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(target_os = "macos")]
pub use macos::{read_natural_scrolling, system_scroll_preference};

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::Arc;

    use core_foundation::base::{CFType, CFTypeRef, TCFType};
    use core_foundation::boolean::CFBoolean;
    use core_foundation::number::CFNumber;
    use core_foundation::string::{CFString, CFStringRef};

    use super::{CachedScrollPreference, PREFERENCE_TTL};
    use crate::application::window_geometry::SystemClock;

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        static kCFPreferencesAnyApplication: CFStringRef;
        fn CFPreferencesAppSynchronize(application_id: CFStringRef) -> bool;
        fn CFPreferencesCopyAppValue(key: CFStringRef, application_id: CFStringRef) -> CFTypeRef;
    }

    /// Reads `com.apple.swipescrolldirection`. An unset key means natural
    /// scrolling, the system default.
    pub fn read_natural_scrolling() -> bool {
        let key = CFString::from_static_string("com.apple.swipescrolldirection");
        let raw = unsafe {
            CFPreferencesAppSynchronize(kCFPreferencesAnyApplication);
            CFPreferencesCopyAppValue(key.as_concrete_TypeRef(), kCFPreferencesAnyApplication)
        };
        if raw.is_null() {
            return true;
        }
        let value = unsafe { CFType::wrap_under_create_rule(raw) };
        if let Some(flag) = value.downcast::<CFBoolean>() {
            return bool::from(flag);
        }
        if let Some(number) = value.downcast::<CFNumber>() {
            return number.to_i64().map_or(true, |n| n != 0);
        }
        true
    }

    pub fn system_scroll_preference() -> CachedScrollPreference {
        CachedScrollPreference::new(read_natural_scrolling, Arc::new(SystemClock), PREFERENCE_TTL)
    }
}
