//! Accessibility trust checks.
//!
//! Event taps that modify events, and every Accessibility window move,
//! require the process to be trusted in System Settings → Privacy & Security
//! → Accessibility.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::application::tap_manager::PermissionChecker;

/// A checker with a fixed answer that can be flipped at runtime.
///
/// Used by tests and on hosts without an Accessibility API.
#[derive(Debug)]
pub struct StaticPermissionChecker {
    trusted: AtomicBool,
}

impl StaticPermissionChecker {
    pub fn granted() -> Self {
        Self {
            trusted: AtomicBool::new(true),
        }
    }

    pub fn denied() -> Self {
        Self {
            trusted: AtomicBool::new(false),
        }
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }
}

impl PermissionChecker for StaticPermissionChecker {
    fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }
}

#[cfg(target_os = "macos")]
pub use macos::AccessibilityPermissions;

#[cfg(target_os = "macos")]
mod macos {
    use core_foundation::base::TCFType;
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::string::{CFString, CFStringRef};
    use tracing::info;

    use crate::application::tap_manager::PermissionChecker;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
        fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
        static kAXTrustedCheckOptionPrompt: CFStringRef;
    }

    /// Asks the Accessibility API whether this process is trusted.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct AccessibilityPermissions;

    impl AccessibilityPermissions {
        pub fn new() -> Self {
            Self
        }

        /// Shows the system prompt that sends the user to the Accessibility
        /// pane, and returns the current trust state. The grant itself
        /// happens asynchronously in System Settings.
        pub fn request_access(&self) -> bool {
            let key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
            let options = CFDictionary::from_CFType_pairs(&[(key, CFBoolean::true_value())]);
            let trusted = unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) };
            info!(trusted, "accessibility permission requested");
            trusted
        }
    }

    impl PermissionChecker for AccessibilityPermissions {
        fn is_trusted(&self) -> bool {
            unsafe { AXIsProcessTrusted() }
        }
    }
}
