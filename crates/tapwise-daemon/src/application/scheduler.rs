//! Deferred work dispatch.
//!
//! Tap callbacks must never block, so anything slow (re-enabling a tap the
//! OS switched off, moving a window through the Accessibility API) is handed
//! to a [`Scheduler`] and runs later on another thread.

use std::time::Duration;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay, off the calling thread.
pub trait Scheduler: Send + Sync {
    /// Queues `task` to run once `delay` has elapsed. Must return immediately.
    fn schedule(&self, delay: Duration, task: Task);
}
