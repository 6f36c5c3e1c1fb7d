//! [`Scheduler`] implementations.
//!
//! - [`TokioScheduler`] sleeps on the daemon's Tokio runtime and then runs
//!   the task on the blocking pool, since deferred work (Accessibility calls,
//!   `CGEventTapEnable`) is synchronous.
//! - [`ManualScheduler`] keeps a virtual clock and runs tasks only when a test
//!   calls [`ManualScheduler::advance`].

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{trace, warn};

use crate::application::scheduler::{Scheduler, Task};

/// Production scheduler backed by a Tokio runtime handle.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        trace!(?delay, "scheduling deferred task");
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = tokio::task::spawn_blocking(task).await {
                if err.is_panic() {
                    warn!(%err, "deferred task panicked");
                } else {
                    trace!(%err, "deferred task cancelled");
                }
            }
        });
    }
}

struct PendingTask {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    pending: Vec<PendingTask>,
}

/// Deterministic scheduler for tests.
///
/// Nothing runs on its own. [`advance`](Self::advance) moves the virtual
/// clock forward and runs every task that has become due, in due order and
/// then in scheduling order. Tasks scheduled by a running task are picked up
/// in the same call if they are already due.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the clock forward by `by` and runs what is due. Returns the
    /// number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let now = {
            let mut state = self.state();
            state.now += by;
            state.now
        };

        let mut ran = 0;
        while let Some(task) = self.take_next_due(now) {
            task();
            ran += 1;
        }
        ran
    }

    /// Runs tasks that are already due without moving the clock.
    pub fn run_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    /// Delays of every pending task relative to the current virtual time.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let state = self.state();
        let mut delays: Vec<Duration> = state
            .pending
            .iter()
            .map(|p| p.due.saturating_sub(state.now))
            .collect();
        delays.sort();
        delays
    }

    fn take_next_due(&self, now: Duration) -> Option<Task> {
        let mut state = self.state();
        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        Some(state.pending.remove(index).task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let mut state = self.state();
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingTask { due, seq, task });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
