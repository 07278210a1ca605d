//! Run lifecycle tracking.
//!
//! Holds the scheduler's in-memory run handle, pushes every status
//! transition through the caller-supplied updater (the external
//! persistence hook), and fires registered inactive callbacks exactly
//! once when the run reaches a terminal state — the single hook other
//! components rely on for cleanup.

use std::sync::Mutex;

use tracing::{info, warn};

use rig_core::{RunId, RunStatus, TestRun};
use rig_registry::{AbortHandle, AbortSignal, abort_pair};

/// Invoked with the full run record on every status transition.
pub type RunUpdater = std::sync::Arc<dyn Fn(&TestRun) + Send + Sync>;

/// Invoked exactly once, after the run reaches a terminal state.
pub type InactiveCallback = Box<dyn FnOnce(&TestRun) + Send>;

/// Tracks one run's status from admission to its terminal transition.
pub struct RunLifecycle {
    run: Mutex<TestRun>,
    updater: RunUpdater,
    abort: AbortHandle,
    /// Drained on the terminal transition; `None` afterwards so late
    /// registrations fire immediately.
    inactive: Mutex<Option<Vec<InactiveCallback>>>,
}

impl RunLifecycle {
    pub fn new(run: TestRun, updater: RunUpdater) -> Self {
        let (abort, _) = abort_pair();
        Self {
            run: Mutex::new(run),
            updater,
            abort,
            inactive: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run.lock().unwrap().id
    }

    pub fn status(&self) -> RunStatus {
        self.run.lock().unwrap().status
    }

    /// A copy of the current run record.
    pub fn snapshot(&self) -> TestRun {
        self.run.lock().unwrap().clone()
    }

    /// Request a cooperative abort of this run.
    pub fn abort(&self) {
        info!(run = %self.run_id(), "abort requested");
        self.abort.abort();
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.signal()
    }

    /// Transition to a non-terminal status and report it to the updater.
    ///
    /// Ignored once the run is terminal; the terminal transition is
    /// final.
    pub fn set_status(&self, status: RunStatus) {
        debug_assert!(!status.is_terminal(), "terminal transitions go through finalize");
        let snapshot = {
            let mut run = self.run.lock().unwrap();
            if run.status.is_terminal() {
                return;
            }
            run.status = status;
            if status == RunStatus::Running && run.started_at.is_none() {
                run.started_at = Some(epoch_secs());
            }
            run.clone()
        };
        (self.updater)(&snapshot);
    }

    /// Perform the terminal transition and fire the inactive callbacks.
    ///
    /// Idempotent: only the first call transitions the run and notifies;
    /// later calls are no-ops. This is what guarantees release-of-
    /// resources happens exactly once per run, on every exit path.
    pub fn finalize(&self, status: RunStatus, reason: Option<String>) {
        debug_assert!(status.is_terminal());
        let snapshot = {
            let mut run = self.run.lock().unwrap();
            if run.status.is_terminal() {
                warn!(
                    run = %run.id,
                    current = ?run.status,
                    attempted = ?status,
                    "duplicate terminal transition ignored"
                );
                return;
            }
            run.status = status;
            run.finished_at = Some(epoch_secs());
            if run.failure_reason.is_none() {
                run.failure_reason = reason;
            }
            run.clone()
        };
        (self.updater)(&snapshot);

        // Callbacks run outside the run lock; they may take snapshots.
        let callbacks = self.inactive.lock().unwrap().take().unwrap_or_default();
        info!(
            run = %snapshot.id,
            status = ?snapshot.status,
            callbacks = callbacks.len(),
            "run inactive"
        );
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    /// Register a callback for the terminal transition.
    ///
    /// If the run is already terminal the callback fires immediately.
    pub fn add_inactive_callback(&self, callback: InactiveCallback) {
        let mut inactive = self.inactive.lock().unwrap();
        match inactive.as_mut() {
            Some(callbacks) => callbacks.push(callback),
            None => {
                drop(inactive);
                callback(&self.snapshot());
            }
        }
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
