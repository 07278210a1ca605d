//! The scheduler driver — the top-level admission loop.
//!
//! Repeatedly takes admitted runs from the admission queue, assembles
//! their executables, and launches executors. The inactive callback it
//! registers on every launched run is what ties the loop together:
//! persist-final-state happens through the updater, the reservation
//! ledger entries are released, and the next `take` sees the freed
//! resources. No single run's failure, of any kind, terminates the loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{error, info, warn};

use rig_core::{RunId, RunStatus, TestRun, UserCredentials};
use rig_queue::{AdmittedRun, RunQueue};
use rig_registry::ComponentRegistry;
use rig_reserve::ReservationLedger;

use crate::active::assemble;
use crate::executor::{ExecutorFactory, RunExecutor, TaskExecutorFactory};
use crate::lifecycle::{RunLifecycle, RunUpdater};

/// Resolves a run's user credentials at admission time.
pub type CredentialsResolver = Arc<dyn Fn(&TestRun) -> UserCredentials + Send + Sync>;

/// Driver policy knobs. The requeue bound is a policy choice; tests set
/// it explicitly.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Admission attempts granted to a run whose executor creation
    /// keeps failing, before it is marked `Error`.
    pub max_requeues: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_requeues: 3 }
    }
}

/// Per-run state held while the run is active.
struct ActiveSlot {
    lifecycle: Arc<RunLifecycle>,
    /// Owns the execution task handle; dropped when the slot is removed.
    _executor: RunExecutor,
}

/// The scheduler driver.
pub struct Scheduler {
    queue: Arc<RunQueue>,
    ledger: Arc<ReservationLedger>,
    registry: Arc<ComponentRegistry>,
    updater: RunUpdater,
    credentials: CredentialsResolver,
    factory: Arc<dyn ExecutorFactory>,
    config: SchedulerConfig,
    /// Active runs: run id → slot. Entries remove themselves via the
    /// inactive callback.
    active: Arc<Mutex<HashMap<RunId, ActiveSlot>>>,
}

impl Scheduler {
    pub fn new(
        queue: Arc<RunQueue>,
        ledger: Arc<ReservationLedger>,
        registry: Arc<ComponentRegistry>,
        updater: RunUpdater,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            ledger,
            registry,
            updater,
            credentials: Arc::new(|run: &TestRun| UserCredentials::for_owner(&run.owner)),
            factory: Arc::new(TaskExecutorFactory),
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Install a credentials resolver.
    pub fn with_credentials_resolver(mut self, resolver: CredentialsResolver) -> Self {
        self.credentials = resolver;
        self
    }

    /// Install an executor factory (the default spawns a task per run).
    pub fn with_executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// The admission loop. Returns when `shutdown` flips; running
    /// executors keep their own tasks and finish independently.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler admission loop started");
        loop {
            tokio::select! {
                admitted = self.queue.take() => self.launch(admitted),
                _ = shutdown.changed() => {
                    info!(active = self.active_runs().len(), "scheduler admission loop stopping");
                    break;
                }
            }
        }
    }

    /// Ids of currently active runs.
    pub fn active_runs(&self) -> Vec<RunId> {
        self.active.lock().unwrap().keys().copied().collect()
    }

    /// Route an abort request to an active run. Returns false when the
    /// run is not active (never admitted here, or already inactive).
    pub fn abort(&self, run_id: RunId) -> bool {
        let active = self.active.lock().unwrap();
        match active.get(&run_id) {
            Some(slot) => {
                slot.lifecycle.abort();
                true
            }
            None => false,
        }
    }

    /// Request a cooperative abort of every active run.
    pub fn abort_all(&self) {
        let active = self.active.lock().unwrap();
        for slot in active.values() {
            slot.lifecycle.abort();
        }
    }

    /// Take one admitted run through build → executor launch.
    fn launch(&self, admitted: AdmittedRun) {
        let AdmittedRun {
            run,
            requirements,
            requeue,
        } = admitted;

        let lifecycle = Arc::new(RunLifecycle::new(run.clone(), self.updater.clone()));
        lifecycle.set_status(RunStatus::Reserving);

        // Configuration error: fatal to this run alone, never executed.
        let executable = match assemble(&run, &self.registry) {
            Ok(executable) => executable,
            Err(e) => {
                warn!(run = %run.id, test = %run.test_name, error = %e, "run failed to assemble");
                self.ledger.release(run.id, &requirements);
                lifecycle.finalize(RunStatus::Failed, Some(e.to_string()));
                return;
            }
        };

        let credentials = (self.credentials)(&run);

        // Registered before launch so every exit path out of execution
        // releases the reservation exactly once and frees the slot.
        {
            let ledger = self.ledger.clone();
            let reserved = requirements.clone();
            let active = self.active.clone();
            lifecycle.add_inactive_callback(Box::new(move |finished: &TestRun| {
                ledger.release(finished.id, &reserved);
                active.lock().unwrap().remove(&finished.id);
            }));
        }

        match self.factory.create(executable, lifecycle.clone(), credentials) {
            Ok(executor) => {
                // Holding the map lock makes insertion atomic with the
                // inactive callback's removal: a run that finishes this
                // quickly is already terminal here and is not tracked.
                let mut active = self.active.lock().unwrap();
                if !lifecycle.status().is_terminal() {
                    active.insert(
                        run.id,
                        ActiveSlot {
                            lifecycle,
                            _executor: executor,
                        },
                    );
                }
                info!(run = %run.id, test = %run.test_name, "run launched");
            }
            Err(e) => {
                // Infrastructure fault: the run itself is fine. Free the
                // reservation and retry admission, within the bound.
                self.ledger.release(run.id, &requirements);
                if run.requeues >= self.config.max_requeues {
                    error!(
                        run = %run.id,
                        error = %e,
                        attempts = run.requeues,
                        "requeue budget exhausted"
                    );
                    lifecycle.finalize(
                        RunStatus::Error,
                        Some(format!("{e} (after {} requeues)", run.requeues)),
                    );
                } else {
                    warn!(
                        run = %run.id,
                        error = %e,
                        attempt = run.requeues + 1,
                        "executor creation failed, requeueing run"
                    );
                    let mut retry = run;
                    retry.requeues += 1;
                    retry.status = RunStatus::Waiting;
                    (self.updater)(&retry);
                    requeue.requeue(retry);
                }
            }
        }
    }
}
