//! The admission queue.
//!
//! `take` is the single blocking point of the admission path: it loops
//! over candidates (ready deferred runs first, then the pending queue),
//! computes each one's requirement set, and gates admission on the
//! reservation ledger. A refused run is deferred for a cooldown rather
//! than retried immediately, so resource-starved runs neither busy-loop
//! nor starve later submissions with disjoint requirements.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use rig_core::{ResourceRequirement, TestRun};
use rig_reserve::ReservationLedger;

/// Tunables for admission retry. The cooldown and poll interval are
/// policy choices; tests set them explicitly.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a refused run waits before its next admission attempt.
    pub cooldown: Duration,
    /// Sleep between polls while the pending queue is empty.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Computes a run's resource requirement set. Pure per run+definition;
/// called once per admission attempt.
pub type Requirements = Arc<dyn Fn(&TestRun) -> Vec<ResourceRequirement> + Send + Sync>;

/// Admission predicate: runs it rejects are deferred, not admitted
/// (e.g. runs whose owner is paused).
pub type AdmissionPredicate = Arc<dyn Fn(&TestRun) -> bool + Send + Sync>;

struct Deferred {
    ready_at: Instant,
    run: TestRun,
}

/// A run admitted by [`RunQueue::take`].
///
/// Receiving this grants exclusive custody of the run and of the
/// reservation recorded in `requirements` (the exact set acquired, to be
/// released verbatim on completion). `requeue` pushes the run back for
/// another admission attempt after the cooldown.
pub struct AdmittedRun {
    pub run: TestRun,
    pub requirements: Vec<ResourceRequirement>,
    pub requeue: RequeueHandle,
}

/// Re-enqueues a run through the deferral path.
#[derive(Clone)]
pub struct RequeueHandle {
    deferred: Arc<Mutex<VecDeque<Deferred>>>,
    cooldown: Duration,
}

impl RequeueHandle {
    /// Push `run` back for another admission attempt after the cooldown.
    pub fn requeue(&self, run: TestRun) {
        info!(run = %run.id, test = %run.test_name, "run requeued");
        self.deferred.lock().unwrap().push_back(Deferred {
            ready_at: Instant::now() + self.cooldown,
            run,
        });
    }
}

/// The admission queue: a pending queue behind a reservation gate.
pub struct RunQueue {
    pending: Arc<dyn crate::PendingQueue>,
    ledger: Arc<ReservationLedger>,
    requirements: Requirements,
    predicate: AdmissionPredicate,
    config: QueueConfig,
    /// Runs waiting out a cooldown before their next attempt.
    deferred: Arc<Mutex<VecDeque<Deferred>>>,
}

impl RunQueue {
    pub fn new(
        pending: Arc<dyn crate::PendingQueue>,
        ledger: Arc<ReservationLedger>,
        requirements: Requirements,
        config: QueueConfig,
    ) -> Self {
        Self {
            pending,
            ledger,
            requirements,
            predicate: Arc::new(|_| true),
            config,
            deferred: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Install an admission predicate.
    pub fn with_predicate(mut self, predicate: AdmissionPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Block until a run is available AND admittable, then return it.
    ///
    /// The sole suspension points are the empty-queue poll sleep and the
    /// deferred-cooldown sleep; the reservation decision itself never
    /// holds a lock across an await.
    pub async fn take(&self) -> AdmittedRun {
        loop {
            let Some(run) = self.next_candidate() else {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            };

            if !(self.predicate)(&run) {
                debug!(run = %run.id, "run rejected by admission predicate, deferring");
                self.defer(run);
                continue;
            }

            // Requirements are computed once per admission attempt and
            // stay fixed for this decision.
            let requirements = (self.requirements)(&run);
            if self.ledger.try_acquire(run.id, &requirements) {
                info!(
                    run = %run.id,
                    test = %run.test_name,
                    pools = requirements.len(),
                    "run admitted"
                );
                return AdmittedRun {
                    run,
                    requirements,
                    requeue: self.requeue_handle(),
                };
            }

            debug!(
                run = %run.id,
                test = %run.test_name,
                cooldown = ?self.config.cooldown,
                "resources busy, run deferred"
            );
            self.defer(run);
        }
    }

    /// A handle that re-enqueues runs through this queue's deferral path.
    pub fn requeue_handle(&self) -> RequeueHandle {
        RequeueHandle {
            deferred: self.deferred.clone(),
            cooldown: self.config.cooldown,
        }
    }

    /// Runs currently waiting out a cooldown.
    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().unwrap().len()
    }

    /// Next candidate: the earliest ready deferred run, else the head of
    /// the pending queue. Deferred runs keep their relative order.
    fn next_candidate(&self) -> Option<TestRun> {
        {
            let mut deferred = self.deferred.lock().unwrap();
            let now = Instant::now();
            if let Some(pos) = deferred.iter().position(|d| d.ready_at <= now) {
                return deferred.remove(pos).map(|d| d.run);
            }
        }

        match self.pending.poll() {
            Ok(run) => run,
            Err(e) => {
                // A broken pending store must not kill the admission
                // loop; surface it and keep polling.
                warn!(error = %e, "pending queue poll failed");
                None
            }
        }
    }

    fn defer(&self, run: TestRun) {
        self.deferred.lock().unwrap().push_back(Deferred {
            ready_at: Instant::now() + self.config.cooldown,
            run,
        });
    }
}
