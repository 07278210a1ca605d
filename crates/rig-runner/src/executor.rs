//! Run execution.
//!
//! Each admitted run executes on its own dedicated task: phases in
//! declared order, operations within a phase concurrently. The phase
//! sequence runs in a child task so that a panicking component cannot
//! skip teardown or the terminal transition; the parent task always
//! finishes with exactly one `finalize` call on the lifecycle.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use rig_core::{RunId, RunStatus, UserCredentials};
use rig_registry::{AbortSignal, ComponentError, FaultKind, OpContext, abort_pair};

use crate::active::{ExecPhase, ExecutableRun};
use crate::error::ExecutorError;
use crate::lifecycle::RunLifecycle;

/// Result of a phase (or of the whole phase sequence).
enum PhaseOutcome {
    Passed,
    /// A genuine test failure.
    Failed(String),
    /// A tooling fault.
    Fault(String),
}

impl PhaseOutcome {
    fn passed(&self) -> bool {
        matches!(self, PhaseOutcome::Passed)
    }
}

/// Creates executors for admitted runs.
///
/// The seam exists so executor-creation faults (an infrastructure
/// problem, not a property of the run) can be injected and handled by
/// the scheduler's bounded-requeue policy.
pub trait ExecutorFactory: Send + Sync {
    fn create(
        &self,
        executable: ExecutableRun,
        lifecycle: Arc<RunLifecycle>,
        credentials: UserCredentials,
    ) -> Result<RunExecutor, ExecutorError>;
}

/// Default factory: one spawned task per run.
#[derive(Default)]
pub struct TaskExecutorFactory;

impl ExecutorFactory for TaskExecutorFactory {
    fn create(
        &self,
        executable: ExecutableRun,
        lifecycle: Arc<RunLifecycle>,
        credentials: UserCredentials,
    ) -> Result<RunExecutor, ExecutorError> {
        Ok(RunExecutor::spawn(executable, lifecycle, credentials))
    }
}

/// Executes one admitted run to its terminal state.
pub struct RunExecutor {
    lifecycle: Arc<RunLifecycle>,
    handle: JoinHandle<()>,
}

impl RunExecutor {
    /// Launch execution. The run transitions to `Running` immediately.
    pub fn spawn(
        executable: ExecutableRun,
        lifecycle: Arc<RunLifecycle>,
        credentials: UserCredentials,
    ) -> Self {
        lifecycle.set_status(RunStatus::Running);
        info!(
            run = %executable.run_id,
            test = %executable.test_name,
            phases = executable.phases.len(),
            "run executing"
        );

        let task_lifecycle = lifecycle.clone();
        let abort = lifecycle.abort_signal();
        let handle = tokio::spawn(async move {
            execute(executable, task_lifecycle, credentials, abort).await;
        });

        Self { lifecycle, handle }
    }

    pub fn lifecycle(&self) -> &Arc<RunLifecycle> {
        &self.lifecycle
    }

    /// Request a cooperative abort.
    pub fn abort(&self) {
        self.lifecycle.abort();
    }

    /// Wait for execution to finish (terminal state reached).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Drive the run to a terminal state. Exactly one `finalize` happens on
/// every path out of this function.
async fn execute(
    executable: ExecutableRun,
    lifecycle: Arc<RunLifecycle>,
    credentials: UserCredentials,
    abort: AbortSignal,
) {
    let ExecutableRun {
        run_id,
        test_name,
        phases,
        teardown,
    } = executable;

    // Child task: a panic in here surfaces as a JoinError instead of
    // tearing down this task before teardown and finalization.
    let phase_credentials = credentials.clone();
    let phase_abort = abort.clone();
    let sequence = tokio::spawn(async move {
        run_phase_sequence(run_id, phases, phase_credentials, phase_abort).await
    });

    let mut outcome = match sequence.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(run = %run_id, error = %join_err, "phase execution panicked");
            PhaseOutcome::Fault(format!("phase execution panicked: {join_err}"))
        }
    };

    // Teardown is attempted on every exit path. It gets a fresh, never-
    // aborted signal so an abort cannot cut cleanup short.
    if let Some(teardown) = teardown {
        let (_guard, teardown_abort) = abort_pair();
        let teardown_credentials = credentials.clone();
        let teardown_task = tokio::spawn(async move {
            run_phase(run_id, teardown, teardown_credentials, teardown_abort).await
        });
        let teardown_outcome = match teardown_task.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(run = %run_id, error = %join_err, "teardown panicked");
                PhaseOutcome::Fault(format!("teardown panicked: {join_err}"))
            }
        };
        match teardown_outcome {
            PhaseOutcome::Passed => {}
            trouble => {
                let reason = match &trouble {
                    PhaseOutcome::Failed(r) | PhaseOutcome::Fault(r) => r.clone(),
                    PhaseOutcome::Passed => unreachable!(),
                };
                warn!(run = %run_id, %reason, "teardown did not complete cleanly");
                // Teardown trouble only decides the run when the phases
                // themselves were clean.
                if outcome.passed() {
                    outcome = trouble;
                }
            }
        }
    }

    let (status, reason) = if abort.is_aborted() {
        (RunStatus::Aborted, Some("abort requested".to_string()))
    } else {
        match outcome {
            PhaseOutcome::Passed => (RunStatus::Passed, None),
            PhaseOutcome::Failed(reason) => (RunStatus::Failed, Some(reason)),
            PhaseOutcome::Fault(reason) => (RunStatus::Error, Some(reason)),
        }
    };
    info!(run = %run_id, test = %test_name, status = ?status, "run finished");
    lifecycle.finalize(status, reason);
}

/// Phases in order; the first non-passing phase stops the sequence.
/// The abort flag is checked between phases.
async fn run_phase_sequence(
    run_id: RunId,
    phases: Vec<ExecPhase>,
    credentials: UserCredentials,
    abort: AbortSignal,
) -> PhaseOutcome {
    for phase in phases {
        if abort.is_aborted() {
            info!(run = %run_id, next_phase = %phase.name, "abort observed, unwinding to teardown");
            return PhaseOutcome::Passed;
        }
        let outcome = run_phase(run_id, phase, credentials.clone(), abort.clone()).await;
        if !outcome.passed() {
            return outcome;
        }
    }
    PhaseOutcome::Passed
}

/// One phase: all operations concurrently, joined before the next phase.
///
/// A fault outranks a test failure when both occur in one phase.
async fn run_phase(
    run_id: RunId,
    phase: ExecPhase,
    credentials: UserCredentials,
    abort: AbortSignal,
) -> PhaseOutcome {
    debug!(run = %run_id, phase = %phase.name, operations = phase.operations.len(), "phase starting");

    let mut operations = JoinSet::new();
    for op in phase.operations {
        let ctx = OpContext {
            run_id,
            operation: op.name.clone(),
            properties: op.properties,
            credentials: credentials.clone(),
            abort: abort.clone(),
        };
        operations.spawn(async move {
            let result = op.component.run(ctx).await;
            (op.name, result)
        });
    }

    let mut failure: Option<ComponentError> = None;
    while let Some(joined) = operations.join_next().await {
        match joined {
            Ok((name, Ok(()))) => {
                debug!(run = %run_id, phase = %phase.name, operation = %name, "operation completed");
            }
            Ok((name, Err(e))) => {
                warn!(run = %run_id, phase = %phase.name, operation = %name, error = %e, "operation failed");
                let outranks = failure
                    .as_ref()
                    .is_none_or(|f| e.kind == FaultKind::Fault && f.kind == FaultKind::Outcome);
                if outranks {
                    failure = Some(e);
                }
            }
            Err(join_err) => {
                error!(run = %run_id, phase = %phase.name, error = %join_err, "operation panicked");
                failure = Some(ComponentError::fault(format!(
                    "operation panicked: {join_err}"
                )));
            }
        }
    }

    match failure {
        None => PhaseOutcome::Passed,
        Some(e) => {
            let reason = format!("phase {}: {}", phase.name, e.message);
            match e.kind {
                FaultKind::Outcome => PhaseOutcome::Failed(reason),
                FaultKind::Fault => PhaseOutcome::Fault(reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rig_core::{ComponentKind, RunStatus, TestDefinition, TestRun};
    use rig_registry::{BoxFuture, Component};

    use crate::lifecycle::RunUpdater;

    /// Appends its label to a shared log when run.
    #[derive(Debug)]
    struct Recording {
        label: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Component for Recording {
        fn run(&self, _ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
            let label = self.label.clone();
            let log = self.log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(label);
                Ok(())
            })
        }
    }

    /// Completes only once its barrier is full — proves concurrency.
    #[derive(Debug)]
    struct Rendezvous {
        barrier: Arc<tokio::sync::Barrier>,
    }

    impl Component for Rendezvous {
        fn run(&self, _ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
            let barrier = self.barrier.clone();
            Box::pin(async move {
                barrier.wait().await;
                Ok(())
            })
        }
    }

    /// Blocks until the run is aborted.
    #[derive(Debug)]
    struct BlockUntilAbort;

    impl Component for BlockUntilAbort {
        fn run(&self, ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
            Box::pin(async move {
                let mut abort = ctx.abort.clone();
                abort.aborted().await;
                Ok(())
            })
        }
    }

    #[derive(Debug)]
    struct Failing {
        kind: FaultKind,
    }

    impl Component for Failing {
        fn run(&self, _ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
            let kind = self.kind;
            Box::pin(async move {
                Err(match kind {
                    FaultKind::Outcome => ComponentError::failed("assertion failed"),
                    FaultKind::Fault => ComponentError::fault("tooling broke"),
                })
            })
        }
    }

    #[derive(Debug)]
    struct Panicking;

    impl Component for Panicking {
        fn run(&self, _ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
            Box::pin(async move { panic!("component blew up") })
        }
    }

    fn op(name: &str, component: Box<dyn Component>) -> crate::active::ExecOp {
        crate::active::ExecOp {
            name: name.to_string(),
            kind: ComponentKind::Workload,
            properties: HashMap::new(),
            component,
        }
    }

    fn phase(name: &str, operations: Vec<crate::active::ExecOp>) -> ExecPhase {
        ExecPhase {
            name: name.to_string(),
            operations,
        }
    }

    fn lifecycle_with_counter() -> (Arc<RunLifecycle>, Arc<AtomicUsize>, Arc<Mutex<Vec<RunStatus>>>) {
        let inactive_count = Arc::new(AtomicUsize::new(0));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let updater: RunUpdater = {
            let statuses = statuses.clone();
            Arc::new(move |run: &TestRun| statuses.lock().unwrap().push(run.status))
        };
        let run = TestRun::new("user@example.com", TestDefinition::named("exec-test"));
        let lifecycle = Arc::new(RunLifecycle::new(run, updater));
        {
            let inactive_count = inactive_count.clone();
            lifecycle.add_inactive_callback(Box::new(move |_| {
                inactive_count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        (lifecycle, inactive_count, statuses)
    }

    fn executable(
        run_id: RunId,
        phases: Vec<ExecPhase>,
        teardown: Option<ExecPhase>,
    ) -> ExecutableRun {
        ExecutableRun {
            run_id,
            test_name: "exec-test".to_string(),
            phases,
            teardown,
        }
    }

    #[tokio::test]
    async fn clean_run_passes() {
        let (lifecycle, inactive, statuses) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = vec![phase(
            "load",
            vec![op(
                "record",
                Box::new(Recording {
                    label: "record".into(),
                    log: log.clone(),
                }),
            )],
        )];

        let executor = RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, None),
            lifecycle.clone(),
            UserCredentials::default(),
        );
        executor.join().await;

        assert_eq!(lifecycle.status(), RunStatus::Passed);
        assert_eq!(inactive.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), vec!["record"]);
        assert_eq!(
            *statuses.lock().unwrap(),
            vec![RunStatus::Running, RunStatus::Passed]
        );
    }

    #[tokio::test]
    async fn operations_within_a_phase_run_concurrently() {
        let (lifecycle, _, _) = lifecycle_with_counter();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let phases = vec![phase(
            "load",
            vec![
                op("left", Box::new(Rendezvous { barrier: barrier.clone() })),
                op("right", Box::new(Rendezvous { barrier: barrier.clone() })),
            ],
        )];

        let executor = RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, None),
            lifecycle.clone(),
            UserCredentials::default(),
        );
        // Deadlocks here unless both operations progress concurrently.
        tokio::time::timeout(Duration::from_secs(10), executor.join())
            .await
            .expect("phase operations should rendezvous");
        assert_eq!(lifecycle.status(), RunStatus::Passed);
    }

    #[tokio::test]
    async fn phases_run_sequentially() {
        let (lifecycle, _, _) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let rec = |label: &str| {
            op(
                label,
                Box::new(Recording {
                    label: label.into(),
                    log: log.clone(),
                }),
            )
        };
        let phases = vec![
            phase("provision", vec![rec("provision-op")]),
            phase("load", vec![rec("load-op")]),
            phase("check", vec![rec("check-op")]),
        ];

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, None),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["provision-op", "load-op", "check-op"]
        );
    }

    #[tokio::test]
    async fn failure_stops_sequence_but_teardown_runs() {
        let (lifecycle, inactive, _) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = vec![
            phase("load", vec![op("boom", Box::new(Failing { kind: FaultKind::Outcome }))]),
            phase(
                "never",
                vec![op(
                    "skipped",
                    Box::new(Recording {
                        label: "skipped".into(),
                        log: log.clone(),
                    }),
                )],
            ),
        ];
        let teardown = phase(
            "teardown",
            vec![op(
                "cleanup",
                Box::new(Recording {
                    label: "cleanup".into(),
                    log: log.clone(),
                }),
            )],
        );

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, Some(teardown)),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(lifecycle.status(), RunStatus::Failed);
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
        assert_eq!(inactive.load(Ordering::SeqCst), 1);
        assert!(
            lifecycle
                .snapshot()
                .failure_reason
                .unwrap()
                .contains("assertion failed")
        );
    }

    #[tokio::test]
    async fn fault_marks_run_error() {
        let (lifecycle, _, _) = lifecycle_with_counter();
        let phases = vec![phase(
            "load",
            vec![op("broken", Box::new(Failing { kind: FaultKind::Fault }))],
        )];

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, None),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(lifecycle.status(), RunStatus::Error);
    }

    #[tokio::test]
    async fn fault_outranks_outcome_within_a_phase() {
        let (lifecycle, _, _) = lifecycle_with_counter();
        let phases = vec![phase(
            "load",
            vec![
                op("failed-check", Box::new(Failing { kind: FaultKind::Outcome })),
                op("broken-tool", Box::new(Failing { kind: FaultKind::Fault })),
            ],
        )];

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, None),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(lifecycle.status(), RunStatus::Error);
    }

    #[tokio::test]
    async fn panic_is_contained_and_run_errors() {
        let (lifecycle, inactive, _) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = vec![phase("load", vec![op("kaboom", Box::new(Panicking))])];
        let teardown = phase(
            "teardown",
            vec![op(
                "cleanup",
                Box::new(Recording {
                    label: "cleanup".into(),
                    log: log.clone(),
                }),
            )],
        );

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, Some(teardown)),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(lifecycle.status(), RunStatus::Error);
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
        assert_eq!(inactive.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_mid_phase_unwinds_to_teardown() {
        let (lifecycle, inactive, _) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = vec![
            phase("load", vec![op("stuck", Box::new(BlockUntilAbort))]),
            phase(
                "never",
                vec![op(
                    "skipped",
                    Box::new(Recording {
                        label: "skipped".into(),
                        log: log.clone(),
                    }),
                )],
            ),
        ];
        let teardown = phase(
            "teardown",
            vec![op(
                "cleanup",
                Box::new(Recording {
                    label: "cleanup".into(),
                    log: log.clone(),
                }),
            )],
        );

        let executor = RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, Some(teardown)),
            lifecycle.clone(),
            UserCredentials::default(),
        );

        // Let the blocking operation start, then abort.
        tokio::time::sleep(Duration::from_millis(50)).await;
        executor.abort();
        tokio::time::timeout(Duration::from_secs(10), executor.join())
            .await
            .expect("aborted run should finish");

        assert_eq!(lifecycle.status(), RunStatus::Aborted);
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
        assert_eq!(inactive.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn teardown_failure_on_clean_run_decides_outcome() {
        let (lifecycle, _, _) = lifecycle_with_counter();
        let log = Arc::new(Mutex::new(Vec::new()));
        let phases = vec![phase(
            "load",
            vec![op(
                "record",
                Box::new(Recording {
                    label: "record".into(),
                    log: log.clone(),
                }),
            )],
        )];
        let teardown = phase(
            "teardown",
            vec![op("broken", Box::new(Failing { kind: FaultKind::Fault }))],
        );

        RunExecutor::spawn(
            executable(lifecycle.run_id(), phases, Some(teardown)),
            lifecycle.clone(),
            UserCredentials::default(),
        )
        .join()
        .await;

        assert_eq!(lifecycle.status(), RunStatus::Error);
    }
}
