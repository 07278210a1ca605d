//! Run records, statuses, and resource requirement types.
//!
//! These types represent the scheduler's view of a test run: identity,
//! ownership, declared resource needs, and lifecycle status. Run records
//! are serializable to/from JSON for storage in the run store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definition::TestDefinition;

/// Unique identifier for a test run.
pub type RunId = Uuid;

/// Lifecycle status of a test run.
///
/// `Waiting` and `Reserving` are pre-execution; `Running` is active;
/// the remaining four are terminal and mutually exclusive. Exactly one
/// terminal transition occurs per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Queued, not yet considered for admission.
    Waiting,
    /// Admission in progress: resources are being reserved.
    Reserving,
    /// Phases are executing.
    Running,
    /// All phases completed and all checks passed.
    Passed,
    /// A phase operation reported a genuine test failure.
    Failed,
    /// Cancelled by an abort request; teardown still ran.
    Aborted,
    /// A tooling or infrastructure fault, not a test outcome.
    Error,
}

impl RunStatus {
    /// True for the four final states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Aborted | RunStatus::Error
        )
    }

    /// True while the run occupies resources (admitted but not finished).
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Reserving | RunStatus::Running)
    }
}

/// Identity of a resource pool: a provider plus a pool name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolName {
    /// Infrastructure provider the pool belongs to (e.g. "openstack").
    pub provider: String,
    /// Pool name within the provider (e.g. "perf-large").
    pub name: String,
}

impl PoolName {
    pub fn new(provider: &str, name: &str) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for PoolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.name)
    }
}

/// A declared need for capacity from a named resource pool.
///
/// A run's requirement set is computed once per admission attempt and is
/// stable within one admission decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub pool: PoolName,
    /// Units of pool capacity needed (node count for machine pools).
    pub count: u32,
}

impl ResourceRequirement {
    pub fn new(provider: &str, pool: &str, count: u32) -> Self {
        Self {
            pool: PoolName::new(provider, pool),
            count,
        }
    }
}

/// One scheduled execution instance of a test definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: RunId,
    /// Email of the submitting user.
    pub owner: String,
    /// Name of the test this run was created from.
    pub test_name: String,
    /// The definition snapshot this run executes.
    pub definition: TestDefinition,
    pub status: RunStatus,
    /// Times this run was requeued after an infrastructure fault.
    pub requeues: u32,
    /// Unix timestamp (seconds) when the run was submitted.
    pub created_at: u64,
    /// Unix timestamp when the run entered `Running`, if it did.
    pub started_at: Option<u64>,
    /// Unix timestamp when the run reached a terminal state.
    pub finished_at: Option<u64>,
    /// Human-readable reason for Failed/Aborted/Error, if any.
    pub failure_reason: Option<String>,
}

impl TestRun {
    /// Create a new waiting run from a definition snapshot.
    pub fn new(owner: &str, definition: TestDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            test_name: definition.name.clone(),
            definition,
            status: RunStatus::Waiting,
            requeues: 0,
            created_at: epoch_secs(),
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    /// The requirement set declared by this run's definition.
    pub fn declared_requirements(&self) -> Vec<ResourceRequirement> {
        self.definition.requirements()
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
