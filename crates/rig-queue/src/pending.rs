//! The pending-run FIFO.

use std::collections::VecDeque;
use std::sync::Mutex;

use rig_core::TestRun;

/// FIFO store of submitted-but-not-started runs.
///
/// Implementations are expected to preserve enqueue order. The durable
/// implementation (rig-state) survives process restart for runs that
/// were already pending.
pub trait PendingQueue: Send + Sync {
    fn push(&self, run: TestRun) -> anyhow::Result<()>;
    fn poll(&self) -> anyhow::Result<Option<TestRun>>;
}

/// In-memory pending queue for tests and ephemeral setups.
#[derive(Default)]
pub struct InMemoryPendingQueue {
    runs: Mutex<VecDeque<TestRun>>,
}

impl InMemoryPendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PendingQueue for InMemoryPendingQueue {
    fn push(&self, run: TestRun) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push_back(run);
        Ok(())
    }

    fn poll(&self) -> anyhow::Result<Option<TestRun>> {
        Ok(self.runs.lock().unwrap().pop_front())
    }
}
