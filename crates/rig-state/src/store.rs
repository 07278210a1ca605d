//! RunStore — redb-backed persistence for run records and the pending queue.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use rig_core::{RunId, RunStatus, TestRun};
use rig_queue::PendingQueue;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe run store backed by redb.
///
/// Doubles as the durable pending queue: `pending_push`/`pending_poll`
/// preserve submission order across process restarts, and the
/// [`PendingQueue`] impl also persists the run record on push so the
/// store always reflects every submitted run.
#[derive(Clone)]
pub struct RunStore {
    db: Arc<Database>,
}

impl RunStore {
    /// Open (or create) a persistent run store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "run store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory run store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory run store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.open_table(PENDING).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Run records ────────────────────────────────────────────────

    /// Insert or update a run record.
    pub fn put_run(&self, run: &TestRun) -> StoreResult<()> {
        let key = run.id.to_string();
        let value = serde_json::to_vec(run).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(run = %key, status = ?run.status, "run record stored");
        Ok(())
    }

    /// Get a run record by id.
    pub fn get_run(&self, id: RunId) -> StoreResult<Option<TestRun>> {
        let key = id.to_string();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let run: TestRun =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// List all run records.
    pub fn list_runs(&self) -> StoreResult<Vec<TestRun>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let run: TestRun =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(run);
        }
        Ok(results)
    }

    /// List run records with the given status.
    pub fn list_runs_with_status(&self, status: RunStatus) -> StoreResult<Vec<TestRun>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|run| run.status == status)
            .collect())
    }

    // ── Pending queue ──────────────────────────────────────────────

    /// Append a run to the durable pending queue and persist its record.
    pub fn pending_push(&self, run: &TestRun) -> StoreResult<()> {
        self.put_run(run)?;
        let value = serde_json::to_vec(run).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PENDING).map_err(map_err!(Table))?;
            let next_seq = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(0);
            table
                .insert(next_seq, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(run = %run.id, "run enqueued");
        Ok(())
    }

    /// Remove and return the oldest pending run, if any.
    pub fn pending_poll(&self) -> StoreResult<Option<TestRun>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let run = {
            let mut table = txn.open_table(PENDING).map_err(map_err!(Table))?;
            match table.pop_first().map_err(map_err!(Write))? {
                Some((_, value)) => Some(
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?,
                ),
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(run)
    }

    /// Number of runs currently pending.
    pub fn pending_len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PENDING).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}

impl PendingQueue for RunStore {
    fn push(&self, run: TestRun) -> anyhow::Result<()> {
        Ok(self.pending_push(&run)?)
    }

    fn poll(&self) -> anyhow::Result<Option<TestRun>> {
        Ok(self.pending_poll()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::TestDefinition;

    fn test_run(name: &str) -> TestRun {
        TestRun::new(
            "user@example.com",
            TestDefinition::named(name).with_resource("openstack", "perf", 1),
        )
    }

    // ── Run record CRUD ────────────────────────────────────────────

    #[test]
    fn run_put_and_get() {
        let store = RunStore::open_in_memory().unwrap();
        let run = test_run("smoke");

        store.put_run(&run).unwrap();
        let retrieved = store.get_run(run.id).unwrap().unwrap();

        assert_eq!(retrieved.id, run.id);
        assert_eq!(retrieved.test_name, "smoke");
    }

    #[test]
    fn run_get_nonexistent_returns_none() {
        let store = RunStore::open_in_memory().unwrap();
        assert!(store.get_run(uuid::Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn run_update_in_place() {
        let store = RunStore::open_in_memory().unwrap();
        let mut run = test_run("smoke");
        store.put_run(&run).unwrap();

        run.status = RunStatus::Passed;
        run.finished_at = Some(2000);
        store.put_run(&run).unwrap();

        let retrieved = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(retrieved.status, RunStatus::Passed);
        assert_eq!(retrieved.finished_at, Some(2000));
    }

    #[test]
    fn list_runs_with_status_filters() {
        let store = RunStore::open_in_memory().unwrap();
        let mut passed = test_run("a");
        passed.status = RunStatus::Passed;
        let waiting = test_run("b");
        store.put_run(&passed).unwrap();
        store.put_run(&waiting).unwrap();

        let runs = store.list_runs_with_status(RunStatus::Passed).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, passed.id);
    }

    // ── Pending queue ──────────────────────────────────────────────

    #[test]
    fn pending_is_fifo() {
        let store = RunStore::open_in_memory().unwrap();
        let first = test_run("first");
        let second = test_run("second");

        store.pending_push(&first).unwrap();
        store.pending_push(&second).unwrap();
        assert_eq!(store.pending_len().unwrap(), 2);

        assert_eq!(store.pending_poll().unwrap().unwrap().id, first.id);
        assert_eq!(store.pending_poll().unwrap().unwrap().id, second.id);
        assert!(store.pending_poll().unwrap().is_none());
    }

    #[test]
    fn pending_push_persists_record() {
        let store = RunStore::open_in_memory().unwrap();
        let run = test_run("smoke");
        store.pending_push(&run).unwrap();
        assert!(store.get_run(run.id).unwrap().is_some());
    }

    #[test]
    fn pending_queue_trait_object() {
        let store = RunStore::open_in_memory().unwrap();
        let queue: &dyn PendingQueue = &store;
        let run = test_run("smoke");

        queue.push(run.clone()).unwrap();
        assert_eq!(queue.poll().unwrap().unwrap().id, run.id);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn pending_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let run = test_run("smoke");

        {
            let store = RunStore::open(&db_path).unwrap();
            store.pending_push(&run).unwrap();
        }

        // Reopen the same database file.
        let store = RunStore::open(&db_path).unwrap();
        assert_eq!(store.pending_len().unwrap(), 1);
        assert_eq!(store.pending_poll().unwrap().unwrap().id, run.id);
    }

    #[test]
    fn sequence_keeps_order_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let first = test_run("first");
        let second = test_run("second");

        {
            let store = RunStore::open(&db_path).unwrap();
            store.pending_push(&first).unwrap();
        }
        {
            let store = RunStore::open(&db_path).unwrap();
            store.pending_push(&second).unwrap();
        }

        let store = RunStore::open(&db_path).unwrap();
        assert_eq!(store.pending_poll().unwrap().unwrap().id, first.id);
        assert_eq!(store.pending_poll().unwrap().unwrap().id, second.id);
    }
}
