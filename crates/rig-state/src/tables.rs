//! redb table definitions for the testrig state store.

use redb::TableDefinition;

/// Run records keyed by `{run_id}` (JSON-serialized `TestRun`).
pub const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");

/// Pending queue entries keyed by a monotonic sequence number
/// (JSON-serialized `TestRun` snapshots, FIFO by key order).
pub const PENDING: TableDefinition<u64, &[u8]> = TableDefinition::new("pending");
