//! rig-queue — the pending queue and the admission queue.
//!
//! [`PendingQueue`] is the durable FIFO of submitted-but-not-started
//! runs (the redb-backed implementation lives in `rig-state`; an
//! in-memory one is provided here for tests and ephemeral setups).
//! [`RunQueue`] wraps a pending queue with the admission gate: it
//! computes each candidate's resource requirements, attempts an
//! all-or-nothing reservation against the ledger, and either hands the
//! run to the caller with exclusive custody or defers it for a cooldown.
//! Admission order is earliest-admittable-first, not strict FIFO.

pub mod pending;
pub mod queue;

pub use pending::{InMemoryPendingQueue, PendingQueue};
pub use queue::{AdmittedRun, QueueConfig, RequeueHandle, RunQueue};
