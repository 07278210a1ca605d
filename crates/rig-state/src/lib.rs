//! rig-state — embedded persistence for testrig.
//!
//! Backed by [redb](https://docs.rs/redb), provides durable storage for
//! run records and the pending-run queue, plus an in-memory backend for
//! tests.
//!
//! # Architecture
//!
//! Run records are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by run id. The pending queue is a second table keyed by a
//! monotonic sequence number, so FIFO order survives process restart.
//!
//! The `RunStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements `rig-queue`'s `PendingQueue`, making it a drop-in
//! durable pending store for the admission queue.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use store::RunStore;
