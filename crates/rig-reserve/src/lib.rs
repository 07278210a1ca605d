//! rig-reserve — the resource reservation ledger.
//!
//! Tracks which resource requirements are currently held by which run.
//! `try_acquire` is atomic all-or-nothing: either every requirement in
//! the set is marked held, or nothing is. `release` is idempotent per
//! entry. This is the only structure shared across scheduler tasks; all
//! mutation goes through one mutex, and the lock is never held across
//! an await point or for the duration of a run's execution — only
//! around the admission decision and the release.

pub mod ledger;

pub use ledger::ReservationLedger;
