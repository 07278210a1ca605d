//! rig-runner — run assembly, execution, and the scheduler driver.
//!
//! The pieces that turn an admitted run into a finished one:
//!
//! - [`assemble`] resolves a run's declared phases into concrete
//!   component instances (a failed lookup is fatal to that run alone)
//! - [`RunLifecycle`] tracks status transitions and fires the
//!   inactive callbacks exactly once on the terminal transition
//! - [`RunExecutor`] executes the assembled phases on a dedicated task,
//!   sequential across phases and concurrent within one
//! - [`Scheduler`] owns the admission loop: take → build → execute →
//!   release, with bounded requeue for infrastructure faults
//!
//! # Architecture
//!
//! ```text
//! Scheduler (admission loop task)
//!   ├── RunQueue (reservation-gated take)
//!   ├── assemble() → ExecutableRun
//!   ├── ExecutorFactory → RunExecutor (one task per admitted run)
//!   │     └── RunLifecycle (status, abort, inactive callbacks)
//!   └── inactive callback → ReservationLedger release
//! ```

pub mod active;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod scheduler;

pub use active::{ExecutableRun, assemble};
pub use error::{BuildError, ExecutorError};
pub use executor::{ExecutorFactory, RunExecutor, TaskExecutorFactory};
pub use lifecycle::{InactiveCallback, RunLifecycle, RunUpdater};
pub use scheduler::{CredentialsResolver, Scheduler, SchedulerConfig};
