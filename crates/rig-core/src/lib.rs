//! rig-core — domain types for the testrig scheduler.
//!
//! Defines the run record (`TestRun`, `RunStatus`), resource requirement
//! types, the TOML-loadable test definition model, and user credentials.
//! This crate performs no I/O beyond definition file loading; all
//! scheduling behavior lives in the other `rig-*` crates.

pub mod credentials;
pub mod definition;
pub mod types;

pub use credentials::UserCredentials;
pub use definition::{ComponentKind, OperationSpec, PhaseSpec, ResourceSpec, TestDefinition};
pub use types::*;
