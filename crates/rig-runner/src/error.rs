//! Runner error types.

use thiserror::Error;

use rig_registry::RegistryError;

/// Executable-run assembly failed. Fatal to the affected run only: it
/// transitions straight to `Failed` without executing, and whatever was
/// reserved for it is released.
#[derive(Debug, Error)]
#[error("phase {phase:?}, operation {operation:?}: {source}")]
pub struct BuildError {
    pub phase: String,
    pub operation: String,
    #[source]
    pub source: RegistryError,
}

/// Executor creation itself failed (an infrastructure fault, not a test
/// outcome). Handled by bounded requeue rather than immediate failure.
#[derive(Debug, Error)]
#[error("executor creation failed: {0}")]
pub struct ExecutorError(pub String);
