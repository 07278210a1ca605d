//! The component execution API.

use std::collections::HashMap;

use thiserror::Error;

use rig_core::{RunId, UserCredentials};

use crate::abort::AbortSignal;

/// Boxed future returned by component operations.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Whether a component failure is a genuine test outcome or a fault in
/// the tooling/infrastructure underneath it. The distinction decides the
/// run's terminal status (Failed vs Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The system under test misbehaved; the run failed.
    Outcome,
    /// The harness itself broke; the run errored.
    Fault,
}

/// Failure reported by a component operation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ComponentError {
    pub kind: FaultKind,
    pub message: String,
}

impl ComponentError {
    /// A test-outcome failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Outcome,
            message: message.into(),
        }
    }

    /// A tooling fault.
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Fault,
            message: message.into(),
        }
    }
}

/// Everything an operation gets to see while it runs.
#[derive(Clone)]
pub struct OpContext {
    pub run_id: RunId,
    /// Operation name from the definition, for logging.
    pub operation: String,
    /// Free-form properties from the definition.
    pub properties: HashMap<String, serde_json::Value>,
    /// Credentials of the owning user, resolved at admission.
    pub credentials: UserCredentials,
    /// Cooperative abort checkpoint.
    pub abort: AbortSignal,
}

impl OpContext {
    /// Typed property lookup; `None` when absent or of the wrong shape.
    pub fn property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// A pluggable component instance.
///
/// Instances are created fresh per run by the registry, invoked once per
/// operation, and discarded with the executable run. Long operations
/// should observe `ctx.abort` at convenient checkpoints.
pub trait Component: Send + Sync + std::fmt::Debug {
    fn run(&self, ctx: OpContext) -> BoxFuture<Result<(), ComponentError>>;
}
