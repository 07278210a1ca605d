//! Built-in components.
//!
//! Small components useful for wiring checks, demos, and tests: `noop`
//! (registered for every kind), `sleep` (abort-aware timed workload),
//! and `fail` (deterministic failure with a selectable fault kind).

use std::time::Duration;

use tracing::debug;

use rig_core::ComponentKind;

use crate::component::{BoxFuture, Component, ComponentError, OpContext};
use crate::registry::ComponentRegistry;

/// Does nothing, successfully.
#[derive(Debug)]
pub struct NoopComponent;

impl Component for NoopComponent {
    fn run(&self, ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
        Box::pin(async move {
            debug!(run = %ctx.run_id, operation = %ctx.operation, "noop");
            Ok(())
        })
    }
}

/// Sleeps for `duration_ms` (default 10), returning early on abort.
#[derive(Debug)]
pub struct SleepComponent;

impl Component for SleepComponent {
    fn run(&self, ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
        Box::pin(async move {
            let duration = Duration::from_millis(ctx.property::<u64>("duration_ms").unwrap_or(10));
            let mut abort = ctx.abort.clone();
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = abort.aborted() => {
                    debug!(run = %ctx.run_id, operation = %ctx.operation, "sleep cut short by abort");
                }
            }
            Ok(())
        })
    }
}

/// Always fails. Property `fault = true` reports a tooling fault instead
/// of a test-outcome failure.
#[derive(Debug)]
pub struct FailComponent;

impl Component for FailComponent {
    fn run(&self, ctx: OpContext) -> BoxFuture<Result<(), ComponentError>> {
        Box::pin(async move {
            let message = ctx
                .property::<String>("message")
                .unwrap_or_else(|| format!("operation {} failed", ctx.operation));
            if ctx.property::<bool>("fault").unwrap_or(false) {
                Err(ComponentError::fault(message))
            } else {
                Err(ComponentError::failed(message))
            }
        })
    }
}

/// Register the built-ins into `registry`.
pub fn register(registry: &mut ComponentRegistry) {
    for kind in [
        ComponentKind::Provisioner,
        ComponentKind::Configurator,
        ComponentKind::Workload,
        ComponentKind::Checker,
    ] {
        registry.register(kind, "noop", || Box::new(NoopComponent));
    }
    registry.register(ComponentKind::Workload, "sleep", || Box::new(SleepComponent));
    registry.register(ComponentKind::Workload, "fail", || Box::new(FailComponent));
    registry.register(ComponentKind::Checker, "fail", || Box::new(FailComponent));
}
