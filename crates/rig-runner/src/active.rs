//! Executable run assembly.
//!
//! Resolves every operation of a run's declared phases (and teardown)
//! through the component registry, up front, so that a missing component
//! is discovered before anything executes. Assembly performs no I/O
//! beyond component resolution; all side effects happen in the executor.

use std::collections::HashMap;

use tracing::debug;

use rig_core::{ComponentKind, PhaseSpec, RunId, TestRun};
use rig_registry::{Component, ComponentRegistry};

use crate::error::BuildError;

/// One resolved operation: a live component instance plus its context.
pub struct ExecOp {
    pub name: String,
    pub kind: ComponentKind,
    pub properties: HashMap<String, serde_json::Value>,
    pub component: Box<dyn Component>,
}

impl std::fmt::Debug for ExecOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecOp")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// A resolved phase; its operations run concurrently with each other.
#[derive(Debug)]
pub struct ExecPhase {
    pub name: String,
    pub operations: Vec<ExecOp>,
}

/// In-memory assembly of resolved phase components for one run.
///
/// Created fresh per admission, owned exclusively by the run's executor,
/// and discarded after execution.
#[derive(Debug)]
pub struct ExecutableRun {
    pub run_id: RunId,
    pub test_name: String,
    /// Phases in declared order; executed sequentially.
    pub phases: Vec<ExecPhase>,
    /// Attempted on every exit path, after the phase sequence.
    pub teardown: Option<ExecPhase>,
}

fn resolve_phase(
    spec: &PhaseSpec,
    registry: &ComponentRegistry,
) -> Result<ExecPhase, BuildError> {
    let mut operations = Vec::with_capacity(spec.operations.len());
    for op in &spec.operations {
        let component =
            registry
                .create(op.kind, &op.component)
                .map_err(|source| BuildError {
                    phase: spec.name.clone(),
                    operation: op.name.clone(),
                    source,
                })?;
        operations.push(ExecOp {
            name: op.name.clone(),
            kind: op.kind,
            properties: op.properties.clone(),
            component,
        });
    }
    Ok(ExecPhase {
        name: spec.name.clone(),
        operations,
    })
}

/// Assemble an executable run from a run's definition.
///
/// Assembly order follows the definition's declared phase ordering.
/// A failed lookup is a configuration error fatal to this run alone.
pub fn assemble(
    run: &TestRun,
    registry: &ComponentRegistry,
) -> Result<ExecutableRun, BuildError> {
    let definition = &run.definition;

    let mut phases = Vec::with_capacity(definition.phases.len());
    for spec in &definition.phases {
        phases.push(resolve_phase(spec, registry)?);
    }
    let teardown = definition
        .teardown
        .as_ref()
        .map(|spec| resolve_phase(spec, registry))
        .transpose()?;

    debug!(
        run = %run.id,
        test = %run.test_name,
        phases = phases.len(),
        "executable run assembled"
    );
    Ok(ExecutableRun {
        run_id: run.id,
        test_name: run.test_name.clone(),
        phases,
        teardown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::{OperationSpec, TestDefinition};

    fn definition_using(component: &str) -> TestDefinition {
        TestDefinition::named("smoke")
            .with_phase(PhaseSpec::new("load").with_operation(OperationSpec::new(
                "op",
                ComponentKind::Workload,
                component,
            )))
            .with_teardown(PhaseSpec::new("teardown").with_operation(OperationSpec::new(
                "cleanup",
                ComponentKind::Provisioner,
                "noop",
            )))
    }

    #[test]
    fn assembles_declared_phases_in_order() {
        let registry = ComponentRegistry::with_builtins();
        let definition = TestDefinition::named("ordered")
            .with_phase(PhaseSpec::new("first").with_operation(OperationSpec::new(
                "a",
                ComponentKind::Provisioner,
                "noop",
            )))
            .with_phase(PhaseSpec::new("second").with_operation(OperationSpec::new(
                "b",
                ComponentKind::Workload,
                "noop",
            )));
        let run = TestRun::new("user@example.com", definition);

        let executable = assemble(&run, &registry).unwrap();
        let names: Vec<&str> = executable.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(executable.teardown.is_none());
    }

    #[test]
    fn assembles_teardown() {
        let registry = ComponentRegistry::with_builtins();
        let run = TestRun::new("user@example.com", definition_using("noop"));

        let executable = assemble(&run, &registry).unwrap();
        assert_eq!(executable.teardown.unwrap().name, "teardown");
    }

    #[test]
    fn missing_component_is_a_build_error() {
        let registry = ComponentRegistry::with_builtins();
        let run = TestRun::new("user@example.com", definition_using("no-such-component"));

        let err = assemble(&run, &registry).unwrap_err();
        assert_eq!(err.phase, "load");
        assert_eq!(err.operation, "op");
    }

    #[test]
    fn missing_teardown_component_is_a_build_error() {
        let mut registry = ComponentRegistry::new();
        // Workload resolves, teardown provisioner does not.
        registry.register(ComponentKind::Workload, "noop", || {
            Box::new(rig_registry::builtin::NoopComponent)
        });
        let run = TestRun::new("user@example.com", definition_using("noop"));

        let err = assemble(&run, &registry).unwrap_err();
        assert_eq!(err.phase, "teardown");
    }
}
