//! Test definition model.
//!
//! A definition declares the resources a run needs, an ordered list of
//! phases, and an optional teardown phase. Phases run sequentially;
//! operations within one phase run concurrently. Definitions are plain
//! serde types and load from TOML files; other formats are the concern
//! of whatever front end produces them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::ResourceRequirement;

/// Capability type of a pluggable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Creates and destroys infrastructure (clusters, machine pools).
    Provisioner,
    /// Applies configuration to provisioned infrastructure.
    Configurator,
    /// Drives load or test traffic during a phase.
    Workload,
    /// Validates outcomes after workloads complete.
    Checker,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComponentKind::Provisioner => "provisioner",
            ComponentKind::Configurator => "configurator",
            ComponentKind::Workload => "workload",
            ComponentKind::Checker => "checker",
        };
        f.write_str(s)
    }
}

/// Declared resource need, as written in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub provider: String,
    pub pool: String,
    /// Units of pool capacity (defaults to 1).
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// One operation inside a phase, resolved to a component at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub kind: ComponentKind,
    /// Registered component name to resolve via the registry.
    pub component: String,
    /// Free-form component properties.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl OperationSpec {
    pub fn new(name: &str, kind: ComponentKind, component: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            component: component.to_string(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// An ordered stage of a run. Operations within a phase run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

impl PhaseSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            operations: Vec::new(),
        }
    }

    pub fn with_operation(mut self, op: OperationSpec) -> Self {
        self.operations.push(op);
        self
    }
}

/// A complete test definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    pub name: String,
    /// Resource pools this test reserves before it may execute.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Sequential phases of the run.
    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
    /// Always attempted after the phase sequence, on every exit path.
    pub teardown: Option<PhaseSpec>,
}

impl TestDefinition {
    /// Minimal definition with no resources or phases.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resources: Vec::new(),
            phases: Vec::new(),
            teardown: None,
        }
    }

    pub fn with_resource(mut self, provider: &str, pool: &str, count: u32) -> Self {
        self.resources.push(ResourceSpec {
            provider: provider.to_string(),
            pool: pool.to_string(),
            count,
        });
        self
    }

    pub fn with_phase(mut self, phase: PhaseSpec) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn with_teardown(mut self, phase: PhaseSpec) -> Self {
        self.teardown = Some(phase);
        self
    }

    /// The declared resources as requirement-set entries.
    pub fn requirements(&self) -> Vec<ResourceRequirement> {
        self.resources
            .iter()
            .map(|r| ResourceRequirement::new(&r.provider, &r.pool, r.count))
            .collect()
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
