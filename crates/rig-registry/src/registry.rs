//! Name-indexed component lookup.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use rig_core::ComponentKind;

use crate::builtin;
use crate::component::Component;

/// Errors from component resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no {kind} component registered under name {name:?}")]
    NotFound { kind: ComponentKind, name: String },
}

type Factory = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Maps `(capability kind, name)` to a component factory.
///
/// Absence is a typed [`RegistryError::NotFound`]; nothing is resolved
/// dynamically at execution time.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<(ComponentKind, String), Factory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in components.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Register a factory for `(kind, name)`, replacing any previous one.
    pub fn register<F>(&mut self, kind: ComponentKind, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        debug!(%kind, name, "component registered");
        self.factories
            .insert((kind, name.to_string()), Box::new(factory));
    }

    /// Create a fresh instance of the named component.
    pub fn create(
        &self,
        kind: ComponentKind,
        name: &str,
    ) -> Result<Box<dyn Component>, RegistryError> {
        match self.factories.get(&(kind, name.to_string())) {
            Some(factory) => Ok(factory()),
            None => Err(RegistryError::NotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// Registered names for a capability kind, sorted.
    pub fn names(&self, kind: ComponentKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
