//! rig-registry — pluggable components and their lookup registry.
//!
//! A test definition names components by capability kind and name; the
//! registry maps `(kind, name)` to a factory and resolution failure is a
//! typed [`RegistryError::NotFound`], never a reflection-style runtime
//! surprise. The [`Component`] trait is the execution API handed to the
//! run executor: one async operation per invocation, with a cooperative
//! abort signal threaded through the [`OpContext`].

pub mod abort;
pub mod builtin;
pub mod component;
pub mod registry;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use component::{BoxFuture, Component, ComponentError, FaultKind, OpContext};
pub use registry::{ComponentRegistry, RegistryError};
