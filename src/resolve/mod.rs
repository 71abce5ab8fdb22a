//! Resolution of raw configuration into deployable stacks.
//!
//! - [`ParameterResolver`]: literal, list and cross-stack output values
//! - [`DependencyGraph`]: deterministic deployment and deletion order
//! - [`StackResolver`]: per-stack templates, parameters and tags

mod graph;
mod parameter;
mod stack;

pub use graph::DependencyGraph;
pub use parameter::ParameterResolver;
pub use stack::{ResolvedStack, ResolvedStacks, StackResolver};
