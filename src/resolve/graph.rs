//! Stack dependency graph and deterministic ordering.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::ResolveError;

/// Dependency graph over a set of stack names.
///
/// Edges point from a dependency to its dependents. Only dependencies that
/// are themselves part of the graph take part in ordering.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Declared dependencies by stack.
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stack with its declared dependencies.
    pub fn add_stack<I, S>(&mut self, name: impl Into<String>, depends_on: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .entry(name.into())
            .or_default()
            .extend(depends_on.into_iter().map(Into::into));
    }

    /// Returns the number of stacks in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns true if the graph has no stacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Orders stacks so that every stack follows the stacks it depends on.
    ///
    /// Among stacks that are ready at the same time the lexicographically
    /// smallest goes first, so the result does not depend on insertion order.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::CircularDependency` naming the stacks that
    /// could not be ordered.
    pub fn deployment_order(&self) -> Result<Vec<String>, ResolveError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (name, deps) in &self.dependencies {
            let local = deps
                .iter()
                .filter(|d| self.dependencies.contains_key(d.as_str()));
            let mut count = 0;
            for dep in local {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
                count += 1;
            }
            in_degree.insert(name.as_str(), count);
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.dependencies.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());

            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < self.dependencies.len() {
            let stacks: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(ResolveError::CircularDependency { stacks });
        }

        debug!("Deployment order: {}", order.join(" -> "));
        Ok(order)
    }

    /// Returns the deployment order reversed.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has a cycle.
    pub fn deletion_order(&self) -> Result<Vec<String>, ResolveError> {
        let mut order = self.deployment_order()?;
        order.reverse();
        Ok(order)
    }
}
