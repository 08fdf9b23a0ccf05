//! Dependency graph over string identifiers with a deterministic Kahn sort.
//!
//! The same engine orders resources, stacks and services. Ready nodes are
//! always taken smallest-first (by id, or by a caller-supplied key and then
//! id), so the output never depends on insertion order.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{MigrateError, Result},
    model::{Catalog, Resource},
};

#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    /// node -> the nodes it depends on
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// node -> the nodes that depend on it
    dependents: BTreeMap<String, BTreeSet<String>>,
}

/// A declared dependency that does not name a node of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    pub resource_id: String,
    pub missing: String,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a catalog. Dependencies that do not resolve are
    /// reported rather than failing the build.
    pub fn from_catalog(catalog: &Catalog) -> (Self, Vec<UnresolvedDependency>) {
        let mut graph = ResourceGraph::new();
        for resource in &catalog.resources {
            graph.add(resource);
        }
        let mut unresolved = Vec::new();
        for resource in &catalog.resources {
            for dep in &resource.depends_on {
                if graph.contains(dep) {
                    // both endpoints were just inserted
                    let _ = graph.add_edge(&resource.id, dep);
                } else {
                    unresolved.push(UnresolvedDependency {
                        resource_id: resource.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }
        (graph, unresolved)
    }

    pub fn add(&mut self, resource: &Resource) {
        self.add_node(&resource.id);
    }

    pub fn add_node(&mut self, id: &str) {
        self.dependencies.entry(id.to_string()).or_default();
        self.dependents.entry(id.to_string()).or_default();
    }

    /// Record that `from` depends on `to`. Both nodes must already exist.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        for id in [from, to] {
            if !self.contains(id) {
                return Err(MigrateError::UnknownNode { id: id.to_string() });
            }
        }
        if let Some(deps) = self.dependencies.get_mut(from) {
            deps.insert(to.to_string());
        }
        if let Some(users) = self.dependents.get_mut(to) {
            users.insert(from.to_string());
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.dependencies
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.dependents
            .get(id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Dependencies-first order, ties broken lexicographically by id.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.topological_order_by(|_| ())
    }

    /// Dependencies-first order, ties broken by `(key(id), id)`.
    ///
    /// On a cycle, fails with [`MigrateError::CircularDependency`] carrying
    /// every node that could not be placed.
    pub fn topological_order_by<K, F>(&self, key: F) -> Result<Vec<String>>
    where
        K: Ord,
        F: Fn(&str) -> K,
    {
        let mut in_degree: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<(K, &str)> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| (key(*id), *id))
            .collect();

        let mut ordered = Vec::with_capacity(in_degree.len());
        while let Some((_, id)) = ready.pop_first() {
            ordered.push(id.to_string());
            let Some(users) = self.dependents.get(id) else {
                continue;
            };
            for user in users {
                if let Some(degree) = in_degree.get_mut(user.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((key(user.as_str()), user.as_str()));
                    }
                }
            }
        }

        if ordered.len() < self.len() {
            let placed: BTreeSet<&str> = ordered.iter().map(String::as_str).collect();
            let stuck = self
                .nodes()
                .filter(|id| !placed.contains(id))
                .map(str::to_string);
            return Err(MigrateError::circular(stuck));
        }
        Ok(ordered)
    }
}
