//! Final service-level deployment order.
//!
//! Unlike stack ordering, a cycle here is fatal: emitting an order that breaks
//! a `depends_on` chain would produce a configuration that cannot start.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::{
    consolidate::ConsolidatedResult,
    error::{MigrateError, Result},
    graph::ResourceGraph,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOrder {
    pub stack: String,
    pub services: Vec<String>,
}

/// Deterministic start order for every service in a consolidated result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    /// All services, dependencies first.
    pub services: Vec<String>,
    /// The same order split by stack, stacks in their consolidated order.
    pub stacks: Vec<StackOrder>,
    /// `depends_on` entries that named no known service.
    pub dropped_references: Vec<(String, String)>,
}

impl DeploymentPlan {
    pub fn position(&self, service: &str) -> Option<usize> {
        self.services.iter().position(|s| s == service)
    }
}

/// Order services by their `depends_on` edges.
///
/// Stack position is the primary tie key: among services that are ready at
/// the same time, those in earlier stacks start first. Service name breaks
/// ties within a stack.
pub fn plan_deployment(result: &ConsolidatedResult) -> Result<DeploymentPlan> {
    let mut graph = ResourceGraph::new();
    let mut stack_of: BTreeMap<&str, usize> = BTreeMap::new();
    for (index, stack) in result.stacks.iter().enumerate() {
        for service in stack.services() {
            if stack_of.insert(service.name.as_str(), index).is_some() {
                return Err(MigrateError::validation(
                    service.name.clone(),
                    "service name appears in more than one place",
                ));
            }
            graph.add_node(&service.name);
        }
    }

    let mut dropped = Vec::new();
    for service in result.services() {
        for dep in &service.depends_on {
            if graph.contains(dep) {
                graph.add_edge(&service.name, dep)?;
            } else {
                warn!(service = %service.name, missing = %dep, "dropping unknown depends_on");
                dropped.push((service.name.clone(), dep.clone()));
            }
        }
    }

    let services = graph
        .topological_order_by(|name| stack_of.get(name).copied().unwrap_or(usize::MAX))?;
    debug!(count = services.len(), "service order computed");

    let stacks = result
        .stacks
        .iter()
        .map(|stack| StackOrder {
            stack: stack.name().to_string(),
            services: services
                .iter()
                .filter(|name| stack.contains_service(name))
                .cloned()
                .collect(),
        })
        .collect();

    Ok(DeploymentPlan {
        services,
        stacks,
        dropped_references: dropped,
    })
}
