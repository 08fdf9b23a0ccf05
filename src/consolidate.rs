//! Groups per-resource conversion output into ordered, category-based stacks.
//!
//! Stack order is computed with the same Kahn sort as the resource graph. A
//! cycle between stacks is not fatal here: the stacks keep the order in which
//! they were first created and a warning is recorded. Service-level ordering
//! (see [`crate::ordering`]) still rejects real cycles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::{debug, warn};

use crate::{
    error::{MigrateError, Result},
    graph::ResourceGraph,
    model::ResourceKind,
    registry::ConverterRegistry,
    result::{ConversionResult, ServiceDefinition, VolumeDefinition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Storage,
    Database,
    Cache,
    Messaging,
    Application,
    Edge,
}

/// Deployment precedence: earlier categories start first.
pub const CATEGORY_PRECEDENCE: [Category; 6] = [
    Category::Storage,
    Category::Database,
    Category::Cache,
    Category::Messaging,
    Category::Application,
    Category::Edge,
];

/// Provider-independent service names and the category they belong to.
/// Services not listed are treated as applications.
const SERVICE_CATEGORIES: &[(&str, Category)] = &[
    ("s3_bucket", Category::Storage),
    ("storage_bucket", Category::Storage),
    ("storage_account", Category::Storage),
    ("efs_file_system", Category::Storage),
    ("db_instance", Category::Database),
    ("rds_cluster", Category::Database),
    ("sql_database_instance", Category::Database),
    ("postgresql_server", Category::Database),
    ("mysql_server", Category::Database),
    ("dynamodb_table", Category::Database),
    ("elasticache_cluster", Category::Cache),
    ("elasticache_replication_group", Category::Cache),
    ("redis_instance", Category::Cache),
    ("sqs_queue", Category::Messaging),
    ("sns_topic", Category::Messaging),
    ("pubsub_topic", Category::Messaging),
    ("servicebus_queue", Category::Messaging),
    ("lb", Category::Edge),
    ("alb", Category::Edge),
    ("compute_url_map", Category::Edge),
    ("cloudfront_distribution", Category::Edge),
    ("api_gateway_rest_api", Category::Edge),
];

impl Category {
    pub fn for_kind(kind: &ResourceKind) -> Category {
        SERVICE_CATEGORIES
            .iter()
            .find(|(service, _)| *service == kind.service)
            .map(|(_, category)| *category)
            .unwrap_or(Category::Application)
    }

    /// Position in [`CATEGORY_PRECEDENCE`].
    pub fn rank(self) -> usize {
        CATEGORY_PRECEDENCE
            .iter()
            .position(|c| *c == self)
            .unwrap_or(CATEGORY_PRECEDENCE.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Storage => "storage",
            Category::Database => "database",
            Category::Cache => "cache",
            Category::Messaging => "messaging",
            Category::Application => "application",
            Category::Edge => "edge",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stack lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackState {
    Empty,
    Accumulating,
    Ordered,
    Emitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    name: String,
    category: Category,
    services: Vec<ServiceDefinition>,
    volumes: Vec<VolumeDefinition>,
    networks: BTreeSet<String>,
    depends_on: Vec<String>,
    config_files: IndexMap<String, Vec<u8>>,
    scripts: IndexMap<String, Vec<u8>>,
    resource_ids: Vec<String>,
    state: StackState,
}

impl Stack {
    pub fn new(category: Category) -> Self {
        Stack {
            name: category.as_str().to_string(),
            category,
            services: Vec::new(),
            volumes: Vec::new(),
            networks: BTreeSet::new(),
            depends_on: Vec::new(),
            config_files: IndexMap::new(),
            scripts: IndexMap::new(),
            resource_ids: Vec::new(),
            state: StackState::Empty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn volumes(&self) -> &[VolumeDefinition] {
        &self.volumes
    }

    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(String::as_str)
    }

    /// Names of the stacks this one starts after.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn config_files(&self) -> &IndexMap<String, Vec<u8>> {
        &self.config_files
    }

    pub fn scripts(&self) -> &IndexMap<String, Vec<u8>> {
        &self.scripts
    }

    pub fn resource_ids(&self) -> &[String] {
        &self.resource_ids
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    pub fn contains_service(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name == name)
    }

    fn transition(&mut self, next: StackState) -> Result<()> {
        if next < self.state || self.state == StackState::Emitted {
            return Err(MigrateError::internal(format!(
                "stack '{}' cannot move from {:?} to {next:?}",
                self.name, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Merge one conversion result. Returns warnings for colliding side files.
    fn absorb(&mut self, result: ConversionResult) -> Result<Vec<String>> {
        self.transition(StackState::Accumulating)?;
        let mut warnings = Vec::new();
        self.resource_ids.push(result.resource_id);
        for service in std::iter::once(result.service).chain(result.additional_services) {
            self.networks.extend(service.networks.iter().cloned());
            self.services.push(service);
        }
        for volume in result.additional_volumes {
            if !self.volumes.iter().any(|v| v.name == volume.name) {
                self.volumes.push(volume);
            }
        }
        for (path, body) in result.config_files {
            if self.config_files.contains_key(&path) {
                warnings.push(format!("config file '{path}' generated twice; keeping the first"));
                continue;
            }
            self.config_files.insert(path, body);
        }
        for (path, body) in result.scripts {
            if self.scripts.contains_key(&path) {
                warnings.push(format!("script '{path}' generated twice; keeping the first"));
                continue;
            }
            self.scripts.insert(path, body);
        }
        Ok(warnings)
    }

    fn finish(&mut self, depends_on: Vec<String>) -> Result<()> {
        self.services.sort_by(|a, b| a.name.cmp(&b.name));
        self.volumes.sort_by(|a, b| a.name.cmp(&b.name));
        self.resource_ids.sort();
        self.depends_on = depends_on;
        self.transition(StackState::Ordered)
    }

    pub(crate) fn mark_emitted(&mut self) -> Result<()> {
        self.transition(StackState::Emitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassthroughReason {
    NoConverter,
    NotContainerizable,
}

/// A resource with no containerizable representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passthrough {
    pub resource_id: String,
    pub name: String,
    pub kind: ResourceKind,
    pub reason: PassthroughReason,
    pub hint: String,
}

/// A resource whose validation or conversion failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedResource {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub provider: String,
    pub source: String,
    pub resource_count: usize,
    pub converted_count: usize,
    pub passthrough_count: usize,
    pub skipped_count: usize,
    pub stack_count: usize,
    pub service_count: usize,
    /// `true` when stack order fell back to creation order because of a cycle.
    pub stack_order_fallback: bool,
}

/// Grouped and ordered output, ready for deployment ordering and emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidatedResult {
    pub stacks: Vec<Stack>,
    pub passthrough: Vec<Passthrough>,
    pub skipped: Vec<SkippedResource>,
    pub warnings: Vec<String>,
    pub manual_steps: Vec<String>,
    pub metadata: Metadata,
}

impl ConsolidatedResult {
    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.stacks.iter().flat_map(|s| s.services.iter())
    }

    pub fn service_count(&self) -> usize {
        self.stacks.iter().map(|s| s.services.len()).sum()
    }

    pub fn is_emitted(&self) -> bool {
        !self.stacks.is_empty() && self.stacks.iter().all(|s| s.state == StackState::Emitted)
    }

    /// Freeze every stack after a successful emission.
    pub fn mark_emitted(&mut self) -> Result<()> {
        for stack in &mut self.stacks {
            stack.mark_emitted()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Consolidator {
    /// `(dependent, dependency)` category pairs declared by converters.
    declared: BTreeSet<(Category, Category)>,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Consolidator {
    pub fn new() -> Self {
        Consolidator {
            declared: BTreeSet::new(),
        }
    }

    /// Refine the precedence table with the dependency kinds converters declare.
    pub fn with_registry(registry: &ConverterRegistry) -> Self {
        let mut consolidator = Self::new();
        for (kind, deps) in registry.declared_dependencies() {
            let from = Category::for_kind(&kind);
            for dep in deps {
                consolidator.declare(from, Category::for_kind(&dep));
            }
        }
        consolidator
    }

    pub fn declare(&mut self, dependent: Category, dependency: Category) {
        if dependent != dependency {
            self.declared.insert((dependent, dependency));
        }
    }

    /// Group results into stacks and order them.
    ///
    /// `results` should already be sorted by resource id so that stack
    /// creation order is deterministic.
    pub fn consolidate(
        &self,
        results: Vec<ConversionResult>,
        passthrough: Vec<Passthrough>,
        skipped: Vec<SkippedResource>,
    ) -> Result<ConsolidatedResult> {
        let converted_count = results.len();
        let mut consolidated = ConsolidatedResult::default();
        let mut stacks: IndexMap<Category, Stack> = IndexMap::new();

        for mut result in results {
            let category = Category::for_kind(&result.kind);
            consolidated.warnings.append(&mut result.warnings);
            consolidated.manual_steps.append(&mut result.manual_steps);
            let stack = stacks
                .entry(category)
                .or_insert_with(|| Stack::new(category));
            let collisions = stack.absorb(result)?;
            consolidated.warnings.extend(collisions);
        }

        for entry in &passthrough {
            consolidated.warnings.push(match entry.reason {
                PassthroughReason::NoConverter => format!(
                    "{} '{}' has no converter and was passed through",
                    entry.kind, entry.resource_id
                ),
                PassthroughReason::NotContainerizable => format!(
                    "{} '{}' cannot run in a container and was passed through",
                    entry.kind, entry.resource_id
                ),
            });
            consolidated.manual_steps.push(entry.hint.clone());
        }
        for entry in &skipped {
            consolidated.warnings.push(format!(
                "{} '{}' was skipped: {}",
                entry.kind, entry.resource_id, entry.error
            ));
            consolidated.manual_steps.push(format!(
                "Review resource '{}' and migrate it by hand",
                entry.resource_id
            ));
        }

        let fallback = self.order_stacks(&mut stacks, &mut consolidated.warnings)?;
        consolidated.stacks = stacks.into_values().collect();
        consolidated.metadata = Metadata {
            converted_count,
            passthrough_count: passthrough.len(),
            skipped_count: skipped.len(),
            stack_count: consolidated.stacks.len(),
            service_count: consolidated.service_count(),
            stack_order_fallback: fallback,
            ..Metadata::default()
        };
        consolidated.passthrough = passthrough;
        consolidated.skipped = skipped;
        Ok(consolidated)
    }

    /// Regroup an already consolidated result. Stack contents come out unchanged.
    pub fn reconsolidate(&self, previous: &ConsolidatedResult) -> Result<ConsolidatedResult> {
        let mut stacks: IndexMap<Category, Stack> = IndexMap::new();
        for old in &previous.stacks {
            let stack = stacks
                .entry(old.category)
                .or_insert_with(|| Stack::new(old.category));
            stack.transition(StackState::Accumulating)?;
            stack.resource_ids.extend(old.resource_ids.iter().cloned());
            stack.services.extend(old.services.iter().cloned());
            stack.networks.extend(old.networks.iter().cloned());
            for volume in &old.volumes {
                if !stack.volumes.iter().any(|v| v.name == volume.name) {
                    stack.volumes.push(volume.clone());
                }
            }
            for (path, body) in &old.config_files {
                stack.config_files.entry(path.clone()).or_insert_with(|| body.clone());
            }
            for (path, body) in &old.scripts {
                stack.scripts.entry(path.clone()).or_insert_with(|| body.clone());
            }
        }

        let mut warnings = previous.warnings.clone();
        let fallback = self.order_stacks(&mut stacks, &mut Vec::new())?;
        if fallback && !previous.metadata.stack_order_fallback {
            warnings.push("stack dependency cycle detected during reconsolidation".to_string());
        }
        let stacks: Vec<Stack> = stacks.into_values().collect();
        let mut metadata = previous.metadata.clone();
        metadata.stack_count = stacks.len();
        metadata.service_count = stacks.iter().map(|s| s.services.len()).sum();
        metadata.stack_order_fallback = fallback;
        Ok(ConsolidatedResult {
            stacks,
            passthrough: previous.passthrough.clone(),
            skipped: previous.skipped.clone(),
            warnings,
            manual_steps: previous.manual_steps.clone(),
            metadata,
        })
    }

    /// Compute stack edges and reorder `stacks` in place. Returns `true` when a
    /// cycle forced the creation-order fallback.
    fn order_stacks(
        &self,
        stacks: &mut IndexMap<Category, Stack>,
        warnings: &mut Vec<String>,
    ) -> Result<bool> {
        let edges = self.stack_edges(stacks);
        let mut graph = ResourceGraph::new();
        for stack in stacks.values() {
            graph.add_node(&stack.name);
        }
        for (from, to) in &edges {
            graph.add_edge(from, to)?;
        }

        let ranks: BTreeMap<String, usize> = stacks
            .values()
            .map(|s| (s.name.clone(), s.category.rank()))
            .collect();
        let order = graph.topological_order_by(|name| ranks.get(name).copied().unwrap_or(usize::MAX));

        let fallback = match order {
            Ok(order) => {
                debug!(?order, "stack order");
                let mut reordered = IndexMap::with_capacity(stacks.len());
                for name in &order {
                    if let Some(index) = stacks.values().position(|s| &s.name == name)
                        && let Some((category, stack)) = stacks.shift_remove_index(index)
                    {
                        reordered.insert(category, stack);
                    }
                }
                *stacks = reordered;
                false
            }
            Err(MigrateError::CircularDependency { ids }) => {
                warn!(?ids, "stack dependency cycle; keeping creation order");
                warnings.push(format!(
                    "stack dependency cycle between {}; stacks keep their creation order",
                    ids.join(", ")
                ));
                true
            }
            Err(other) => return Err(other),
        };

        for stack in stacks.values_mut() {
            let deps: Vec<String> = graph.dependencies(&stack.name);
            stack.finish(deps)?;
        }
        Ok(fallback)
    }

    fn stack_edges(&self, stacks: &IndexMap<Category, Stack>) -> BTreeSet<(String, String)> {
        let mut edges = BTreeSet::new();
        let present: Vec<Category> = CATEGORY_PRECEDENCE
            .iter()
            .copied()
            .filter(|c| stacks.contains_key(c))
            .collect();

        // (a) precedence: each stack follows the nearest present lower category
        for pair in present.windows(2) {
            edges.insert((pair[1].as_str().to_string(), pair[0].as_str().to_string()));
        }

        // (b) explicit service references crossing stacks
        let owner: BTreeMap<&str, &str> = stacks
            .values()
            .flat_map(|stack| {
                stack
                    .services
                    .iter()
                    .map(move |svc| (svc.name.as_str(), stack.name.as_str()))
            })
            .collect();
        for stack in stacks.values() {
            for service in &stack.services {
                for dep in &service.depends_on {
                    if let Some(target) = owner.get(dep.as_str())
                        && *target != stack.name
                    {
                        edges.insert((stack.name.clone(), target.to_string()));
                    }
                }
            }
        }

        // (c) converter-declared kind dependencies
        for (dependent, dependency) in &self.declared {
            if stacks.contains_key(dependent) && stacks.contains_key(dependency) {
                edges.insert((
                    dependent.as_str().to_string(),
                    dependency.as_str().to_string(),
                ));
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ServiceDefinition;

    fn result(id: &str, service: &str, name: &str) -> ConversionResult {
        ConversionResult::new(
            id,
            ResourceKind::new("aws", service),
            ServiceDefinition::new(name, "img:1"),
        )
    }

    #[test]
    fn precedence_table_is_explicit_order() {
        assert_eq!(
            CATEGORY_PRECEDENCE
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            ["storage", "database", "cache", "messaging", "application", "edge"]
        );
        assert!(Category::Storage.rank() < Category::Database.rank());
        assert!(Category::Application.rank() < Category::Edge.rank());
    }

    #[test]
    fn unknown_services_are_applications() {
        assert_eq!(
            Category::for_kind(&ResourceKind::new("aws", "lambda_function")),
            Category::Application
        );
        assert_eq!(
            Category::for_kind(&ResourceKind::new("gcp", "redis_instance")),
            Category::Cache
        );
    }

    #[test]
    fn stacks_follow_precedence_regardless_of_input_order() {
        let results = vec![
            result("a", "lb", "proxy"),
            result("b", "ecs_service", "api"),
            result("c", "s3_bucket", "assets"),
            result("d", "db_instance", "db"),
        ];
        let out = Consolidator::new()
            .consolidate(results, Vec::new(), Vec::new())
            .unwrap();
        let names: Vec<_> = out.stacks.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["storage", "database", "application", "edge"]);
        assert_eq!(out.stack("database").unwrap().depends_on(), ["storage"]);
        assert!(out.stacks.iter().all(|s| s.state() == StackState::Ordered));
        assert!(!out.metadata.stack_order_fallback);
    }

    #[test]
    fn cross_stack_cycle_falls_back_to_creation_order() {
        let mut db = result("a-db", "db_instance", "db");
        db.service.depends_on.push("api".to_string());
        let results = vec![db, result("b-api", "ecs_service", "api")];
        let out = Consolidator::new()
            .consolidate(results, Vec::new(), Vec::new())
            .unwrap();
        let names: Vec<_> = out.stacks.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["database", "application"]);
        assert!(out.metadata.stack_order_fallback);
        assert!(out.warnings.iter().any(|w| w.contains("stack dependency cycle")));
    }

    #[test]
    fn passthrough_entries_generate_warning_and_manual_step() {
        let passthrough = vec![Passthrough {
            resource_id: "vm-1".to_string(),
            name: "bastion".to_string(),
            kind: ResourceKind::new("aws", "instance"),
            reason: PassthroughReason::NotContainerizable,
            hint: "Provision a host for 'bastion'".to_string(),
        }];
        let out = Consolidator::new()
            .consolidate(Vec::new(), passthrough, Vec::new())
            .unwrap();
        assert!(out.stacks.is_empty());
        assert_eq!(out.passthrough.len(), 1);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.manual_steps, ["Provision a host for 'bastion'"]);
    }

    #[test]
    fn emitted_stack_rejects_further_transitions() {
        let out = Consolidator::new()
            .consolidate(vec![result("a", "s3_bucket", "assets")], Vec::new(), Vec::new())
            .unwrap();
        let mut stack = out.stacks[0].clone();
        stack.mark_emitted().unwrap();
        assert!(stack.transition(StackState::Accumulating).is_err());
        assert!(stack.mark_emitted().is_err());
    }

    #[test]
    fn declared_kind_dependencies_add_edges() {
        let mut consolidator = Consolidator::new();
        consolidator.declare(Category::Storage, Category::Edge);
        let out = consolidator
            .consolidate(
                vec![result("a", "s3_bucket", "assets"), result("b", "lb", "proxy")],
                Vec::new(),
                Vec::new(),
            )
            .unwrap();
        // storage -> edge contradicts precedence, so the cycle fallback applies
        assert!(out.metadata.stack_order_fallback);
    }
}
