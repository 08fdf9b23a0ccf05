//! End-to-end conversion: graph check, parallel dispatch, consolidation,
//! ordering and emission.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    consolidate::{ConsolidatedResult, Consolidator, Passthrough, PassthroughReason, SkippedResource},
    converter::RunContext,
    emit::{ArtifactSet, EmitConfig, EmitterRegistry},
    error::{MigrateError, Result},
    graph::ResourceGraph,
    model::{Catalog, Resource},
    ordering::{DeploymentPlan, plan_deployment},
    registry::ConverterRegistry,
    result::ConversionResult,
};

/// What happened to one resource during dispatch.
#[derive(Debug, Clone)]
pub enum Outcome {
    Converted(Box<ConversionResult>),
    Passthrough(Passthrough),
    Skipped(SkippedResource),
}

impl Outcome {
    pub fn resource_id(&self) -> &str {
        match self {
            Outcome::Converted(result) => &result.resource_id,
            Outcome::Passthrough(entry) => &entry.resource_id,
            Outcome::Skipped(entry) => &entry.resource_id,
        }
    }
}

/// Route one resource through its converter. Only cancellation is an error;
/// every other failure is folded into the outcome.
pub fn dispatch(registry: &ConverterRegistry, ctx: &RunContext, resource: &Resource) -> Result<Outcome> {
    ctx.check()?;
    let converter = match registry.get(&resource.kind) {
        Ok(converter) => converter,
        Err(_) => {
            debug!(resource = %resource.id, kind = %resource.kind, "no converter registered");
            return Ok(Outcome::Passthrough(Passthrough {
                resource_id: resource.id.clone(),
                name: resource.name.clone(),
                kind: resource.kind.clone(),
                reason: PassthroughReason::NoConverter,
                hint: format!(
                    "No converter for {}; migrate '{}' by hand",
                    resource.kind, resource.name
                ),
            }));
        }
    };

    if !converter.containerizable() {
        return Ok(Outcome::Passthrough(Passthrough {
            resource_id: resource.id.clone(),
            name: resource.name.clone(),
            kind: resource.kind.clone(),
            reason: PassthroughReason::NotContainerizable,
            hint: converter.passthrough_hint(resource),
        }));
    }

    let converted = converter
        .validate(resource)
        .and_then(|_| converter.convert(ctx, resource));
    match converted {
        Ok(result) => {
            debug!(resource = %resource.id, service = %result.service.name, "converted");
            Ok(Outcome::Converted(Box::new(result)))
        }
        Err(MigrateError::Cancelled) => Err(MigrateError::Cancelled),
        Err(err) => {
            warn!(resource = %resource.id, kind = %resource.kind, error = %err, "skipping resource");
            Ok(Outcome::Skipped(SkippedResource {
                resource_id: resource.id.clone(),
                kind: resource.kind.clone(),
                error: err.to_string(),
            }))
        }
    }
}

/// Output of a full run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: ConsolidatedResult,
    pub plan: DeploymentPlan,
    pub artifacts: ArtifactSet,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: ConverterRegistry,
    emitters: EmitterRegistry,
    workers: usize,
}

impl Pipeline {
    pub fn new(registry: ConverterRegistry, emitters: EmitterRegistry) -> Self {
        Pipeline {
            registry,
            emitters,
            workers: default_workers(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(ConverterRegistry::builtin(), EmitterRegistry::builtin())
    }

    /// Cap on concurrent conversions. Zero means one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn emitters(&self) -> &EmitterRegistry {
        &self.emitters
    }

    /// Convert and consolidate a catalog. Per-resource failures never abort the batch.
    pub async fn consolidate(&self, ctx: &RunContext, catalog: &Catalog) -> Result<ConsolidatedResult> {
        catalog.ensure_unique_ids()?;
        let mut warnings = check_graph(catalog);

        let (names, renamed) = self.assign_service_names(ctx, catalog);
        warnings.extend(renamed);
        let ctx = ctx.clone().with_service_names(names);

        info!(resources = catalog.len(), workers = self.workers, "converting resources");
        let outcomes = self.convert_all(&ctx, catalog).await?;

        let mut converted = Vec::new();
        let mut passthrough = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Converted(result) => converted.push(*result),
                Outcome::Passthrough(entry) => passthrough.push(entry),
                Outcome::Skipped(entry) => skipped.push(entry),
            }
        }

        warnings.extend(dedupe_service_names(&mut converted));
        let unconverted: BTreeSet<&str> = passthrough
            .iter()
            .map(|p| p.resource_id.as_str())
            .chain(skipped.iter().map(|s| s.resource_id.as_str()))
            .collect();
        warnings.extend(link_dependencies(catalog, &mut converted, &unconverted));

        info!(
            converted = converted.len(),
            passthrough = passthrough.len(),
            skipped = skipped.len(),
            "consolidating stacks"
        );
        let consolidator = Consolidator::with_registry(&self.registry);
        let mut result = consolidator.consolidate(converted, passthrough, skipped)?;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        result.metadata.provider = catalog.provider.clone();
        result.metadata.source = catalog.source.clone();
        result.metadata.resource_count = catalog.len();
        Ok(result)
    }

    /// Convert, consolidate, order and emit with the named emitter.
    pub async fn run(
        &self,
        ctx: &RunContext,
        catalog: &Catalog,
        emitter: &str,
        config: &EmitConfig,
    ) -> Result<PipelineOutput> {
        let emitter = self.emitters.get(emitter)?;
        let mut result = self.consolidate(ctx, catalog).await?;
        let plan = plan_deployment(&result)?;
        info!(services = plan.services.len(), stacks = plan.stacks.len(), "deployment order computed");

        ctx.check()?;
        emitter.validate(&result, config)?;
        let artifacts = emitter.emit(ctx, &result, config)?;
        result.mark_emitted()?;
        info!(
            emitter = emitter.name(),
            files = artifacts.len(),
            digest = %artifacts.digest(),
            "emitted artifacts"
        );
        Ok(PipelineOutput {
            result,
            plan,
            artifacts,
        })
    }

    /// [`Pipeline::run`] on a private multi-threaded runtime, for callers without one.
    pub fn run_blocking(
        &self,
        ctx: &RunContext,
        catalog: &Catalog,
        emitter: &str,
        config: &EmitConfig,
    ) -> Result<PipelineOutput> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.workers)
            .enable_all()
            .build()
            .map_err(|e| MigrateError::internal(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.run(ctx, catalog, emitter, config))
    }

    /// Pick a unique service name for every resource that will be converted,
    /// in resource-id order. Later duplicates get `-2`, `-3` suffixes.
    fn assign_service_names(
        &self,
        ctx: &RunContext,
        catalog: &Catalog,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let mut resources: Vec<&Resource> = catalog.resources.iter().collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));

        let mut names = BTreeMap::new();
        let mut used = BTreeSet::new();
        let mut warnings = Vec::new();
        for resource in resources {
            let Ok(converter) = self.registry.get(&resource.kind) else {
                continue;
            };
            if !converter.containerizable() || converter.validate(resource).is_err() {
                continue;
            }
            let base = ctx.service_name(resource);
            let name = unique_name(&base, &used);
            if name != base {
                warnings.push(format!(
                    "service name '{base}' from resource '{}' is already taken; renamed to '{name}'",
                    resource.id
                ));
            }
            used.insert(name.clone());
            names.insert(resource.id.clone(), name);
        }
        (names, warnings)
    }

    async fn convert_all(&self, ctx: &RunContext, catalog: &Catalog) -> Result<Vec<Outcome>> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for resource in &catalog.resources {
            ctx.check()?;
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MigrateError::internal(format!("worker pool closed: {e}")))?;
            let registry = self.registry.clone();
            let ctx = ctx.clone();
            let resource = resource.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                dispatch(&registry, &ctx, &resource)
            });
        }

        let mut outcomes = Vec::with_capacity(catalog.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| MigrateError::internal(format!("conversion task failed: {e}")))??;
            outcomes.push(outcome);
        }
        // completion order is arbitrary
        outcomes.sort_by(|a, b| a.resource_id().cmp(b.resource_id()));
        Ok(outcomes)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Informational graph pass. Cycles and dangling references become warnings.
fn check_graph(catalog: &Catalog) -> Vec<String> {
    let mut warnings = Vec::new();
    let (graph, unresolved) = ResourceGraph::from_catalog(catalog);
    for missing in unresolved {
        warn!(resource = %missing.resource_id, missing = %missing.missing, "unresolved dependency");
        warnings.push(format!(
            "resource '{}' depends on unknown resource '{}'",
            missing.resource_id, missing.missing
        ));
    }
    match graph.topological_order() {
        Ok(order) => debug!(count = order.len(), "resource graph is acyclic"),
        Err(MigrateError::CircularDependency { ids }) => {
            warn!(?ids, "resource dependency cycle");
            warnings.push(format!(
                "resource dependency cycle between {}",
                ids.join(", ")
            ));
        }
        Err(other) => warnings.push(other.to_string()),
    }
    warnings
}

fn unique_name(base: &str, used: &BTreeSet<String>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Catch collisions the pre-assigned names cannot see, such as a converter's
/// extra service landing on another resource's name. Results must already be
/// sorted by resource id.
fn dedupe_service_names(results: &mut [ConversionResult]) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut used = BTreeSet::new();
    for result in results.iter_mut() {
        let resource_id = result.resource_id.clone();
        let services = std::iter::once(&mut result.service).chain(result.additional_services.iter_mut());
        for service in services {
            if used.insert(service.name.clone()) {
                continue;
            }
            let renamed = unique_name(&service.name, &used);
            warnings.push(format!(
                "service name '{}' from resource '{resource_id}' is already taken; renamed to '{renamed}'",
                service.name
            ));
            used.insert(renamed.clone());
            service.name = renamed;
        }
    }
    warnings
}

/// Turn resource-level `depends_on` into service-level `depends_on`.
fn link_dependencies(
    catalog: &Catalog,
    results: &mut [ConversionResult],
    unconverted: &BTreeSet<&str>,
) -> Vec<String> {
    let service_of: BTreeMap<String, String> = results
        .iter()
        .map(|r| (r.resource_id.clone(), r.service.name.clone()))
        .collect();
    let mut warnings = Vec::new();
    for result in results.iter_mut() {
        let Some(resource) = catalog.get(&result.resource_id) else {
            continue;
        };
        for dep in &resource.depends_on {
            if let Some(target) = service_of.get(dep) {
                if *target != result.service.name {
                    result.service.depends_on.push(target.clone());
                }
            } else if unconverted.contains(dep.as_str()) {
                warnings.push(format!(
                    "service '{}' depends on '{dep}', which stays on the provider; point it at the existing endpoint",
                    result.service.name
                ));
            }
        }
        let mut seen = BTreeSet::new();
        result.service.depends_on.retain(|d| seen.insert(d.clone()));
    }
    warnings
}
