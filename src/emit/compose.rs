use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{ArtifactSet, EmitConfig, Emitter, report::render_migration_report};
use crate::{
    consolidate::{ConsolidatedResult, Stack},
    converter::RunContext,
    error::{MigrateError, Result},
    ordering::{DeploymentPlan, plan_deployment},
    result::{Protocol, ServiceDefinition, VolumeDefinition},
};

lazy_static! {
    static ref PROJECT_NAME: Regex = Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap();
    static ref ENV_REFERENCE: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::?[-?]([^}]*))?\}").unwrap();
}

const COMPOSE_FILE: &str = "docker-compose.yml";
const DEPLOY_SCRIPT: &str = "deploy.sh";
const ENV_EXAMPLE: &str = ".env.example";
const REPORT_FILE: &str = "MIGRATION.md";

#[derive(Debug, Serialize)]
struct ComposeFile {
    name: String,
    services: IndexMap<String, ComposeService>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    volumes: BTreeMap<String, ComposeVolume>,
    networks: BTreeMap<String, ComposeNetwork>,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    command: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    expose: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    depends_on: IndexMap<String, DependsOn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<ComposeHealthcheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy: Option<ComposeDeploy>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restart: Option<String>,
}

#[derive(Debug, Serialize)]
struct DependsOn {
    condition: &'static str,
}

#[derive(Debug, Serialize)]
struct ComposeHealthcheck {
    test: Vec<String>,
    interval: String,
    timeout: String,
    retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_period: Option<String>,
}

#[derive(Debug, Serialize)]
struct ComposeDeploy {
    resources: ComposeResources,
}

#[derive(Debug, Serialize)]
struct ComposeResources {
    limits: BTreeMap<&'static str, String>,
}

#[derive(Debug, Default, Serialize)]
struct ComposeVolume {
    #[serde(skip_serializing_if = "Option::is_none")]
    driver: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ComposeNetwork {
    name: String,
}

/// Single `docker-compose.yml` with every service in deployment order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeEmitter;

/// One compose file per stack plus a `deploy.sh` that merges them in stack order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeStacksEmitter;

impl Emitter for ComposeEmitter {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn primary_file(&self) -> &'static str {
        COMPOSE_FILE
    }

    fn validate(&self, result: &ConsolidatedResult, config: &EmitConfig) -> Result<()> {
        validate_common(self.name(), result, config)
    }

    fn emit(
        &self,
        ctx: &RunContext,
        result: &ConsolidatedResult,
        config: &EmitConfig,
    ) -> Result<ArtifactSet> {
        ctx.check()?;
        let plan = plan_deployment(result)?;
        let services = services_by_name(result);
        let ordered: Vec<&ServiceDefinition> = plan
            .services
            .iter()
            .filter_map(|name| services.get(name.as_str()).copied())
            .collect();
        let volumes = result.stacks.iter().flat_map(|s| s.volumes().iter());
        let document = compose_document(config, &ordered, volumes, &services);

        let mut artifacts = ArtifactSet::new();
        artifacts.insert(COMPOSE_FILE, render_yaml(self.name(), &document, config)?)?;
        finish_artifacts(self.name(), &mut artifacts, result, &plan, config)?;
        Ok(artifacts)
    }
}

impl Emitter for ComposeStacksEmitter {
    fn name(&self) -> &'static str {
        "compose-stacks"
    }

    fn primary_file(&self) -> &'static str {
        DEPLOY_SCRIPT
    }

    fn validate(&self, result: &ConsolidatedResult, config: &EmitConfig) -> Result<()> {
        validate_common(self.name(), result, config)
    }

    fn emit(
        &self,
        ctx: &RunContext,
        result: &ConsolidatedResult,
        config: &EmitConfig,
    ) -> Result<ArtifactSet> {
        ctx.check()?;
        let plan = plan_deployment(result)?;
        let services = services_by_name(result);
        let mut artifacts = ArtifactSet::new();
        let mut files = Vec::new();

        for (index, (stack, order)) in result.stacks.iter().zip(&plan.stacks).enumerate() {
            let ordered: Vec<&ServiceDefinition> = order
                .services
                .iter()
                .filter_map(|name| services.get(name.as_str()).copied())
                .collect();
            let document =
                compose_document(config, &ordered, stack.volumes().iter(), &services);
            let path = stack_file_name(index, stack);
            artifacts.insert(path.clone(), render_yaml(self.name(), &document, config)?)?;
            files.push(path);
        }

        let mut script = String::from("#!/bin/sh\nset -eu\ncd \"$(dirname \"$0\")\"\n");
        script.push_str(&format!("docker compose -p {}", config.project_name));
        for file in &files {
            script.push_str(&format!(" \\\n  -f {file}"));
        }
        script.push_str(" \\\n  up -d \"$@\"\n");
        artifacts.insert(DEPLOY_SCRIPT, script)?;

        finish_artifacts(self.name(), &mut artifacts, result, &plan, config)?;
        Ok(artifacts)
    }
}

fn stack_file_name(index: usize, stack: &Stack) -> String {
    format!("stacks/{:02}-{}.yml", index + 1, stack.name())
}

fn validate_common(emitter: &str, result: &ConsolidatedResult, config: &EmitConfig) -> Result<()> {
    if !PROJECT_NAME.is_match(&config.project_name) {
        return Err(MigrateError::Emit {
            emitter: emitter.to_string(),
            message: format!(
                "project name '{}' must match {}",
                config.project_name,
                PROJECT_NAME.as_str()
            ),
        });
    }
    let mut seen = BTreeSet::new();
    for service in result.services() {
        if !PROJECT_NAME.is_match(&service.name) {
            return Err(MigrateError::Emit {
                emitter: emitter.to_string(),
                message: format!("service name '{}' is not a valid compose name", service.name),
            });
        }
        if service.image.trim().is_empty() {
            return Err(MigrateError::Emit {
                emitter: emitter.to_string(),
                message: format!("service '{}' has no image", service.name),
            });
        }
        if !seen.insert(service.name.as_str()) {
            return Err(MigrateError::Emit {
                emitter: emitter.to_string(),
                message: format!("service '{}' is defined twice", service.name),
            });
        }
    }
    Ok(())
}

fn services_by_name(result: &ConsolidatedResult) -> BTreeMap<&str, &ServiceDefinition> {
    result.services().map(|s| (s.name.as_str(), s)).collect()
}

fn compose_document<'a>(
    config: &EmitConfig,
    ordered: &[&ServiceDefinition],
    volumes: impl Iterator<Item = &'a VolumeDefinition>,
    all_services: &BTreeMap<&str, &ServiceDefinition>,
) -> ComposeFile {
    let mut services = IndexMap::new();
    let mut networks = BTreeMap::new();
    networks.insert(
        config.network_name.clone(),
        ComposeNetwork {
            name: config.network_name.clone(),
        },
    );

    for service in ordered {
        for network in &service.networks {
            networks
                .entry(network.clone())
                .or_insert_with(|| ComposeNetwork {
                    name: network.clone(),
                });
        }
        services.insert(service.name.clone(), compose_service(service, all_services));
    }

    let volumes = volumes
        .map(|v| {
            (
                v.name.clone(),
                ComposeVolume {
                    driver: v.driver.clone(),
                    labels: v.labels.clone(),
                },
            )
        })
        .collect();

    ComposeFile {
        name: config.project_name.clone(),
        services,
        volumes,
        networks,
    }
}

fn compose_service(
    service: &ServiceDefinition,
    all_services: &BTreeMap<&str, &ServiceDefinition>,
) -> ComposeService {
    let mut ports = Vec::new();
    let mut expose = Vec::new();
    for port in &service.ports {
        let suffix = match port.protocol {
            Protocol::Tcp => "",
            Protocol::Udp => "/udp",
        };
        match port.host {
            Some(host) => ports.push(format!("{host}:{}{suffix}", port.container)),
            None => expose.push(format!("{}{suffix}", port.container)),
        }
    }

    let volumes = service
        .volumes
        .iter()
        .map(|m| {
            let mode = if m.read_only { ":ro" } else { "" };
            format!("{}:{}{mode}", m.source, m.target)
        })
        .collect();

    // unknown references were already dropped by the deployment plan
    let mut depends_on = IndexMap::new();
    for dep in &service.depends_on {
        if let Some(target) = all_services.get(dep.as_str()) {
            let condition = if target.healthcheck.is_some() {
                "service_healthy"
            } else {
                "service_started"
            };
            depends_on.insert(dep.clone(), DependsOn { condition });
        }
    }

    let deploy = (!service.limits.is_empty()).then(|| {
        let mut limits = BTreeMap::new();
        if let Some(cpus) = &service.limits.cpus {
            limits.insert("cpus", cpus.clone());
        }
        if let Some(memory) = &service.limits.memory {
            limits.insert("memory", memory.clone());
        }
        ComposeDeploy {
            resources: ComposeResources { limits },
        }
    });

    ComposeService {
        image: service.image.clone(),
        command: service.command.clone(),
        environment: service.environment.clone(),
        ports,
        expose,
        volumes,
        networks: service.networks.clone(),
        depends_on,
        healthcheck: service.healthcheck.as_ref().map(|h| ComposeHealthcheck {
            test: h.test.clone(),
            interval: h.interval.clone(),
            timeout: h.timeout.clone(),
            retries: h.retries,
            start_period: h.start_period.clone(),
        }),
        deploy,
        labels: service.labels.clone(),
        restart: service.restart.clone(),
    }
}

fn render_yaml(emitter: &str, document: &ComposeFile, config: &EmitConfig) -> Result<String> {
    let body = serde_yaml_bw::to_string(document).map_err(|e| MigrateError::Emit {
        emitter: emitter.to_string(),
        message: format!("compose serialization: {e}"),
    })?;
    Ok(format!(
        "# Generated by homeport for project '{}'. Re-run the conversion instead of editing.\n{body}",
        config.project_name
    ))
}

/// Side files, `.env.example`, the report and surfaced diagnostics.
fn finish_artifacts(
    emitter: &str,
    artifacts: &mut ArtifactSet,
    result: &ConsolidatedResult,
    plan: &DeploymentPlan,
    config: &EmitConfig,
) -> Result<()> {
    artifacts.warnings = result.warnings.clone();
    artifacts.manual_steps = result.manual_steps.clone();
    for (service, missing) in &plan.dropped_references {
        artifacts.warnings.push(format!(
            "service '{service}' depends on unknown service '{missing}'; the reference was dropped"
        ));
    }

    for stack in &result.stacks {
        for (path, body) in stack.config_files().iter().chain(stack.scripts()) {
            if artifacts.get(path).is_some() {
                artifacts
                    .warnings
                    .push(format!("side file '{path}' produced by two stacks; keeping the first"));
                continue;
            }
            artifacts.insert(path.clone(), body.clone())?;
        }
    }

    let env = env_example(result);
    if !env.is_empty() {
        artifacts.insert(ENV_EXAMPLE, env)?;
    }
    if config.include_report {
        let report = render_migration_report(result, plan, config).map_err(|e| {
            MigrateError::Emit {
                emitter: emitter.to_string(),
                message: e.to_string(),
            }
        })?;
        artifacts.insert(REPORT_FILE, report)?;
    }
    Ok(())
}

/// Every `${VAR}` referenced by service environments, with its default when one is given.
fn env_example(result: &ConsolidatedResult) -> String {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    for service in result.services() {
        for value in service.environment.values() {
            for caps in ENV_REFERENCE.captures_iter(value) {
                let name = caps[1].to_string();
                let default = caps
                    .get(0)
                    .filter(|whole| whole.as_str().contains(":-"))
                    .and_then(|_| caps.get(2))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                vars.entry(name).or_insert(default);
            }
        }
    }
    vars.iter()
        .map(|(name, default)| format!("{name}={default}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consolidate::Consolidator,
        model::ResourceKind,
        result::{ConversionResult, HealthCheck, PortMapping},
    };

    fn sample() -> ConsolidatedResult {
        let mut db = ServiceDefinition::new("db", "postgres:16-alpine")
            .env("POSTGRES_PASSWORD", "${DB_PASSWORD:?set DB_PASSWORD}")
            .port(PortMapping::tcp(5432));
        db.healthcheck = Some(HealthCheck::cmd(["pg_isready"]));
        let api = ServiceDefinition::new("api", "ghcr.io/acme/api:1")
            .env("LOG", "${LOG_LEVEL:-info}")
            .port(PortMapping::published(8080, 8080))
            .depends("db");
        let results = vec![
            ConversionResult::new("r-api", ResourceKind::new("aws", "ecs_service"), api),
            ConversionResult::new("r-db", ResourceKind::new("aws", "db_instance"), db),
        ];
        Consolidator::new()
            .consolidate(results, Vec::new(), Vec::new())
            .unwrap()
    }

    #[test]
    fn compose_lists_services_in_deployment_order() {
        let artifacts = ComposeEmitter
            .emit(&RunContext::default(), &sample(), &EmitConfig::default())
            .unwrap();
        let compose = artifacts.get_str(COMPOSE_FILE).unwrap();
        let db_at = compose.find("\n  db:").unwrap();
        let api_at = compose.find("\n  api:").unwrap();
        assert!(db_at < api_at);
        assert!(compose.contains("condition: service_healthy"));
        assert!(compose.contains("8080:8080"));
    }

    #[test]
    fn env_example_lists_referenced_variables() {
        assert_eq!(env_example(&sample()), "DB_PASSWORD=\nLOG_LEVEL=info\n");
    }

    #[test]
    fn stacks_emitter_writes_one_file_per_stack() {
        let artifacts = ComposeStacksEmitter
            .emit(&RunContext::default(), &sample(), &EmitConfig::default())
            .unwrap();
        assert!(artifacts.get("stacks/01-database.yml").is_some());
        assert!(artifacts.get("stacks/02-application.yml").is_some());
        let script = artifacts.get_str(DEPLOY_SCRIPT).unwrap();
        assert!(script.contains("-f stacks/01-database.yml"));
    }

    #[test]
    fn invalid_project_name_fails_validation() {
        let config = EmitConfig {
            project_name: "Bad Name".to_string(),
            ..EmitConfig::default()
        };
        assert!(ComposeEmitter.validate(&sample(), &config).is_err());
    }
}
