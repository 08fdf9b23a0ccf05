use serde_json::Value;

use crate::{
    converter::{Converter, RunContext, ensure_kind, require_config},
    error::Result,
    model::{Resource, ResourceKind},
    result::{ConversionResult, PortMapping, ResourceLimits, ServiceDefinition},
};

/// Container service (ECS service, Cloud Run, Container Apps) -> the same image.
#[derive(Debug, Clone)]
pub struct ContainerServiceConverter {
    kind: ResourceKind,
}

impl ContainerServiceConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for ContainerServiceConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)?;
        require_config(resource, "image")
    }

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        ctx.check()?;
        let name = ctx.service_name(resource);
        let image = resource.config_str("image").unwrap_or_default();
        let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, image));

        if let Some(Value::Object(env)) = resource.config.get("environment") {
            for (key, value) in env {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                service.environment.insert(key.clone(), value);
            }
        }
        if let Some(port) = resource.config_u64("port").and_then(|p| u16::try_from(p).ok()) {
            service.ports.push(PortMapping::tcp(port));
        }
        if let Some(Value::Array(command)) = resource.config.get("command") {
            service.command = command
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        service.limits = ResourceLimits {
            cpus: resource.config_u64("cpu").map(cpu_units_to_cores),
            memory: resource.config_u64("memory").map(|mb| format!("{mb}m")),
        };
        service.networks.push(ctx.network_name.clone());

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        let replicas = resource.config_u64("desired_count").unwrap_or(1);
        if replicas > 1 {
            result.warn(format!(
                "service '{name}' ran {replicas} replicas; scale with `docker compose up --scale {name}={replicas}`"
            ));
        }
        if image.contains(".dkr.ecr.") || image.contains("gcr.io") || image.contains("pkg.dev") {
            result.manual_step(format!(
                "Mirror image '{image}' to a registry reachable from the new host"
            ));
        }
        if resource.config.contains_key("secrets") {
            result.manual_step(format!(
                "Move the secrets referenced by '{name}' into .env"
            ));
        }
        Ok(result)
    }

    fn declared_dependency_kinds(&self) -> Vec<ResourceKind> {
        let provider = self.kind.provider.as_str();
        match provider {
            "aws" => vec![
                ResourceKind::new(provider, "db_instance"),
                ResourceKind::new(provider, "elasticache_cluster"),
                ResourceKind::new(provider, "s3_bucket"),
                ResourceKind::new(provider, "sqs_queue"),
            ],
            "gcp" => vec![
                ResourceKind::new(provider, "sql_database_instance"),
                ResourceKind::new(provider, "redis_instance"),
                ResourceKind::new(provider, "storage_bucket"),
                ResourceKind::new(provider, "pubsub_topic"),
            ],
            _ => Vec::new(),
        }
    }
}

/// ECS expresses CPU in 1/1024 vCPU units.
fn cpu_units_to_cores(units: u64) -> String {
    let cores = units as f64 / 1024.0;
    let rendered = format!("{cores:.2}");
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
