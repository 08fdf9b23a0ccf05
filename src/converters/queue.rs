use crate::{
    converter::{Converter, RunContext, ensure_kind},
    error::{MigrateError, Result},
    model::{Resource, ResourceKind},
    result::{ConversionResult, HealthCheck, PortMapping, ServiceDefinition, VolumeDefinition, VolumeMount},
};

/// Message queue or topic -> RabbitMQ, with a definitions file declaring the queue.
#[derive(Debug, Clone)]
pub struct QueueConverter {
    kind: ResourceKind,
}

impl QueueConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for QueueConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)
    }

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        ctx.check()?;
        let name = ctx.service_name(resource);
        let volume = format!("{name}-data");
        let definitions_path = format!("config/{name}/definitions.json");
        let fifo = resource.config_bool("fifo_queue").unwrap_or(false);

        let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, "rabbitmq:3.13-management-alpine"))
            .env("RABBITMQ_DEFAULT_USER", "${RABBITMQ_USER:-guest}")
            .env("RABBITMQ_DEFAULT_PASS", "${RABBITMQ_PASS:-guest}")
            .env(
                "RABBITMQ_SERVER_ADDITIONAL_ERL_ARGS",
                "-rabbitmq_management load_definitions \"/etc/rabbitmq/definitions.json\"",
            )
            .port(PortMapping::tcp(5672))
            .port(PortMapping::tcp(15672))
            .volume(VolumeMount::named(&volume, "/var/lib/rabbitmq"))
            .volume(VolumeMount::named(format!("./{definitions_path}"), "/etc/rabbitmq/definitions.json").read_only());
        service.healthcheck = Some(HealthCheck::cmd(["rabbitmq-diagnostics", "-q", "ping"]));
        service.networks.push(ctx.network_name.clone());

        let queue_type = if fifo { "quorum" } else { "classic" };
        let definitions = serde_json::json!({
            "vhosts": [{ "name": "/" }],
            "queues": [{
                "name": resource.name,
                "vhost": "/",
                "durable": true,
                "auto_delete": false,
                "arguments": { "x-queue-type": queue_type },
            }],
        });
        let mut body = serde_json::to_vec_pretty(&definitions).map_err(|e| {
            MigrateError::internal(format!("queue definitions for '{name}': {e}"))
        })?;
        body.push(b'\n');

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        result.add_volume(VolumeDefinition::local(volume));
        result.add_config_file(definitions_path, body);
        if fifo {
            result.warn(format!(
                "queue '{name}' was FIFO; quorum queues keep order per consumer only"
            ));
        }
        if resource.config.contains_key("redrive_policy") {
            result.manual_step(format!(
                "Recreate the dead-letter policy for '{name}' as a RabbitMQ policy"
            ));
        }
        Ok(result)
    }
}
