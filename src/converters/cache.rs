use crate::{
    converter::{Converter, RunContext, ensure_kind},
    error::Result,
    model::{Resource, ResourceKind},
    result::{ConversionResult, HealthCheck, PortMapping, ServiceDefinition, VolumeDefinition, VolumeMount},
};

/// In-memory cache cluster -> Redis (or Memcached when the engine says so).
#[derive(Debug, Clone)]
pub struct CacheConverter {
    kind: ResourceKind,
}

impl CacheConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for CacheConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)
    }

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        ctx.check()?;
        let name = ctx.service_name(resource);
        let memcached = resource
            .config_str("engine")
            .is_some_and(|engine| engine.eq_ignore_ascii_case("memcached"));

        if memcached {
            let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, "memcached:1.6-alpine"))
                .port(PortMapping::tcp(11211));
            service.networks.push(ctx.network_name.clone());
            return Ok(ConversionResult::new(&resource.id, resource.kind.clone(), service));
        }

        let volume = format!("{name}-data");
        let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, "redis:7-alpine"))
            .port(PortMapping::tcp(6379))
            .volume(VolumeMount::named(&volume, "/data"));
        service.command = vec![
            "redis-server".to_string(),
            "--appendonly".to_string(),
            "yes".to_string(),
        ];
        service.healthcheck = Some(HealthCheck::cmd(["redis-cli", "ping"]));
        service.networks.push(ctx.network_name.clone());

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        result.add_volume(VolumeDefinition::local(volume));
        if resource.config_u64("num_cache_nodes").unwrap_or(1) > 1 {
            result.warn(format!(
                "cache '{name}' had multiple nodes; a single Redis instance is generated"
            ));
        }
        if resource.config_bool("transit_encryption_enabled").unwrap_or(false) {
            result.manual_step(format!(
                "Configure TLS for '{name}' if clients require in-transit encryption"
            ));
        }
        Ok(result)
    }
}
