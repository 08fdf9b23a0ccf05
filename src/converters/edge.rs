use crate::{
    converter::{Converter, RunContext, ensure_kind},
    error::Result,
    model::{Resource, ResourceKind},
    result::{ConversionResult, PortMapping, ServiceDefinition, VolumeMount},
};

const TRAEFIK_IMAGE: &str = "traefik:v3.1";

/// Cloud load balancer -> Traefik reverse proxy with the docker provider.
#[derive(Debug, Clone)]
pub struct LoadBalancerConverter {
    kind: ResourceKind,
}

impl LoadBalancerConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for LoadBalancerConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)
    }

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        ctx.check()?;
        let name = ctx.service_name(resource);
        let config_path = format!("config/{name}/traefik.yml");
        let https = resource
            .config_str("protocol")
            .is_some_and(|p| p.eq_ignore_ascii_case("https"))
            || resource.config.contains_key("certificate_arn");

        let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, TRAEFIK_IMAGE))
            .port(PortMapping::published(80, 80))
            .volume(VolumeMount::named("/var/run/docker.sock", "/var/run/docker.sock").read_only())
            .volume(VolumeMount::named(format!("./{config_path}"), "/etc/traefik/traefik.yml").read_only());
        if https {
            service = service.port(PortMapping::published(443, 443));
        }
        service.networks.push(ctx.network_name.clone());

        let mut config = String::from("entryPoints:\n  web:\n    address: \":80\"\n");
        if https {
            config.push_str("  websecure:\n    address: \":443\"\n");
        }
        config.push_str(&format!(
            "providers:\n  docker:\n    exposedByDefault: false\n    network: {}\n",
            ctx.network_name
        ));

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        result.add_config_file(config_path, config.into_bytes());
        result.manual_step(format!(
            "Add traefik.http.routers labels to the services behind '{name}'"
        ));
        if https {
            result.warn(format!(
                "load balancer '{name}' terminated TLS with a managed certificate; configure a certificate resolver"
            ));
        }
        Ok(result)
    }

    fn declared_dependency_kinds(&self) -> Vec<ResourceKind> {
        match self.kind.provider.as_str() {
            "aws" => vec![ResourceKind::new("aws", "ecs_service")],
            "gcp" => vec![ResourceKind::new("gcp", "cloud_run_service")],
            _ => Vec::new(),
        }
    }
}
