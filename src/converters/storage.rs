use crate::{
    converter::{Converter, RunContext, ensure_kind},
    error::Result,
    model::{Resource, ResourceKind},
    result::{ConversionResult, HealthCheck, PortMapping, ServiceDefinition, VolumeDefinition, VolumeMount},
};

const MINIO_IMAGE: &str = "minio/minio:RELEASE.2024-10-13T13-34-11Z";

/// Object storage bucket -> MinIO.
#[derive(Debug, Clone)]
pub struct ObjectStorageConverter {
    kind: ResourceKind,
}

impl ObjectStorageConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for ObjectStorageConverter {
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
        let bucket = resource
            .config_str("bucket")
            .unwrap_or(resource.name.as_str())
            .to_string();

        let mut service = ServiceDefinition::new(&name, ctx.image_for(&self.kind, MINIO_IMAGE))
            .env("MINIO_ROOT_USER", "${MINIO_ROOT_USER:-minioadmin}")
            .env("MINIO_ROOT_PASSWORD", "${MINIO_ROOT_PASSWORD:?set MINIO_ROOT_PASSWORD}")
            .port(PortMapping::tcp(9000))
            .port(PortMapping::tcp(9001))
            .volume(VolumeMount::named(&volume, "/data"));
        service.command = vec![
            "server".to_string(),
            "/data".to_string(),
            "--console-address".to_string(),
            ":9001".to_string(),
        ];
        service.healthcheck = Some(HealthCheck::cmd(["mc", "ready", "local"]));
        service.networks.push(ctx.network_name.clone());

        let mut result = ConversionResult::new(&resource.id, resource.kind.clone(), service);
        result.add_volume(VolumeDefinition::local(volume));

        if resource.config_bool("versioning").unwrap_or(false) {
            result.warn(format!(
                "bucket '{bucket}' uses versioning; enable it with `mc version enable` after start-up"
            ));
        }
        if resource.config.contains_key("lifecycle_rule") {
            result.warn(format!(
                "bucket '{bucket}' lifecycle rules are not translated"
            ));
        }
        result.add_script(
            format!("scripts/{name}-sync.sh"),
            format!(
                "#!/bin/sh\nset -eu\nmc alias set local http://localhost:9000 \"$MINIO_ROOT_USER\" \"$MINIO_ROOT_PASSWORD\"\nmc mb --ignore-existing local/{bucket}\nmc mirror \"${{SOURCE_ALIAS:?}}/{bucket}\" local/{bucket}\n"
            ),
        );
        result.manual_step(format!(
            "Copy objects from bucket '{bucket}' with scripts/{name}-sync.sh"
        ));
        Ok(result)
    }
}
