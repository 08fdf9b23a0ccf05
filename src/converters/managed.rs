use crate::{
    converter::{Converter, RunContext, ensure_kind},
    error::{MigrateError, Result},
    model::{Resource, ResourceKind},
    result::ConversionResult,
};

/// Kinds with no container equivalent (managed clusters, virtual machines).
/// Registered so they are recognized and reported as passthrough instead of unknown.
#[derive(Debug, Clone)]
pub struct ManagedOnlyConverter {
    kind: ResourceKind,
}

impl ManagedOnlyConverter {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }
}

impl Converter for ManagedOnlyConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    fn validate(&self, resource: &Resource) -> Result<()> {
        ensure_kind(resource, &self.kind)
    }

    fn convert(&self, _ctx: &RunContext, resource: &Resource) -> Result<ConversionResult> {
        Err(MigrateError::validation(
            resource.id.clone(),
            format!("{} has no container representation", self.kind),
        ))
    }

    fn containerizable(&self) -> bool {
        false
    }

    fn passthrough_hint(&self, resource: &Resource) -> String {
        let service = self.kind.service.as_str();
        if service.contains("cluster") {
            format!(
                "Recreate cluster '{}' on a self-hosted Kubernetes distribution (k3s, kubeadm) and redeploy its workloads",
                resource.name
            )
        } else {
            format!(
                "Provision a host for '{}' and reinstall its software; virtual machines are not converted",
                resource.name
            )
        }
    }
}
