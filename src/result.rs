use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<u16>,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(container: u16) -> Self {
        PortMapping {
            host: None,
            container,
            protocol: Protocol::Tcp,
        }
    }

    pub fn published(host: u16, container: u16) -> Self {
        PortMapping {
            host: Some(host),
            container,
            protocol: Protocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Named volume or relative host path.
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeMount {
    pub fn named(source: impl Into<String>, target: impl Into<String>) -> Self {
        VolumeMount {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_bind(&self) -> bool {
        self.source.starts_with("./") || self.source.starts_with('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
}

impl HealthCheck {
    pub fn cmd<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut test = vec!["CMD".to_string()];
        test.extend(args.into_iter().map(Into::into));
        HealthCheck {
            test,
            interval: "10s".to_string(),
            timeout: "5s".to_string(),
            retries: 5,
            start_period: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpus.is_none() && self.memory.is_none()
    }
}

/// Target-side service produced for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "ResourceLimits::is_empty")]
    pub limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        ServiceDefinition {
            name: name.into(),
            image: image.into(),
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn port(mut self, port: PortMapping) -> Self {
        self.ports.push(port);
        self
    }

    pub fn volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    pub fn depends(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if !self.depends_on.contains(&service) {
            self.depends_on.push(service);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl VolumeDefinition {
    pub fn local(name: impl Into<String>) -> Self {
        VolumeDefinition {
            name: name.into(),
            driver: None,
            labels: BTreeMap::new(),
        }
    }
}

/// Everything one converter produced for one resource.
///
/// The side channels keep insertion order so repeated conversions compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub service: ServiceDefinition,
    pub warnings: Vec<String>,
    pub manual_steps: Vec<String>,
    pub config_files: IndexMap<String, Vec<u8>>,
    pub scripts: IndexMap<String, Vec<u8>>,
    pub additional_services: Vec<ServiceDefinition>,
    pub additional_volumes: Vec<VolumeDefinition>,
}

impl ConversionResult {
    pub fn new(resource_id: impl Into<String>, kind: ResourceKind, service: ServiceDefinition) -> Self {
        ConversionResult {
            resource_id: resource_id.into(),
            kind,
            service,
            warnings: Vec::new(),
            manual_steps: Vec::new(),
            config_files: IndexMap::new(),
            scripts: IndexMap::new(),
            additional_services: Vec::new(),
            additional_volumes: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn manual_step(&mut self, step: impl Into<String>) {
        self.manual_steps.push(step.into());
    }

    pub fn add_config_file(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.config_files.insert(path.into(), content.into());
    }

    pub fn add_script(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.scripts.insert(path.into(), content.into());
    }

    pub fn add_volume(&mut self, volume: VolumeDefinition) {
        if !self.additional_volumes.iter().any(|v| v.name == volume.name) {
            self.additional_volumes.push(volume);
        }
    }

    /// Primary service followed by any additional ones.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        std::iter::once(&self.service).chain(self.additional_services.iter())
    }
}
