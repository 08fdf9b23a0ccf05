use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{MigrateError, Result};

/// Typed resource kind, written as `provider:service` (for example `aws:s3_bucket`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKind {
    pub provider: String,
    pub service: String,
}

impl ResourceKind {
    pub fn new(provider: impl Into<String>, service: impl Into<String>) -> Self {
        ResourceKind {
            provider: provider.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.service)
    }
}

impl FromStr for ResourceKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let (provider, service) = s.split_once(':').ok_or_else(|| MigrateError::Parse {
            source_label: "resource kind".to_string(),
            message: format!("'{s}' must look like 'provider:service'"),
        })?;
        let provider = provider.trim();
        let service = service.trim();
        if provider.is_empty() || service.is_empty() {
            return Err(MigrateError::Parse {
                source_label: "resource kind".to_string(),
                message: format!("'{s}' has an empty provider or service"),
            });
        }
        Ok(ResourceKind::new(
            provider.to_ascii_lowercase(),
            service.to_ascii_lowercase(),
        ))
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.to_string()
    }
}

/// A single infrastructure entity. Created once at parse time, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Resource {
            id: id.into(),
            name: name.into(),
            kind,
            config: BTreeMap::new(),
            tags: BTreeMap::new(),
            depends_on: Vec::new(),
            region: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn depending_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        match self.config.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        match self.config.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Parsed collection of resources plus provider metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub provider: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Catalog {
    pub fn new(provider: impl Into<String>, source: impl Into<String>) -> Self {
        Catalog {
            provider: provider.into(),
            source: source.into(),
            region: None,
            resources: Vec::new(),
        }
    }

    /// Append a resource, rejecting ids already present.
    pub fn push(&mut self, resource: Resource) -> Result<()> {
        if self.get(&resource.id).is_some() {
            return Err(MigrateError::validation(
                resource.id.clone(),
                "duplicate resource id in catalog",
            ));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check id uniqueness for catalogs built by deserialization rather than `push`.
    pub fn ensure_unique_ids(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.id.as_str()) {
                return Err(MigrateError::validation(
                    resource.id.clone(),
                    "duplicate resource id in catalog",
                ));
            }
        }
        Ok(())
    }
}
