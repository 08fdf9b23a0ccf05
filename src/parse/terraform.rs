use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{CatalogParser, Detection};
use crate::{
    error::{MigrateError, Result},
    model::{Catalog, Resource, ResourceKind},
};

/// Terraform provider prefix -> catalog provider name.
const PROVIDER_PREFIXES: &[(&str, &str)] = &[
    ("aws", "aws"),
    ("google", "gcp"),
    ("azurerm", "azure"),
];

/// Attributes tried in order when picking a human-readable name.
const NAME_ATTRIBUTES: &[&str] = &["name", "bucket", "identifier", "cluster_id", "family"];

#[derive(Debug, Deserialize)]
struct StateFile {
    version: u64,
    #[serde(default)]
    resources: Vec<StateResource>,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    #[serde(default)]
    module: Option<String>,
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    instances: Vec<StateInstance>,
}

#[derive(Debug, Deserialize)]
struct StateInstance {
    #[serde(default)]
    index_key: Option<Value>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Terraform state files (format version 4). Only managed resources are read.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformStateParser;

impl CatalogParser for TerraformStateParser {
    fn name(&self) -> &'static str {
        "terraform"
    }

    fn parse(&self, source: &str, source_label: &str) -> Result<Catalog> {
        let state: StateFile = serde_json::from_str(source).map_err(|e| MigrateError::Parse {
            source_label: source_label.to_string(),
            message: e.to_string(),
        })?;
        if state.version != 4 {
            return Err(MigrateError::Parse {
                source_label: source_label.to_string(),
                message: format!("unsupported state format version {}; expected 4", state.version),
            });
        }

        // base address -> instance ids, so dependencies on counted resources resolve
        let mut instances_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut pending = Vec::new();
        for entry in &state.resources {
            if entry.mode != "managed" {
                debug!(address = %address(entry), "skipping data source");
                continue;
            }
            let base = address(entry);
            for instance in &entry.instances {
                let id = instance_id(&base, instance.index_key.as_ref());
                instances_of.entry(base.clone()).or_default().push(id.clone());
                pending.push((id, entry, instance));
            }
        }

        let mut providers = BTreeSet::new();
        let mut regions = BTreeSet::new();
        let mut resources = Vec::with_capacity(pending.len());
        for (id, entry, instance) in pending {
            let kind = kind_for(&entry.resource_type);
            providers.insert(kind.provider.clone());
            let region = instance
                .attributes
                .get("region")
                .or_else(|| instance.attributes.get("location"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(region) = &region {
                regions.insert(region.clone());
            }

            let mut depends_on: Vec<String> = instance
                .dependencies
                .iter()
                .flat_map(|dep| {
                    instances_of
                        .get(dep)
                        .cloned()
                        .unwrap_or_else(|| vec![dep.clone()])
                })
                .filter(|dep| *dep != id)
                .collect();
            depends_on.sort();
            depends_on.dedup();

            resources.push(Resource {
                name: display_name(entry, instance),
                kind,
                config: instance
                    .attributes
                    .iter()
                    .filter(|(key, value)| !value.is_null() && *key != "tags" && *key != "tags_all")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                tags: tags(&instance.attributes),
                depends_on,
                region,
                id,
            });
        }

        let provider = match providers.len() {
            0 => "unknown".to_string(),
            1 => providers.into_iter().next().unwrap_or_default(),
            _ => "mixed".to_string(),
        };
        let mut catalog = Catalog::new(provider, source_label);
        if regions.len() == 1 {
            catalog.region = regions.into_iter().next();
        }
        for resource in resources {
            catalog.push(resource)?;
        }
        Ok(catalog)
    }

    fn autodetect(&self, source: &str) -> Detection {
        let Ok(doc) = serde_json::from_str::<Value>(source) else {
            return Detection::none();
        };
        let has_version = doc.get("version").and_then(Value::as_u64) == Some(4);
        let has_tf_version = doc.get("terraform_version").is_some_and(Value::is_string);
        match (has_version, has_tf_version) {
            (true, true) => Detection::matched(1.0),
            (true, false) | (false, true) => Detection::matched(0.5),
            _ => Detection::none(),
        }
    }
}

fn address(entry: &StateResource) -> String {
    match &entry.module {
        Some(module) => format!("{module}.{}.{}", entry.resource_type, entry.name),
        None => format!("{}.{}", entry.resource_type, entry.name),
    }
}

fn instance_id(base: &str, index_key: Option<&Value>) -> String {
    match index_key {
        Some(Value::Number(n)) => format!("{base}[{n}]"),
        Some(Value::String(s)) => format!("{base}[\"{s}\"]"),
        _ => base.to_string(),
    }
}

/// `aws_s3_bucket` -> `aws:s3_bucket`, `google_redis_instance` -> `gcp:redis_instance`.
fn kind_for(resource_type: &str) -> ResourceKind {
    let (prefix, rest) = resource_type.split_once('_').unwrap_or((resource_type, ""));
    let provider = PROVIDER_PREFIXES
        .iter()
        .find(|(tf, _)| *tf == prefix)
        .map(|(_, name)| *name)
        .unwrap_or(prefix);
    if rest.is_empty() {
        ResourceKind::new(provider, resource_type)
    } else {
        ResourceKind::new(provider, rest)
    }
}

fn display_name(entry: &StateResource, instance: &StateInstance) -> String {
    NAME_ATTRIBUTES
        .iter()
        .find_map(|key| instance.attributes.get(*key).and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| entry.name.clone())
}

fn tags(attributes: &Map<String, Value>) -> BTreeMap<String, String> {
    attributes
        .get("tags")
        .and_then(Value::as_object)
        .map(|tags| {
            tags.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATE: &str = r#"{
  "version": 4,
  "terraform_version": "1.6.2",
  "resources": [
    {
      "mode": "data",
      "type": "aws_caller_identity",
      "name": "current",
      "instances": [{"attributes": {"account_id": "1"}}]
    },
    {
      "mode": "managed",
      "type": "aws_db_instance",
      "name": "main",
      "instances": [{"attributes": {"identifier": "orders", "engine": "postgres", "tags": {"env": "prod"}}}]
    },
    {
      "mode": "managed",
      "type": "aws_ecs_service",
      "name": "api",
      "instances": [
        {"index_key": 0, "attributes": {"name": "api-a", "region": "us-east-1"}, "dependencies": ["aws_db_instance.main"]},
        {"index_key": 1, "attributes": {"name": "api-b", "region": "us-east-1"}, "dependencies": ["aws_db_instance.main"]}
      ]
    }
  ]
}"#;

    #[test]
    fn managed_resources_become_catalog_entries() {
        let catalog = TerraformStateParser.parse(STATE, "terraform.tfstate").unwrap();
        assert_eq!(catalog.provider, "aws");
        assert_eq!(catalog.region.as_deref(), Some("us-east-1"));
        let ids: Vec<_> = catalog.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            ["aws_db_instance.main", "aws_ecs_service.api[0]", "aws_ecs_service.api[1]"]
        );
        let db = catalog.get("aws_db_instance.main").unwrap();
        assert_eq!(db.kind, ResourceKind::new("aws", "db_instance"));
        assert_eq!(db.name, "orders");
        assert_eq!(db.tags.get("env").map(String::as_str), Some("prod"));
        assert!(!db.config.contains_key("tags"));
        let api = catalog.get("aws_ecs_service.api[1]").unwrap();
        assert_eq!(api.depends_on, ["aws_db_instance.main"]);
    }

    #[test]
    fn provider_prefixes_are_normalized() {
        assert_eq!(kind_for("google_redis_instance"), ResourceKind::new("gcp", "redis_instance"));
        assert_eq!(kind_for("azurerm_container_app"), ResourceKind::new("azure", "container_app"));
        assert_eq!(kind_for("random_password"), ResourceKind::new("random", "password"));
    }

    #[test]
    fn older_state_versions_are_rejected() {
        let err = TerraformStateParser
            .parse(r#"{"version": 3, "resources": []}"#, "old.tfstate")
            .unwrap_err();
        assert!(err.to_string().contains("version 3"));
    }
}
