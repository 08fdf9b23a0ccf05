use jsonschema::Draft;
use serde_json::Value;

use super::{CatalogParser, Detection};
use crate::{
    error::{MigrateError, Result, SchemaErrorDetail},
    model::Catalog,
};

const EMBEDDED_SCHEMA: &str = include_str!("../../schemas/catalog.schema.json");

/// The native catalog document, YAML or JSON, checked against the embedded schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogDocumentParser;

impl CatalogParser for CatalogDocumentParser {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn parse(&self, source: &str, source_label: &str) -> Result<Catalog> {
        let doc = to_json(source, source_label)?;
        validate_json(&doc, source_label)?;
        let mut catalog: Catalog = serde_json::from_value(doc).map_err(|e| MigrateError::Parse {
            source_label: source_label.to_string(),
            message: e.to_string(),
        })?;
        if catalog.source.is_empty() {
            catalog.source = source_label.to_string();
        }
        for resource in &mut catalog.resources {
            if resource.name.trim().is_empty() {
                resource.name = resource.id.clone();
            }
            if resource.region.is_none() {
                resource.region = catalog.region.clone();
            }
        }
        catalog.ensure_unique_ids()?;
        Ok(catalog)
    }

    fn autodetect(&self, source: &str) -> Detection {
        let Ok(doc) = to_json(source, "<detect>") else {
            return Detection::none();
        };
        let Some(object) = doc.as_object() else {
            return Detection::none();
        };
        let has_provider = object.get("provider").is_some_and(Value::is_string);
        let resources = object.get("resources").and_then(Value::as_array);
        match (has_provider, resources) {
            (true, Some(resources)) => {
                let typed = resources
                    .iter()
                    .all(|r| r.get("kind").and_then(Value::as_str).is_some_and(|k| k.contains(':')));
                Detection::matched(if typed { 0.9 } else { 0.6 })
            }
            (false, Some(_)) => Detection::matched(0.2),
            _ => Detection::none(),
        }
    }
}

fn to_json(source: &str, source_label: &str) -> Result<Value> {
    let yaml: serde_yaml_bw::Value = serde_yaml_bw::from_str(source).map_err(|e| {
        let position = e
            .location()
            .map(|loc| format!(" at line {} column {}", loc.line(), loc.column()))
            .unwrap_or_default();
        MigrateError::Parse {
            source_label: source_label.to_string(),
            message: format!("{e}{position}"),
        }
    })?;
    serde_json::to_value(&yaml).map_err(|e| MigrateError::Parse {
        source_label: source_label.to_string(),
        message: format!("yaml->json: {e}"),
    })
}

fn validate_json(doc: &Value, source_label: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(EMBEDDED_SCHEMA)
        .map_err(|e| MigrateError::internal(format!("catalog schema parse: {e}")))?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|e| MigrateError::internal(format!("catalog schema compile: {e}")))?;
    let details: Vec<SchemaErrorDetail> = validator
        .iter_errors(doc)
        .map(|e| {
            let pointer = e.instance_path().to_string();
            let pointer = if pointer.is_empty() {
                "/".to_string()
            } else {
                pointer
            };
            SchemaErrorDetail {
                message: e.to_string(),
                json_pointer: pointer,
            }
        })
        .collect();
    if !details.is_empty() {
        let message = details
            .iter()
            .map(|d| format!("{source_label}{}: {}", d.json_pointer, d.message))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(MigrateError::Schema { message, details });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"
provider: aws
region: eu-west-1
resources:
  - id: bucket-1
    name: assets
    kind: aws:s3_bucket
    config:
      versioning: true
  - id: svc-1
    kind: aws:ecs_service
    depends_on: [bucket-1]
    tags:
      team: web
"#;

    #[test]
    fn parses_yaml_document() {
        let catalog = CatalogDocumentParser.parse(DOC, "inline.yaml").unwrap();
        assert_eq!(catalog.provider, "aws");
        assert_eq!(catalog.source, "inline.yaml");
        assert_eq!(catalog.len(), 2);
        let svc = catalog.get("svc-1").unwrap();
        assert_eq!(svc.name, "svc-1");
        assert_eq!(svc.region.as_deref(), Some("eu-west-1"));
        assert_eq!(svc.depends_on, ["bucket-1"]);
    }

    #[test]
    fn schema_errors_carry_pointers() {
        let bad = "provider: aws\nresources:\n  - id: x\n    kind: no-colon\n";
        let err = CatalogDocumentParser.parse(bad, "bad.yaml").unwrap_err();
        match err {
            MigrateError::Schema { details, .. } => {
                assert_eq!(details[0].json_pointer, "/resources/0/kind");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dup = "provider: aws\nresources:\n  - {id: a, kind: 'aws:lb'}\n  - {id: a, kind: 'aws:lb'}\n";
        let err = CatalogDocumentParser.parse(dup, "dup.yaml").unwrap_err();
        assert!(matches!(err, MigrateError::Validation { .. }));
    }
}
