use homeport::{
    Converter, ConverterRegistry, MigrateError, RegistryBuilder, Resource, ResourceKind, RunContext,
    converters::{ContainerServiceConverter, ObjectStorageConverter},
    result::{ConversionResult, ServiceDefinition},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

/// Converter used only to exercise registration rules.
struct EchoConverter(ResourceKind);

impl Converter for EchoConverter {
    fn resource_kind(&self) -> ResourceKind {
        self.0.clone()
    }

    fn validate(&self, resource: &Resource) -> homeport::Result<()> {
        homeport::converter::ensure_kind(resource, &self.0)
    }

    fn convert(&self, _ctx: &RunContext, resource: &Resource) -> homeport::Result<ConversionResult> {
        Ok(ConversionResult::new(
            &resource.id,
            resource.kind.clone(),
            ServiceDefinition::new(&resource.name, "busybox:1.36"),
        ))
    }
}

#[test]
fn registered_converter_is_returned_for_its_kind() {
    let kind = ResourceKind::new("acme", "widget");
    let mut builder = RegistryBuilder::new();
    builder
        .register(kind.clone(), Arc::new(EchoConverter(kind.clone())))
        .unwrap();
    let registry = builder.build();

    let converter = registry.get(&kind).unwrap();
    assert_eq!(converter.resource_kind(), kind);
    assert_eq!(registry.kinds().cloned().collect::<Vec<_>>(), [kind]);
}

#[test]
fn missing_kind_is_not_found() {
    let registry = ConverterRegistry::builtin();
    let err = registry.get(&ResourceKind::new("aws", "kinesis_stream")).err().unwrap();
    assert!(matches!(err, MigrateError::NotFound { what: "converter", .. }));
}

#[test]
fn duplicate_and_mismatched_registrations_fail() {
    let bucket = ResourceKind::new("aws", "s3_bucket");
    let mut builder = RegistryBuilder::with_builtin_converters();
    let dup = builder.register(bucket.clone(), Arc::new(ObjectStorageConverter::new(bucket.clone())));
    assert!(matches!(dup, Err(MigrateError::Validation { .. })));

    let mut builder = RegistryBuilder::new();
    let mismatch = builder.register(
        ResourceKind::new("aws", "lb"),
        Arc::new(ObjectStorageConverter::new(bucket)),
    );
    assert!(matches!(mismatch, Err(MigrateError::Validation { .. })));
}

#[test]
fn validate_rejects_kind_mismatch_and_missing_fields() {
    let kind = ResourceKind::new("aws", "ecs_service");
    let converter = ContainerServiceConverter::new(kind.clone());

    let wrong = Resource::new("r1", "api", ResourceKind::new("aws", "lb"));
    assert!(converter.validate(&wrong).is_err());

    let unnamed = Resource::new("r1", "  ", kind.clone()).with_config("image", json!("api:1"));
    assert!(converter.validate(&unnamed).is_err());

    let no_image = Resource::new("r1", "api", kind.clone());
    assert!(converter.validate(&no_image).is_err());

    let ok = Resource::new("r1", "api", kind).with_config("image", json!("api:1"));
    assert!(converter.validate(&ok).is_ok());
}

#[test]
fn conversion_is_repeatable() {
    let registry = ConverterRegistry::builtin();
    let kind = ResourceKind::new("aws", "db_instance");
    let resource = Resource::new("db-1", "Orders DB", kind.clone())
        .with_config("engine", json!("postgres"))
        .with_config("multi_az", json!(true));
    let converter = registry.get(&kind).unwrap();
    converter.validate(&resource).unwrap();

    let ctx = RunContext::default();
    let first = converter.convert(&ctx, &resource).unwrap();
    let second = converter.convert(&ctx, &resource).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.service.name, "orders-db");
}

#[test]
fn registry_snapshot_is_shared_between_clones() {
    let registry = ConverterRegistry::builtin();
    let clone = registry.clone();
    assert_eq!(registry.len(), clone.len());
    assert!(clone.contains(&ResourceKind::new("gcp", "redis_instance")));
}
