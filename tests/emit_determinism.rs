use homeport::{
    Catalog, EmitConfig, EmitterRegistry, MigrateConfig, MigrateError, convert,
    load_catalog_with_source,
};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;

fn shop() -> Catalog {
    let text = fs::read_to_string("fixtures/shop.catalog.yaml").unwrap();
    load_catalog_with_source(&text, "shop.catalog.yaml").unwrap()
}

#[test]
fn repeated_emission_is_byte_identical() {
    let catalog = shop();
    let single = MigrateConfig {
        workers: Some(1),
        ..MigrateConfig::default()
    };
    let parallel = MigrateConfig {
        workers: Some(8),
        ..MigrateConfig::default()
    };

    let first = convert(&catalog, &single).unwrap();
    let second = convert(&catalog, &parallel).unwrap();
    assert_eq!(first.artifacts, second.artifacts);
    assert_eq!(first.artifacts.digest(), second.artifacts.digest());
    assert!(first.result.is_emitted());
}

#[test]
fn compose_file_lists_services_in_deployment_order() {
    let output = convert(&shop(), &MigrateConfig::default()).unwrap();
    let compose = output.artifacts.get_str("docker-compose.yml").unwrap();

    let positions: Vec<usize> = ["shop-assets", "orders-db", "sessions", "order-events", "api", "public-lb"]
        .iter()
        .map(|name| compose.find(&format!("\n  {name}:")).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
    assert!(compose.contains("condition: service_healthy"));

    let paths: Vec<&str> = output.artifacts.paths().collect();
    for expected in [
        ".env.example",
        "MIGRATION.md",
        "config/public-lb/traefik.yml",
        "docker-compose.yml",
        "scripts/shop-assets-sync.sh",
    ] {
        assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
    }

    let env = output.artifacts.get_str(".env.example").unwrap();
    assert!(env.contains("ORDERS_DB_PASSWORD="));
    let report = output.artifacts.get_str("MIGRATION.md").unwrap();
    assert!(report.contains("eks-analytics"));
    assert!(report.contains("stream-clicks"));
}

#[test]
fn stacks_emitter_writes_numbered_files() {
    let config = MigrateConfig {
        emitter: "compose-stacks".to_string(),
        include_report: false,
        ..MigrateConfig::default()
    };
    let output = convert(&shop(), &config).unwrap();
    let stacks: Vec<&str> = output
        .artifacts
        .paths()
        .filter(|p| p.starts_with("stacks/"))
        .collect();
    assert_eq!(
        stacks,
        [
            "stacks/01-storage.yml",
            "stacks/02-database.yml",
            "stacks/03-cache.yml",
            "stacks/04-messaging.yml",
            "stacks/05-application.yml",
            "stacks/06-edge.yml",
        ]
    );
    assert!(output.artifacts.get("deploy.sh").is_some());
    assert!(output.artifacts.get("MIGRATION.md").is_none());
}

#[test]
fn unknown_emitter_is_not_found() {
    let config = MigrateConfig {
        emitter: "helm".to_string(),
        ..MigrateConfig::default()
    };
    let err = convert(&shop(), &config).err().unwrap();
    assert!(matches!(err, MigrateError::NotFound { what: "emitter", .. }));
}

#[test]
fn artifacts_are_written_below_the_output_dir() {
    let output = convert(&shop(), &MigrateConfig::default()).unwrap();
    let dir = tempdir().unwrap();
    output.artifacts.write_to(dir.path()).unwrap();
    let written = fs::read(dir.path().join("docker-compose.yml")).unwrap();
    assert_eq!(Some(written.as_slice()), output.artifacts.get("docker-compose.yml"));
    assert!(dir.path().join("config/public-lb/traefik.yml").is_file());
}

#[test]
fn emitters_refuse_invalid_project_names() {
    let registry = EmitterRegistry::builtin();
    let output = convert(&shop(), &MigrateConfig::default()).unwrap();
    let config = EmitConfig {
        project_name: "My Shop".to_string(),
        ..EmitConfig::default()
    };
    let emitter = registry.get("compose").unwrap();
    assert!(emitter.validate(&output.result, &config).is_err());
}
