use homeport::{
    Catalog, Consolidator, Pipeline, Resource, ResourceKind, RunContext,
    consolidate::{PassthroughReason, StackState},
    load_catalog, load_catalog_with_source,
    ordering::plan_deployment,
};
use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use std::fs;

fn fixture(name: &str) -> Catalog {
    let path = format!("fixtures/{name}");
    let text = fs::read_to_string(&path).unwrap();
    load_catalog_with_source(&text, path).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unregistered_kinds_become_passthrough_without_failing() {
    let catalog = fixture("mixed.catalog.json");
    assert_eq!(catalog.len(), 5);

    let result = Pipeline::builtin()
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();

    assert_eq!(result.passthrough.len(), 2);
    assert!(
        result
            .passthrough
            .iter()
            .all(|p| p.reason == PassthroughReason::NoConverter)
    );
    assert_eq!(result.service_count(), 3);
    let stacks: Vec<_> = result.stacks.iter().map(|s| s.name()).collect();
    assert_eq!(stacks, ["storage", "database", "application"]);
    assert_eq!(result.metadata.resource_count, 5);
    assert_eq!(result.metadata.converted_count, 3);
    assert_eq!(result.metadata.passthrough_count, 2);
    assert!(result.manual_steps.len() >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shop_catalog_deploys_in_category_order() {
    let catalog = fixture("shop.catalog.yaml");
    let result = Pipeline::builtin()
        .with_workers(3)
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();
    let plan = plan_deployment(&result).unwrap();

    let rendered = plan
        .stacks
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}: {}", i + 1, s.stack, s.services.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    assert_snapshot!(rendered, @r"
    1. storage: shop-assets
    2. database: orders-db
    3. cache: sessions
    4. messaging: order-events
    5. application: api
    6. edge: public-lb
    ");

    let api = result.services().find(|s| s.name == "api").unwrap();
    assert_eq!(api.depends_on, ["orders-db", "sessions", "order-events", "shop-assets"]);
    assert!(!result.metadata.stack_order_fallback);

    let reasons: Vec<_> = result.passthrough.iter().map(|p| (p.resource_id.as_str(), p.reason)).collect();
    assert_eq!(
        reasons,
        [
            ("eks-analytics", PassthroughReason::NotContainerizable),
            ("stream-clicks", PassthroughReason::NoConverter),
        ]
    );
}

#[tokio::test]
async fn consolidating_twice_keeps_stack_contents() {
    let catalog = fixture("shop.catalog.yaml");
    let first = Pipeline::builtin()
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();
    let second = Consolidator::new().reconsolidate(&first).unwrap();

    assert_eq!(first.stacks.len(), second.stacks.len());
    for (a, b) in first.stacks.iter().zip(&second.stacks) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.services(), b.services());
        assert_eq!(a.volumes(), b.volumes());
        assert_eq!(a.resource_ids(), b.resource_ids());
        assert_eq!(b.state(), StackState::Ordered);
    }
}

#[tokio::test]
async fn failed_validation_is_skipped_not_fatal() {
    let mut catalog = Catalog::new("aws", "inline");
    catalog
        .push(Resource::new("svc", "api", ResourceKind::new("aws", "ecs_service")))
        .unwrap();
    catalog
        .push(Resource::new("bucket", "media", ResourceKind::new("aws", "s3_bucket")))
        .unwrap();

    let result = Pipeline::builtin()
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].resource_id, "svc");
    assert!(result.skipped[0].error.contains("image"));
    assert_eq!(result.service_count(), 1);
    assert!(result.warnings.iter().any(|w| w.contains("was skipped")));
}

#[tokio::test]
async fn resource_cycles_are_reported_but_service_cycles_are_fatal() {
    let catalog = load_catalog(
        r#"
provider: aws
resources:
  - id: a
    name: alpha
    kind: aws:ecs_service
    config: {image: "alpha:1"}
    depends_on: [b]
  - id: b
    name: beta
    kind: aws:ecs_service
    config: {image: "beta:1"}
    depends_on: [a]
"#,
    )
    .unwrap();

    let result = Pipeline::builtin()
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("resource dependency cycle between a, b"))
    );

    let err = plan_deployment(&result).unwrap_err();
    assert_eq!(err.cycle_members().unwrap(), ["alpha", "beta"]);
}

#[tokio::test]
async fn cancelled_runs_stop() {
    let ctx = RunContext::default();
    ctx.cancel();
    let err = Pipeline::builtin()
        .consolidate(&ctx, &fixture("shop.catalog.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, homeport::MigrateError::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn databases_sharing_a_name_get_separate_storage() {
    let mut catalog = Catalog::new("aws", "terraform.tfstate");
    for id in ["aws_db_instance.db[0]", "aws_db_instance.db[1]"] {
        catalog
            .push(
                Resource::new(id, "orders", ResourceKind::new("aws", "db_instance"))
                    .with_config("engine", serde_json::json!("postgres")),
            )
            .unwrap();
    }

    let result = Pipeline::builtin()
        .consolidate(&RunContext::default(), &catalog)
        .await
        .unwrap();

    let mounts: Vec<(&str, &str)> = result
        .services()
        .map(|s| (s.name.as_str(), s.volumes[0].source.as_str()))
        .collect();
    assert_eq!(mounts, [("orders", "orders-data"), ("orders-2", "orders-2-data")]);

    let stack = result.stack("database").unwrap();
    let volumes: Vec<_> = stack.volumes().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(volumes, ["orders-data", "orders-2-data"]);
    let scripts: Vec<_> = stack.scripts().keys().map(String::as_str).collect();
    assert_eq!(scripts, ["scripts/orders-restore.sh", "scripts/orders-2-restore.sh"]);

    let second = &result.services().nth(1).unwrap().environment;
    assert!(second.values().any(|v| v.contains("ORDERS_2_PASSWORD")));
    assert!(result.warnings.iter().any(|w| w.contains("renamed to 'orders-2'")));
    assert!(!result.warnings.iter().any(|w| w.contains("generated twice")));
}
