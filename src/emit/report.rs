use handlebars::{
    Context, Handlebars, Helper, HelperDef, Output, RenderContext, RenderError, RenderErrorReason,
    no_escape,
};
use serde_json::{Value, json};

use super::EmitConfig;
use crate::{
    consolidate::ConsolidatedResult,
    error::{MigrateError, Result},
    ordering::DeploymentPlan,
};

const REPORT_TEMPLATE: &str = r#"# Migration report: {{project}}

Source: `{{metadata.source}}` ({{metadata.provider}})

| | count |
|---|---|
| resources | {{metadata.resource_count}} |
| converted | {{metadata.converted_count}} |
| passed through | {{metadata.passthrough_count}} |
| skipped | {{metadata.skipped_count}} |
| stacks | {{metadata.stack_count}} |
| services | {{metadata.service_count}} |
{{#if metadata.stack_order_fallback}}

> Stack dependencies form a cycle. Stacks are listed in creation order; check the start order by hand.
{{/if}}

## Deployment order
{{#each stacks}}

### {{inc @index}}. {{name}}{{#if depends_on}} (after {{join depends_on}}){{/if}}

{{#each services}}
- `{{this}}`
{{/each}}
{{/each}}
{{#if passthrough}}

## Resources left on the provider

| resource | kind | reason |
|---|---|---|
{{#each passthrough}}
| `{{resource_id}}` | `{{kind}}` | {{reason}} |
{{/each}}
{{/if}}
{{#if skipped}}

## Skipped resources

{{#each skipped}}
- `{{resource_id}}` (`{{kind}}`): {{error}}
{{/each}}
{{/if}}
{{#if manual_steps}}

## Manual steps

{{#each manual_steps}}
{{inc @index}}. {{this}}
{{/each}}
{{/if}}
{{#if warnings}}

## Warnings

{{#each warnings}}
- {{this}}
{{/each}}
{{/if}}
"#;

struct IncHelper;

impl HelperDef for IncHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        helper: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> std::result::Result<(), RenderError> {
        let value = helper
            .param(0)
            .and_then(|p| p.value().as_u64())
            .ok_or_else(|| helper_error("inc helper expects a number"))?;
        out.write(&(value + 1).to_string())?;
        Ok(())
    }
}

struct JoinHelper;

impl HelperDef for JoinHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        helper: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> std::result::Result<(), RenderError> {
        let items = helper
            .param(0)
            .and_then(|p| p.value().as_array())
            .ok_or_else(|| helper_error("join helper expects a list"))?;
        let joined = items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        out.write(&joined)?;
        Ok(())
    }
}

fn helper_error(message: &str) -> RenderError {
    RenderErrorReason::Other(message.to_string()).into()
}

/// Render `MIGRATION.md` for a consolidated result and its deployment plan.
pub fn render_migration_report(
    result: &ConsolidatedResult,
    plan: &DeploymentPlan,
    config: &EmitConfig,
) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(no_escape);
    handlebars.register_helper("inc", Box::new(IncHelper));
    handlebars.register_helper("join", Box::new(JoinHelper));

    let stacks: Vec<Value> = result
        .stacks
        .iter()
        .zip(&plan.stacks)
        .map(|(stack, order)| {
            json!({
                "name": stack.name(),
                "depends_on": stack.depends_on(),
                "services": order.services,
            })
        })
        .collect();
    let passthrough: Vec<Value> = result
        .passthrough
        .iter()
        .map(|p| {
            json!({
                "resource_id": p.resource_id,
                "kind": p.kind.to_string(),
                "reason": p.hint,
            })
        })
        .collect();
    let skipped: Vec<Value> = result
        .skipped
        .iter()
        .map(|s| {
            json!({
                "resource_id": s.resource_id,
                "kind": s.kind.to_string(),
                "error": s.error,
            })
        })
        .collect();

    let data = json!({
        "project": config.project_name,
        "metadata": result.metadata,
        "stacks": stacks,
        "passthrough": passthrough,
        "skipped": skipped,
        "manual_steps": result.manual_steps,
        "warnings": result.warnings,
    });

    handlebars
        .render_template(REPORT_TEMPLATE, &data)
        .map_err(|e| MigrateError::internal(format!("migration report render error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consolidate::{Consolidator, Passthrough, PassthroughReason},
        model::ResourceKind,
        ordering::plan_deployment,
        result::{ConversionResult, ServiceDefinition},
    };

    #[test]
    fn report_lists_stacks_and_passthrough() {
        let results = vec![
            ConversionResult::new(
                "r-db",
                ResourceKind::new("aws", "db_instance"),
                ServiceDefinition::new("db", "postgres:16"),
            ),
            ConversionResult::new(
                "r-api",
                ResourceKind::new("aws", "ecs_service"),
                ServiceDefinition::new("api", "api:1").depends("db"),
            ),
        ];
        let passthrough = vec![Passthrough {
            resource_id: "r-eks".to_string(),
            name: "main".to_string(),
            kind: ResourceKind::new("aws", "eks_cluster"),
            reason: PassthroughReason::NotContainerizable,
            hint: "Recreate cluster 'main'".to_string(),
        }];
        let result = Consolidator::new()
            .consolidate(results, passthrough, Vec::new())
            .unwrap();
        let plan = plan_deployment(&result).unwrap();
        let report = render_migration_report(&result, &plan, &EmitConfig::default()).unwrap();

        assert!(report.starts_with("# Migration report: homeport"));
        assert!(report.contains("### 1. database"));
        assert!(report.contains("### 2. application (after database)"));
        assert!(report.contains("| `r-eks` | `aws:eks_cluster` | Recreate cluster 'main' |"));
        assert!(report.contains("1. Recreate cluster 'main'"));
    }
}
