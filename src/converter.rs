//! Converter capability and the shared checks every converter runs.

use lazy_static::lazy_static;
use regex::Regex;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crate::{
    error::{MigrateError, Result},
    model::{Resource, ResourceKind},
    result::ConversionResult,
};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-z0-9_-]+").unwrap();
}

/// Turns one resource of exactly one kind into a [`ConversionResult`].
///
/// `convert` must be a pure function of its inputs: no I/O and no shared
/// mutable state, so that conversions can run concurrently and repeated
/// calls compare equal.
pub trait Converter: Send + Sync {
    fn resource_kind(&self) -> ResourceKind;

    fn validate(&self, resource: &Resource) -> Result<()>;

    fn convert(&self, ctx: &RunContext, resource: &Resource) -> Result<ConversionResult>;

    /// Kinds this converter's output usually depends on. Used to refine stack ordering.
    fn declared_dependency_kinds(&self) -> Vec<ResourceKind> {
        Vec::new()
    }

    /// `false` for kinds with no self-hosted container equivalent (managed
    /// clusters, bare virtual machines). Such resources become passthrough entries.
    fn containerizable(&self) -> bool {
        true
    }

    /// Manual migration hint used when the resource is passed through.
    fn passthrough_hint(&self, resource: &Resource) -> String {
        format!(
            "Migrate {} '{}' by hand; it has no container equivalent",
            resource.kind, resource.name
        )
    }
}

/// Per-run settings and cancellation state shared by converters and emitters.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project_name: String,
    pub network_name: String,
    pub image_overrides: BTreeMap<String, String>,
    /// Resource id -> service name assigned before conversion.
    service_names: Arc<BTreeMap<String, String>>,
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for RunContext {
    fn default() -> Self {
        RunContext {
            project_name: "homeport".to_string(),
            network_name: "homeport".to_string(),
            image_overrides: BTreeMap::new(),
            service_names: Arc::new(BTreeMap::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }
}

impl RunContext {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_service_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.service_names = Arc::new(names);
        self
    }

    /// Name for the service built from `resource`. Every name a converter
    /// derives (volumes, side files, secrets) must start from this one.
    pub fn service_name(&self, resource: &Resource) -> String {
        self.service_names
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| service_name(resource))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    /// Image for `kind`, honoring any configured override.
    pub fn image_for(&self, kind: &ResourceKind, default_image: &str) -> String {
        self.image_overrides
            .get(&kind.to_string())
            .cloned()
            .unwrap_or_else(|| default_image.to_string())
    }
}

/// Checks shared by every converter: the kind matches and the identifying
/// fields are present.
pub fn ensure_kind(resource: &Resource, expected: &ResourceKind) -> Result<()> {
    if resource.id.trim().is_empty() {
        return Err(MigrateError::validation("<unnamed>", "resource id is empty"));
    }
    if &resource.kind != expected {
        return Err(MigrateError::validation(
            resource.id.clone(),
            format!("kind '{}' does not match converter kind '{expected}'", resource.kind),
        ));
    }
    if resource.name.trim().is_empty() {
        return Err(MigrateError::validation(
            resource.id.clone(),
            "resource name is empty",
        ));
    }
    Ok(())
}

pub fn require_config(resource: &Resource, key: &str) -> Result<()> {
    match resource.config.get(key) {
        Some(value) if !value.is_null() && value.as_str() != Some("") => Ok(()),
        _ => Err(MigrateError::validation(
            resource.id.clone(),
            format!("missing required config '{key}'"),
        )),
    }
}

/// Compose-safe service name derived from the resource name.
pub fn service_name(resource: &Resource) -> String {
    let lowered = resource.name.to_ascii_lowercase();
    let cleaned = INVALID_NAME_CHARS.replace_all(&lowered, "-");
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        let id = resource.id.to_ascii_lowercase();
        let id = INVALID_NAME_CHARS.replace_all(&id, "-");
        let id = id.trim_matches('-');
        if id.is_empty() {
            return "service".to_string();
        }
        return id.to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> Resource {
        Resource::new("arn:aws:s3:::x", name, ResourceKind::new("aws", "s3_bucket"))
    }

    #[test]
    fn service_names_are_compose_safe() {
        assert_eq!(service_name(&bucket("My Assets.Bucket")), "my-assets-bucket");
        assert_eq!(service_name(&bucket("__")), "arn-aws-s3-x");
    }

    #[test]
    fn assigned_names_take_precedence() {
        let ctx = RunContext::default().with_service_names(BTreeMap::from([(
            "arn:aws:s3:::x".to_string(),
            "assets-2".to_string(),
        )]));
        assert_eq!(ctx.service_name(&bucket("assets")), "assets-2");
        let other = Resource::new("y", "Other", ResourceKind::new("aws", "s3_bucket"));
        assert_eq!(ctx.service_name(&other), "other");
    }

    #[test]
    fn expired_deadline_cancels() {
        let ctx = RunContext::default().with_deadline(Instant::now());
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(MigrateError::Cancelled)));
        let later = RunContext::default()
            .with_deadline(Instant::now() + std::time::Duration::from_secs(3600));
        assert!(later.check().is_ok());
    }

    #[test]
    fn ensure_kind_rejects_mismatch_and_empty_name() {
        let expected = ResourceKind::new("aws", "s3_bucket");
        assert!(ensure_kind(&bucket("ok"), &expected).is_ok());
        assert!(ensure_kind(&bucket(" "), &expected).is_err());
        let other = ResourceKind::new("aws", "sqs_queue");
        let err = ensure_kind(&bucket("ok"), &other).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn cancelled_context_fails_check() {
        let ctx = RunContext::default();
        assert!(ctx.check().is_ok());
        let shared = ctx.clone();
        shared.cancel();
        assert!(matches!(ctx.check(), Err(MigrateError::Cancelled)));
    }
}
