//! Emitter capability: serialize an ordered [`ConsolidatedResult`] into files.

mod compose;
mod report;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path},
    sync::Arc,
};
use tracing::debug;

pub use compose::{ComposeEmitter, ComposeStacksEmitter};
pub use report::render_migration_report;

use crate::{
    consolidate::ConsolidatedResult,
    converter::RunContext,
    error::{MigrateError, Result},
};

/// Settings every emitter reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitConfig {
    pub project_name: String,
    pub network_name: String,
    pub include_report: bool,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig {
            project_name: "homeport".to_string(),
            network_name: "homeport".to_string(),
            include_report: true,
        }
    }
}

pub trait Emitter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Path of the main file this emitter writes.
    fn primary_file(&self) -> &'static str;

    fn validate(&self, result: &ConsolidatedResult, config: &EmitConfig) -> Result<()>;

    fn emit(
        &self,
        ctx: &RunContext,
        result: &ConsolidatedResult,
        config: &EmitConfig,
    ) -> Result<ArtifactSet>;
}

/// Relative path -> content, plus the warnings and manual steps surfaced to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<String, Vec<u8>>,
    pub warnings: Vec<String>,
    pub manual_steps: Vec<String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Paths must be relative and stay inside the output directory.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = path.into();
        ensure_relative(&path)?;
        if self.files.contains_key(&path) {
            return Err(MigrateError::internal(format!(
                "artifact '{path}' written twice"
            )));
        }
        self.files.insert(path, content.into());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Lowercase hex BLAKE3 digest over every path and its content.
    pub fn digest(&self) -> String {
        let mut hasher = Hasher::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(content);
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Write every artifact below `root`, creating directories as needed.
    pub fn write_to(&self, root: &Path) -> Result<()> {
        for (path, content) in &self.files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| MigrateError::Io {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                })?;
            }
            fs::write(&target, content).map_err(|e| MigrateError::Io {
                path: target.display().to_string(),
                message: e.to_string(),
            })?;
            debug!(path = %target.display(), bytes = content.len(), "wrote artifact");
        }
        Ok(())
    }
}

fn ensure_relative(path: &str) -> Result<()> {
    let candidate = Path::new(path);
    let escapes = path.is_empty()
        || candidate.is_absolute()
        || candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(MigrateError::internal(format!(
            "artifact path '{path}' must be relative and stay inside the output directory"
        )));
    }
    Ok(())
}

/// Name -> emitter table, built once at start-up.
#[derive(Clone, Default)]
pub struct EmitterRegistry {
    emitters: BTreeMap<&'static str, Arc<dyn Emitter>>,
}

impl EmitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.emitters.insert("compose", Arc::new(ComposeEmitter));
        registry
            .emitters
            .insert("compose-stacks", Arc::new(ComposeStacksEmitter));
        registry
    }

    pub fn register(&mut self, emitter: Arc<dyn Emitter>) -> Result<()> {
        let name = emitter.name();
        if self.emitters.contains_key(name) {
            return Err(MigrateError::internal(format!(
                "emitter '{name}' already registered"
            )));
        }
        self.emitters.insert(name, emitter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Emitter>> {
        self.emitters
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::not_found("emitter", name))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.emitters.keys().copied()
    }
}

impl std::fmt::Debug for EmitterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterRegistry")
            .field("names", &self.emitters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_must_stay_relative() {
        let mut set = ArtifactSet::new();
        assert!(set.insert("docker-compose.yml", "x").is_ok());
        assert!(set.insert("/etc/passwd", "x").is_err());
        assert!(set.insert("../outside", "x").is_err());
        assert!(set.insert("docker-compose.yml", "y").is_err());
    }

    #[test]
    fn digest_changes_with_content() {
        let mut a = ArtifactSet::new();
        a.insert("f", "one").unwrap();
        let mut b = ArtifactSet::new();
        b.insert("f", "two").unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), a.clone().digest());
    }

    #[test]
    fn unknown_emitter_is_not_found() {
        let registry = EmitterRegistry::builtin();
        assert!(registry.get("compose").is_ok());
        let err = registry.get("helm").err().unwrap();
        assert!(matches!(err, MigrateError::NotFound { what: "emitter", .. }));
    }
}
