use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::{converter::RunContext, emit::EmitConfig, model::ResourceKind};

/// Run settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateConfig {
    pub project_name: String,
    pub network_name: String,
    /// Concurrent conversions; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub emitter: String,
    pub output_dir: PathBuf,
    pub include_report: bool,
    /// Wall-clock limit for a run; conversion stops with `Cancelled` once it passes.
    pub timeout_secs: Option<u64>,
    /// `provider:service` -> image replacing the converter default.
    pub image_overrides: BTreeMap<String, String>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        MigrateConfig {
            project_name: "homeport".to_string(),
            network_name: "homeport".to_string(),
            workers: None,
            emitter: "compose".to_string(),
            output_dir: PathBuf::from("homeport-out"),
            include_report: true,
            timeout_secs: None,
            image_overrides: BTreeMap::new(),
        }
    }
}

impl MigrateConfig {
    /// Load from disk, accepting JSON or YAML, and TOML when the `toml` feature is enabled.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let txt = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config at {}", path_ref.display()))?;
        let config = Self::from_text(&txt)
            .with_context(|| format!("invalid config in {}", path_ref.display()))?;
        config.normalized()
    }

    fn from_text(txt: &str) -> anyhow::Result<Self> {
        if let Ok(value) = serde_json::from_str::<Self>(txt) {
            return Ok(value);
        }
        let yaml_err = match serde_yaml_bw::from_str::<Self>(txt) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        #[cfg(feature = "toml")]
        {
            if let Ok(value) = toml::from_str::<Self>(txt) {
                return Ok(value);
            }
            anyhow::bail!("expected JSON, YAML or TOML ({yaml_err})");
        }

        #[cfg(not(feature = "toml"))]
        {
            anyhow::bail!(
                "expected JSON or YAML (enable `toml` feature for TOML support): {yaml_err}"
            );
        }
    }

    /// Check values and canonicalize override keys.
    pub fn normalized(mut self) -> anyhow::Result<Self> {
        anyhow::ensure!(!self.project_name.trim().is_empty(), "project_name must not be empty");
        anyhow::ensure!(!self.network_name.trim().is_empty(), "network_name must not be empty");
        anyhow::ensure!(!self.emitter.trim().is_empty(), "emitter must not be empty");
        if let Some(workers) = self.workers {
            anyhow::ensure!(workers > 0, "workers must be at least 1");
        }
        if let Some(timeout) = self.timeout_secs {
            anyhow::ensure!(timeout > 0, "timeout_secs must be at least 1");
        }
        let mut overrides = BTreeMap::new();
        for (kind, image) in std::mem::take(&mut self.image_overrides) {
            let parsed: ResourceKind = kind
                .parse()
                .with_context(|| format!("image_overrides key '{kind}'"))?;
            anyhow::ensure!(!image.trim().is_empty(), "image override for '{kind}' is empty");
            overrides.insert(parsed.to_string(), image);
        }
        self.image_overrides = overrides;
        Ok(self)
    }

    pub fn emit_config(&self) -> EmitConfig {
        EmitConfig {
            project_name: self.project_name.clone(),
            network_name: self.network_name.clone(),
            include_report: self.include_report,
        }
    }

    /// Fresh context for one run. The deadline, if any, starts counting now.
    pub fn run_context(&self) -> RunContext {
        let mut ctx = RunContext::default();
        ctx.project_name = self.project_name.clone();
        ctx.network_name = self.network_name.clone();
        ctx.image_overrides = self.image_overrides.clone();
        match self.timeout_secs {
            Some(secs) => ctx.with_deadline(Instant::now() + Duration::from_secs(secs)),
            None => ctx,
        }
    }
}
