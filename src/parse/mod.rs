//! Source formats that produce a [`Catalog`].

mod catalog;
mod terraform;

use serde::Serialize;
use std::{fs, path::Path, sync::Arc};
use tracing::debug;

pub use catalog::CatalogDocumentParser;
pub use terraform::TerraformStateParser;

use crate::{
    error::{MigrateError, Result},
    model::Catalog,
};

/// How sure a parser is that it understands a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub matched: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn none() -> Self {
        Detection {
            matched: false,
            confidence: 0.0,
        }
    }

    pub fn matched(confidence: f32) -> Self {
        Detection {
            matched: true,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

pub trait CatalogParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse `source`. `source_label` names the input in error messages.
    fn parse(&self, source: &str, source_label: &str) -> Result<Catalog>;

    fn autodetect(&self, source: &str) -> Detection;
}

/// Parsers in registration order. Detection ties go to the earlier one.
pub fn builtin_parsers() -> Vec<Arc<dyn CatalogParser>> {
    vec![
        Arc::new(TerraformStateParser),
        Arc::new(CatalogDocumentParser),
    ]
}

pub fn parser_by_name(parsers: &[Arc<dyn CatalogParser>], name: &str) -> Result<Arc<dyn CatalogParser>> {
    parsers
        .iter()
        .find(|p| p.name() == name)
        .cloned()
        .ok_or_else(|| MigrateError::not_found("parser", name))
}

/// Every parser's verdict on `source`, in registration order.
pub fn detect_all(parsers: &[Arc<dyn CatalogParser>], source: &str) -> Vec<(&'static str, Detection)> {
    parsers.iter().map(|p| (p.name(), p.autodetect(source))).collect()
}

/// The matching parser with the highest confidence.
pub fn detect_parser(parsers: &[Arc<dyn CatalogParser>], source: &str) -> Option<Arc<dyn CatalogParser>> {
    let mut best: Option<(&Arc<dyn CatalogParser>, f32)> = None;
    for parser in parsers {
        let detection = parser.autodetect(source);
        debug!(parser = parser.name(), confidence = detection.confidence, "autodetect");
        if !detection.matched {
            continue;
        }
        match best {
            Some((_, confidence)) if confidence >= detection.confidence => {}
            _ => best = Some((parser, detection.confidence)),
        }
    }
    best.map(|(parser, _)| parser.clone())
}

/// Read and parse a file. `format` is a parser name or `auto`.
pub fn parse_path(parsers: &[Arc<dyn CatalogParser>], path: &Path, format: &str) -> Result<Catalog> {
    let source = fs::read_to_string(path).map_err(|e| MigrateError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let label = path.display().to_string();
    let parser = if format == "auto" {
        detect_parser(parsers, &source).ok_or_else(|| MigrateError::Parse {
            source_label: label.clone(),
            message: "no parser recognizes this input; pass --format".to_string(),
        })?
    } else {
        parser_by_name(parsers, format)?
    };
    debug!(parser = parser.name(), source = %label, "parsing catalog");
    parser.parse(&source, &label)
}
