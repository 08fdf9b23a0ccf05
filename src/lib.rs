//! Converts cloud infrastructure catalogs into self-hosted compose deployments
//! with a deterministic start order.
#![forbid(unsafe_code)]

pub mod config;
pub mod consolidate;
pub mod converter;
pub mod converters;
pub mod emit;
pub mod error;
pub mod graph;
pub mod model;
pub mod ordering;
pub mod parse;
pub mod pipeline;
pub mod registry;
pub mod result;

pub use config::MigrateConfig;
pub use consolidate::{ConsolidatedResult, Consolidator};
pub use converter::{Converter, RunContext};
pub use emit::{ArtifactSet, EmitConfig, Emitter, EmitterRegistry};
pub use error::{MigrateError, Result};
pub use graph::ResourceGraph;
pub use model::{Catalog, Resource, ResourceKind};
pub use pipeline::{Pipeline, PipelineOutput};
pub use registry::{ConverterRegistry, RegistryBuilder};

const INLINE_SOURCE_LABEL: &str = "<inline>";

/// Parse a catalog document (YAML or JSON) with the embedded schema.
pub fn load_catalog(source: &str) -> Result<Catalog> {
    load_catalog_with_source(source, INLINE_SOURCE_LABEL)
}

/// Same as [`load_catalog`] but lets callers label the source for diagnostics.
pub fn load_catalog_with_source(source: &str, source_label: impl Into<String>) -> Result<Catalog> {
    use parse::CatalogParser;
    let source_label: String = source_label.into();
    parse::CatalogDocumentParser.parse(source, &source_label)
}

/// Run the built-in converters and emitters over `catalog` on a private runtime.
pub fn convert(catalog: &Catalog, config: &MigrateConfig) -> Result<PipelineOutput> {
    let mut pipeline = Pipeline::builtin();
    if let Some(workers) = config.workers {
        pipeline = pipeline.with_workers(workers);
    }
    pipeline.run_blocking(
        &config.run_context(),
        catalog,
        &config.emitter,
        &config.emit_config(),
    )
}
