use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    converter::Converter,
    converters,
    error::{MigrateError, Result},
    model::ResourceKind,
};

/// Collects converters during start-up. Call [`RegistryBuilder::build`] to
/// publish the read-only [`ConverterRegistry`] used by the pipeline.
#[derive(Default)]
pub struct RegistryBuilder {
    converters: BTreeMap<ResourceKind, Arc<dyn Converter>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded with every converter shipped in this crate.
    pub fn with_builtin_converters() -> Self {
        let mut builder = Self::new();
        for converter in converters::builtin() {
            let kind = converter.resource_kind();
            // built-in kinds are distinct by construction
            builder.converters.insert(kind, converter);
        }
        builder
    }

    pub fn register(&mut self, kind: ResourceKind, converter: Arc<dyn Converter>) -> Result<()> {
        if converter.resource_kind() != kind {
            return Err(MigrateError::validation(
                kind.to_string(),
                format!(
                    "converter handles '{}' and cannot be registered for '{kind}'",
                    converter.resource_kind()
                ),
            ));
        }
        if self.converters.contains_key(&kind) {
            return Err(MigrateError::validation(
                kind.to_string(),
                "a converter is already registered for this kind",
            ));
        }
        debug!(%kind, "registered converter");
        self.converters.insert(kind, converter);
        Ok(())
    }

    /// Register a converter under the kind it reports.
    pub fn register_converter(&mut self, converter: Arc<dyn Converter>) -> Result<()> {
        self.register(converter.resource_kind(), converter)
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            converters: Arc::new(self.converters),
        }
    }
}

/// Immutable kind -> converter table. Cheap to clone and share across workers.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Arc<BTreeMap<ResourceKind, Arc<dyn Converter>>>,
}

impl ConverterRegistry {
    pub fn builtin() -> Self {
        RegistryBuilder::with_builtin_converters().build()
    }

    pub fn get(&self, kind: &ResourceKind) -> Result<Arc<dyn Converter>> {
        self.converters
            .get(kind)
            .cloned()
            .ok_or_else(|| MigrateError::not_found("converter", kind.to_string()))
    }

    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.converters.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.converters.keys()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// `(kind, declared dependency kinds)` for every registered converter.
    pub fn declared_dependencies(&self) -> Vec<(ResourceKind, Vec<ResourceKind>)> {
        self.converters
            .iter()
            .map(|(kind, converter)| (kind.clone(), converter.declared_dependency_kinds()))
            .collect()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("kinds", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}
