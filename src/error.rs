use thiserror::Error;

/// One schema violation reported while loading a catalog document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaErrorDetail {
    pub message: String,
    pub json_pointer: String,
}

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("resource '{resource_id}' failed validation: {message}")]
    Validation {
        resource_id: String,
        message: String,
    },
    #[error("no {what} registered for '{key}'")]
    NotFound { what: &'static str, key: String },
    #[error("circular dependency between: {}", ids.join(", "))]
    CircularDependency { ids: Vec<String> },
    #[error("unknown graph node '{id}'")]
    UnknownNode { id: String },
    #[error("parse error in {source_label}: {message}")]
    Parse {
        source_label: String,
        message: String,
    },
    #[error("Schema validation failed:\n{message}")]
    Schema {
        message: String,
        details: Vec<SchemaErrorDetail>,
    },
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("emitter '{emitter}' failed: {message}")]
    Emit { emitter: String, message: String },
    #[error("conversion cancelled")]
    Cancelled,
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MigrateError {
    pub fn validation(resource_id: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Validation {
            resource_id: resource_id.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        MigrateError::NotFound {
            what,
            key: key.into(),
        }
    }

    /// Build a cycle error; ids are sorted so the payload is stable.
    pub fn circular<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();
        MigrateError::CircularDependency { ids }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MigrateError::Internal {
            message: message.into(),
        }
    }

    /// Ids left unresolved by a failed ordering, if this is a cycle error.
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            MigrateError::CircularDependency { ids } => Some(ids),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
