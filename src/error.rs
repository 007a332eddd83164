//! Error types for the generator core

use thiserror::Error;

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Generator errors
///
/// Fatal errors surface immediately from the resolution and model-building
/// phases. Name collisions are only fatal under the `error` export collision
/// strategy; reference cycles in the model graph are always recovered by the
/// ordering phase and never appear here.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("failed to fetch reference {uri}{}: {cause}", if *timeout { " (timed out)" } else { "" })]
    RefFetch {
        uri: String,
        cause: String,
        timeout: bool,
    },

    #[error("reference chain at {pointer} exceeded {limit} hops")]
    RefCycle { pointer: String, limit: usize },

    #[error("cannot merge schemas at {path}: {reason}")]
    SchemaMerge { path: String, reason: String },

    #[error("unresolvable name collision: {name} exported from {module}")]
    NameCollision { name: String, module: String },

    #[error("{feature} is not supported by the {model_type} output")]
    UnsupportedFeature { feature: String, model_type: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GeneratorError {
    /// Build an input error pointing at a schema path
    pub fn at(path: &str, message: impl Into<String>) -> Self {
        GeneratorError::Input(format!("{}: {}", path, message.into()))
    }
}
