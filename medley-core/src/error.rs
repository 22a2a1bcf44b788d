//! Error types for medley-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::MediaId;

/// Errors raised by the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the file involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config file value that is not a scalar.
    #[error("config value for '{key}' in {path} must be a scalar")]
    InvalidValue { path: PathBuf, key: String },

    /// `set` was called for a key nobody registered.
    #[error("trying to set nonexistent config property '{0}'")]
    UnknownProperty(String),
}

/// Errors raised by the media library.
#[derive(Debug, Error)]
pub enum MedialibError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("media library JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no such entry: {0}")]
    NoSuchEntry(MediaId),

    #[error("entry {id} has no property '{key}' from source '{source_name}'")]
    NoSuchProperty {
        id: MediaId,
        source_name: String,
        key: String,
    },

    /// Properties owned by the server (`id`, `url`) cannot be rewritten by clients.
    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),
}

/// Errors raised while parsing a collection pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty pattern")]
    Empty,

    #[error("unexpected '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of pattern")]
    UnexpectedEnd,

    #[error("unterminated quote starting at position {0}")]
    UnterminatedQuote(usize),

    #[error("'{value}' is not an integer (in '{key}' comparison)")]
    NotAnInteger { key: String, value: String },
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn medialib_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MedialibError {
    MedialibError::Io {
        path: path.into(),
        source,
    }
}
