use std::path::PathBuf;

use thiserror::Error;

use medley_core::{ConfigError, MedialibError, QueryError};
use medley_plugins::{PluginError, XformError};

/// Error surface for the daemon runtime, its protocol and the client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("media library error: {0}")]
    Medialib(#[from] MedialibError),

    #[error("invalid pattern: {0}")]
    Query(#[from] QueryError),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("xform error ({}): {}", .0.kind(), .0)]
    Xform(#[from] XformError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot open {url}: {message}")]
    Transport { url: String, message: String },

    #[error("no xform can browse {url} ({mime})")]
    NoXform { url: String, mime: String },

    #[error("no such output plugin '{0}'")]
    UnknownOutput(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// Error message returned by the daemon for a request.
    #[error("{0}")]
    Remote(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
