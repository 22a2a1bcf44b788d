use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Reasons a plugin is rejected or cannot be found.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{shortname}' has no loadable type")]
    UnknownType { shortname: String },

    #[error("plugin '{shortname}' has bad api version {found} (expected {expected})")]
    ApiVersion {
        shortname: String,
        expected: u32,
        found: u32,
    },

    #[error("setup of plugin '{shortname}' failed: {reason}")]
    Setup { shortname: String, reason: String },

    #[error("plugin '{shortname}' failed verification: {reason}")]
    Verify { shortname: String, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open plugin {path}: {message}")]
    Library { path: PathBuf, message: String },

    #[error("invalid magic rule '{0}'")]
    Magic(String),
}

/// Failures while an xform browses a stream.
#[derive(Debug, Error)]
pub enum XformError {
    #[error("reading the stream failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("{0}")]
    Parse(String),

    #[error("no input stream to browse {0}")]
    NoInput(String),
}

/// Coarse error class reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::Generic => write!(f, "generic"),
        }
    }
}

impl XformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XformError::Parse(_) => ErrorKind::InvalidArgument,
            XformError::Read(_) | XformError::NoInput(_) => ErrorKind::Generic,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PluginError {
    PluginError::Io {
        path: path.into(),
        source,
    }
}
