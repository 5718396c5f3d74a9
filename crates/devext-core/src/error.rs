use std::path::PathBuf;
use thiserror::Error;

use crate::plugin::PluginError;

/// Result alias for host operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type for the dev pipeline and dependency optimizer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Failed to resolve import \"{specifier}\" from \"{importer}\". Does the file exist?")]
    UnresolvedImport { specifier: String, importer: String },

    #[error("The entry point \"{0}\" cannot be marked as external")]
    ExternalEntryPoint(String),

    #[error("Do not know how to load path: {namespace}:{path}")]
    NoLoader { namespace: String, path: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
