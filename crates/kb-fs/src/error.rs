//! Error types for kb-fs

use std::path::PathBuf;

/// Result type for kb-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kb-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} file at {path}: {message}")]
    Parse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Failed to serialize {format} file at {path}: {message}")]
    Serialize {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Value cannot be canonicalized: {0}")]
    Canonical(#[from] serde_json::Error),

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    #[error("Background I/O task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
