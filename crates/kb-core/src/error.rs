//! Error types for kb-core

use std::sync::Arc;

/// Result type for kb-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kb-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An environment override has a value that cannot be used
    #[error("invalid value '{value}' for {name}: expected {expected}")]
    InvalidEnv {
        name: String,
        value: String,
        expected: String,
    },

    /// The operation belongs to the other snapshot mode
    #[error("{operation} requires {expected} mode, but the registry runs in {actual} mode")]
    WrongMode {
        operation: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Outcome of a refresh that another caller ran
    #[error(transparent)]
    Shared(Arc<Error>),

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Fs(#[from] kb_fs::Error),

    #[error(transparent)]
    Discovery(#[from] kb_discovery::Error),

    #[error(transparent)]
    Registration(#[from] kb_registry::RegistrationError),

    #[error(transparent)]
    Snapshot(#[from] kb_snapshot::Error),

    #[error(transparent)]
    Channel(#[from] kb_channel::Error),
}

impl Error {
    /// Unwrap an error shared between coalesced callers.
    pub fn from_shared(shared: Arc<Error>) -> Self {
        Arc::try_unwrap(shared).unwrap_or_else(Error::Shared)
    }

    /// The underlying error, looking through [`Error::Shared`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            other => other,
        }
    }
}
