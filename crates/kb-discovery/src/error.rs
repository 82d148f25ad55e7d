use std::path::PathBuf;

/// Errors that abort a discovery pass.
///
/// Per-package failures never surface here; they degrade to unavailable
/// manifest entries. Only root-level problems and authoring errors in
/// workspace packages are fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The root package descriptor exists but cannot be parsed.
    #[error("failed to parse root package descriptor {path}: {message}")]
    RootDescriptor { path: PathBuf, message: String },

    /// The workspace declaration file exists but cannot be parsed.
    #[error("failed to parse workspace file {path}: {message}")]
    WorkspaceFile { path: PathBuf, message: String },

    /// A workspace member pattern is not a valid glob.
    #[error("invalid workspace pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A workspace package declares a command name twice.
    #[error(transparent)]
    Manifest(#[from] kb_manifest::Error),

    #[error(transparent)]
    Fs(#[from] kb_fs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
