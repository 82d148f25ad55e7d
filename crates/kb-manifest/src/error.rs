use std::path::PathBuf;

/// Errors that can occur while loading or invoking command manifests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or parsing the manifest file failed.
    #[error(transparent)]
    Fs(#[from] kb_fs::Error),

    /// The manifest declares a schema this loader does not understand.
    #[error("unsupported manifest schema '{schema}' in {path}")]
    UnsupportedSchema { path: PathBuf, schema: String },

    /// A command declaration is malformed.
    #[error("invalid command '{id}' in package '{package}': {reason}")]
    InvalidCommand {
        package: String,
        id: String,
        reason: String,
    },

    /// Two commands in one package claim the same id or alias.
    #[error("package '{package}' declares '{name}' more than once")]
    DuplicateCommand { package: String, name: String },

    /// A declared handler binary does not exist.
    #[error("Cannot find module '{module}' (required by package '{package}')")]
    MissingModule { package: String, module: String },

    /// No handler is attached to the command.
    #[error("command '{command}' has no handler attached")]
    NoHandler { command: String },

    /// Spawning or waiting on a handler failed.
    #[error("handler for '{command}' failed: {source}")]
    Handler {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the package author made a mistake the environment cannot fix.
    ///
    /// Authoring errors are propagated instead of being downgraded to an
    /// unavailable entry.
    pub fn is_authoring_error(&self) -> bool {
        matches!(self, Self::DuplicateCommand { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
