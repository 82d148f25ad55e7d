//! Error types for kb-channel

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store rejected or failed an operation.
    #[error("shared store error ({operation} {key}): {message}")]
    Store {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// A subscription's sender side went away.
    #[error("channel {channel} closed")]
    Closed { channel: String },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    pub fn store(operation: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        Self::Store {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }
}
