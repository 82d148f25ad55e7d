//! Error types for kb-snapshot

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] kb_fs::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    /// A stored snapshot failed schema or checksum validation.
    #[error("invalid snapshot from {origin}: {reason}")]
    Invalid { origin: String, reason: String },
}

impl Error {
    pub fn invalid(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}
