//! Format-agnostic document loading and saving

use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

use crate::{Error, Result, io};

/// Format-agnostic document store.
///
/// Detects the format from the file extension and handles
/// serialization/deserialization transparently. Used for configuration,
/// manifest, workspace, and cache files alike.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Parse already-read content according to `path`'s extension.
    ///
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    /// - `.yaml`, `.yml` -> YAML
    pub fn parse<T: DeserializeOwned>(&self, path: &Path, content: &str) -> Result<T> {
        let extension = extension_of(path);
        match extension.as_str() {
            "toml" => toml::from_str(content).map_err(|e| Error::Parse {
                path: path.to_path_buf(),
                format: "TOML".into(),
                message: e.to_string(),
            }),
            "json" => serde_json::from_str(content).map_err(|e| Error::Parse {
                path: path.to_path_buf(),
                format: "JSON".into(),
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| Error::Parse {
                path: path.to_path_buf(),
                format: "YAML".into(),
                message: e.to_string(),
            }),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    /// Load a document from a file.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = io::read_text(path)?;
        self.parse(path, &content)
    }

    /// Load a document asynchronously.
    pub async fn load_async<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        self.parse(path, &content)
    }

    /// Render a value in the format implied by `path`.
    pub fn render<T: Serialize>(&self, path: &Path, value: &T) -> Result<String> {
        let extension = extension_of(path);
        match extension.as_str() {
            "toml" => toml::to_string_pretty(value).map_err(|e| Error::Serialize {
                path: path.to_path_buf(),
                format: "TOML".into(),
                message: e.to_string(),
            }),
            "json" => serde_json::to_string_pretty(value).map_err(|e| Error::Serialize {
                path: path.to_path_buf(),
                format: "JSON".into(),
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::to_string(value).map_err(|e| Error::Serialize {
                path: path.to_path_buf(),
                format: "YAML".into(),
                message: e.to_string(),
            }),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    /// Save a document to a file atomically.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content = self.render(path, value)?;
        io::write_atomic(path, content.as_bytes())
    }

    /// Save a document atomically without blocking the executor.
    pub async fn save_async<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content = self.render(path, value)?;
        io::write_atomic_async(path.to_path_buf(), content.into_bytes()).await
    }
}
