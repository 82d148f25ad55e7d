//! Per-invocation registry context

use kb_core::{ConfigLoader, LoadedConfig, RegistryService, SnapshotMode};
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Workspace root and its effective configuration.
#[derive(Debug)]
pub struct Context {
    root: PathBuf,
    loaded: LoadedConfig,
}

impl Context {
    pub async fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(CliError::user(format!(
                "workspace root '{}' is not a directory",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        let loaded = ConfigLoader::new(&root).load().await?;
        Ok(Self { root, loaded })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_level(&self) -> Option<&str> {
        self.loaded.config.log_level.as_deref()
    }

    /// A registry service running in `mode`, whatever the configured mode.
    pub fn service(&self, mode: SnapshotMode) -> RegistryService {
        let mut config = self.loaded.config.clone();
        if config.snapshot.mode != mode {
            tracing::debug!(configured = %config.snapshot.mode, %mode, "overriding snapshot mode");
            config.snapshot.mode = mode;
        }
        RegistryService::builder(&self.root, config)
            .config_file(self.loaded.path.clone())
            .build()
    }
}
