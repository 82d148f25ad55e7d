//! Configuration file discovery and environment overrides

use kb_fs::ConfigStore;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::settings::{RegistryConfig, SnapshotMode};
use crate::{Error, Result};

/// Candidate configuration files, relative to the workspace root.
pub const CONFIG_FILES: &[&str] = &["kb.config.json", ".kb/kb.config.json", "kb.config.toml"];

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    registry: RegistryConfig,
}

/// Effective configuration and the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RegistryConfig,
    /// `None` when no configuration file exists.
    pub path: Option<PathBuf>,
}

/// Loads [`RegistryConfig`] for a workspace root.
pub struct ConfigLoader {
    root: PathBuf,
    env: EnvLookup,
}

impl ConfigLoader {
    /// Loader reading the process environment.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup.
    ///
    /// Tests use this to supply overrides without touching the process
    /// environment.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    /// The first configuration file that exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
    }

    /// Read the configuration file (if any) and apply environment overrides.
    pub async fn load(&self) -> Result<LoadedConfig> {
        let path = self.config_path();
        let mut config = match &path {
            Some(path) => {
                debug!(path = %path.display(), "loading registry configuration");
                ConfigStore::new().load_async::<ConfigFile>(path).await?.registry
            }
            None => RegistryConfig::default(),
        };
        self.apply_env(&mut config)?;
        Ok(LoadedConfig { config, path })
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    fn apply_env(&self, config: &mut RegistryConfig) -> Result<()> {
        if let Some(level) = self.var("KB_LOG_LEVEL") {
            config.log_level = Some(level);
        }
        if let Some(mode) = self.var("KB_CACHE_MODE") {
            config.snapshot.mode = mode.parse::<SnapshotMode>().map_err(|_| Error::InvalidEnv {
                name: "KB_CACHE_MODE".into(),
                value: mode.clone(),
                expected: "producer or consumer".into(),
            })?;
        }
        if let Some(namespace) = self.var("KB_CACHE_NAMESPACE") {
            config.channel.namespace = namespace;
        }
        if let Some(url) = self.var("KB_CACHE_URL") {
            config.channel.url = Some(url);
        }

        if let Some(value) = self.var("KB_TELEMETRY") {
            config.telemetry = match value.trim().to_ascii_lowercase().as_str() {
                "on" | "1" | "true" => true,
                "off" | "0" | "false" => false,
                _ => {
                    return Err(Error::InvalidEnv {
                        name: "KB_TELEMETRY".into(),
                        value,
                        expected: "on or off".into(),
                    });
                }
            };
        }
        // Opt-out wins over opt-in
        if ["KB_TELEMETRY_DISABLED", "DO_NOT_TRACK"]
            .iter()
            .any(|name| self.var(name).is_some_and(|v| is_truthy(&v)))
        {
            config.telemetry = false;
        }
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn loader(pairs: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::new(Path::new("/nonexistent")).with_env(env(pairs))
    }

    #[test]
    fn opt_out_beats_opt_in() {
        let mut config = RegistryConfig::default();
        loader(&[("KB_TELEMETRY", "on"), ("DO_NOT_TRACK", "1")])
            .apply_env(&mut config)
            .unwrap();
        assert!(!config.telemetry);
    }

    #[test]
    fn telemetry_opt_in() {
        let mut config = RegistryConfig::default();
        loader(&[("KB_TELEMETRY", "on")]).apply_env(&mut config).unwrap();
        assert!(config.telemetry);
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let mut config = RegistryConfig::default();
        let err = loader(&[("KB_CACHE_MODE", "leader")])
            .apply_env(&mut config)
            .unwrap_err();
        assert!(err.to_string().contains("KB_CACHE_MODE"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut config = RegistryConfig::default();
        loader(&[("KB_CACHE_NAMESPACE", "  ")])
            .apply_env(&mut config)
            .unwrap();
        assert_eq!(config.channel.namespace, "kb");
    }
}
