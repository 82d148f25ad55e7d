//! Configuration schema

use kb_channel::{ChannelKeys, ReconnectPolicy};
use kb_discovery::{CacheSettings, DiscoveryOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Whether this process produces snapshots or only consumes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    #[default]
    Producer,
    Consumer,
}

impl SnapshotMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            other => Err(format!("unknown snapshot mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub workspace: bool,
    pub node_modules: bool,
    pub trusted_scopes: Vec<String>,
    pub load_timeout_ms: u64,
    pub memory_ttl_ms: u64,
    pub disk_ttl_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            workspace: true,
            node_modules: true,
            trusted_scopes: vec!["@kb-labs/".to_string()],
            load_timeout_ms: kb_manifest::DEFAULT_LOAD_TIMEOUT_MS,
            memory_ttl_ms: 60_000,
            disk_ttl_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotConfig {
    pub mode: SnapshotMode,
    pub ttl_ms: u64,
    pub refresh_interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            mode: SnapshotMode::Producer,
            ttl_ms: 600_000,
            refresh_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelConfig {
    pub url: Option<String>,
    pub namespace: String,
    pub registry_channel: Option<String>,
    pub health_channel: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: None,
            namespace: "kb".to_string(),
            registry_channel: None,
            health_channel: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// The `registry` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Defaults to `<root>/.kb/cache`.
    pub cache_root: Option<PathBuf>,
    pub discovery: DiscoveryConfig,
    pub snapshot: SnapshotConfig,
    pub channel: ChannelConfig,
    /// Set from `KB_LOG_LEVEL`.
    #[serde(skip)]
    pub log_level: Option<String>,
    /// Set from the telemetry environment switches. No sink consumes it yet.
    #[serde(skip)]
    pub telemetry: bool,
}

impl RegistryConfig {
    pub fn cache_root(&self, root: &Path) -> PathBuf {
        match &self.cache_root {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(".kb").join("cache"),
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            workspace: self.discovery.workspace,
            node_modules: self.discovery.node_modules,
            trusted_scopes: self.discovery.trusted_scopes.clone(),
            load_timeout: Duration::from_millis(self.discovery.load_timeout_ms),
        }
    }

    pub fn cache_settings(&self, root: &Path, config_file: Option<&Path>) -> CacheSettings {
        let mut settings = CacheSettings::for_root(root);
        settings.dir = self.cache_root(root);
        settings.memory_ttl = Duration::from_millis(self.discovery.memory_ttl_ms);
        settings.disk_ttl = Duration::from_millis(self.discovery.disk_ttl_ms);
        settings.config_file = config_file.map(Path::to_path_buf);
        settings
    }

    pub fn channel_keys(&self) -> ChannelKeys {
        ChannelKeys::new(&self.channel.namespace)
            .with_registry_channel(self.channel.registry_channel.clone())
            .with_health_channel(self.channel.health_channel.clone())
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.snapshot.ttl_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot.refresh_interval_ms.max(1))
    }
}
