//! Plugin allow/block/link state (`.kb/plugins.json`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Location of the plugin state file relative to the workspace root.
pub const STATE_FILE: &str = ".kb/plugins.json";

/// Operator decisions about which plugins may load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginState {
    /// Explicitly allowed packages (the allow-list).
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Explicitly blocked packages; blocking beats everything else.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Package directories linked into this workspace.
    #[serde(default)]
    pub linked: Vec<PathBuf>,
}

impl PluginState {
    pub fn path(root: &Path) -> PathBuf {
        root.join(STATE_FILE)
    }

    /// Load the state file, treating a missing or unreadable file as empty.
    pub async fn load(root: &Path) -> Self {
        let path = Self::path(root);
        match kb_fs::io::read_text_optional(&path).await {
            Ok(Some(content)) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed plugin state");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable plugin state");
                Self::default()
            }
        }
    }

    pub fn is_blocked(&self, package: &str) -> bool {
        self.disabled.iter().any(|p| p == package)
    }

    pub fn is_allowed(&self, package: &str) -> bool {
        self.enabled.iter().any(|p| p == package)
    }

    /// Linked directories resolved against the workspace root.
    pub fn linked_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.linked
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    }
}
