//! Registered command record.

use kb_discovery::DiscoverySource;
use kb_manifest::CommandManifest;
use serde::{Deserialize, Serialize};

/// One command after collision resolution.
///
/// Shadowed commands stay in the registry for introspection but are never
/// returned by name lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCommand {
    pub manifest: CommandManifest,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub source: DiscoverySource,
    pub priority: u8,
    pub shadowed: bool,
    /// Aliases lost to a higher-priority command while the id survived.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadowed_aliases: Vec<String>,
}

impl RegisteredCommand {
    pub fn new(manifest: CommandManifest, source: DiscoverySource) -> Self {
        Self {
            manifest,
            available: true,
            unavailable_reason: None,
            hint: None,
            source,
            priority: source.priority(),
            shadowed: false,
            shadowed_aliases: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Names this command answers to in the index.
    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        let aliases = self
            .manifest
            .aliases
            .iter()
            .filter(|a| !self.shadowed_aliases.contains(a))
            .map(String::as_str);
        std::iter::once(self.manifest.id.as_str())
            .chain(aliases)
            .filter(|_| !self.shadowed)
    }

    /// Whether the command can be invoked right now.
    pub fn is_executable(&self) -> bool {
        self.available && !self.shadowed && self.manifest.is_executable()
    }

    pub fn mark_unavailable(&mut self, reason: String, hint: Option<String>) {
        self.available = false;
        self.unavailable_reason = Some(reason);
        self.hint = hint;
    }
}
