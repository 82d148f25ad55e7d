//! Discovery data model.

use kb_manifest::ManifestEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a package was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Builtin,
    Workspace,
    Linked,
    NodeModules,
}

impl DiscoverySource {
    /// Higher wins: builtin > workspace > linked > node_modules.
    pub fn priority(self) -> u8 {
        match self {
            Self::Builtin => 4,
            Self::Workspace => 3,
            Self::Linked => 2,
            Self::NodeModules => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Workspace => "workspace",
            Self::Linked => "linked",
            Self::NodeModules => "node_modules",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package that will have its manifest loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub version: Option<String>,
    pub source: DiscoverySource,
    pub root: PathBuf,
    pub manifest_path: PathBuf,
}

/// Outcome of scanning one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub source: DiscoverySource,
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    pub manifest_path: PathBuf,
    pub package_root: PathBuf,
    pub manifests: Vec<ManifestEntry>,
}

impl DiscoveryResult {
    pub fn has_unavailable(&self) -> bool {
        self.manifests.iter().any(ManifestEntry::is_unavailable)
    }
}

/// Which tier answered a discovery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOrigin {
    Fresh,
    Memory,
    Disk,
}

impl DiscoveryOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

impl fmt::Display for DiscoveryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full answer of a discovery call.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub results: Vec<DiscoveryResult>,
    /// Any package timed out or is unavailable.
    pub partial: bool,
    /// Packages skipped because their manifest load timed out.
    pub timed_out: Vec<String>,
    pub origin: DiscoveryOrigin,
}

impl Discovery {
    pub fn new(results: Vec<DiscoveryResult>, timed_out: Vec<String>, origin: DiscoveryOrigin) -> Self {
        let partial = !timed_out.is_empty() || results.iter().any(DiscoveryResult::has_unavailable);
        Self {
            results,
            partial,
            timed_out,
            origin,
        }
    }
}
