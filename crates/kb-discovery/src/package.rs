//! Package descriptors (`package.json`) and manifest location.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Descriptor file name for every package.
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Keyword that marks a dependency as a CLI plugin.
pub const PLUGIN_KEYWORD: &str = "kb-cli-plugin";

/// Conventional manifest locations, checked in order after an explicit
/// `kb.manifest` field.
pub const MANIFEST_LOCATIONS: &[&str] = &[
    "kb.manifest.json",
    "kb.manifest.toml",
    "dist/kb.manifest.json",
    ".kb/manifest.json",
];

/// The subset of a package descriptor the registry reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub workspaces: Option<WorkspacesField>,
    #[serde(default)]
    pub kb: Option<PluginField>,
}

/// `workspaces` is either a list of globs or `{ "packages": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    List(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

/// The `kb` section of a package descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginField {
    #[serde(default)]
    pub plugin: bool,
    #[serde(default)]
    pub manifest: Option<String>,
}

impl PackageDescriptor {
    /// Read `<dir>/package.json`.
    pub async fn read(dir: &Path) -> kb_fs::Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| kb_fs::Error::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| kb_fs::Error::Parse {
            path,
            format: "JSON".into(),
            message: e.to_string(),
        })
    }

    /// Whether the package declares itself a plugin, by flag or keyword.
    pub fn is_plugin(&self) -> bool {
        self.kb.as_ref().is_some_and(|kb| kb.plugin)
            || self.keywords.iter().any(|k| k == PLUGIN_KEYWORD)
    }

    pub fn workspace_patterns(&self) -> Vec<String> {
        match &self.workspaces {
            Some(WorkspacesField::List(patterns)) => patterns.clone(),
            Some(WorkspacesField::Object { packages }) => packages.clone(),
            None => Vec::new(),
        }
    }

    fn explicit_manifest(&self) -> Option<&str> {
        self.kb.as_ref().and_then(|kb| kb.manifest.as_deref())
    }
}

/// Find a package's manifest file.
///
/// An explicit `kb.manifest` path wins when it exists; otherwise the
/// conventional locations are tried in order.
pub async fn locate_manifest(root: &Path, descriptor: &PackageDescriptor) -> Option<PathBuf> {
    let explicit = descriptor.explicit_manifest().map(|rel| root.join(rel));
    let conventional = MANIFEST_LOCATIONS.iter().map(|rel| root.join(rel));

    for candidate in explicit.into_iter().chain(conventional) {
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}
