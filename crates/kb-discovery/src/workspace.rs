//! Workspace member and installed-package enumeration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::package::{DESCRIPTOR_FILE, PackageDescriptor};
use crate::{Error, Result};

/// pnpm's workspace declaration, read alongside `package.json#workspaces`.
pub const PNPM_WORKSPACE_FILE: &str = "pnpm-workspace.yaml";

/// Directory holding installed dependencies.
pub const NODE_MODULES: &str = "node_modules";

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspace {
    #[serde(default)]
    packages: Vec<String>,
}

/// Read the root descriptor.
///
/// A missing descriptor is an empty workspace; an unparsable one is fatal
/// for the whole discovery pass.
pub async fn read_root_descriptor(root: &Path) -> Result<PackageDescriptor> {
    let path = root.join(DESCRIPTOR_FILE);
    match kb_fs::io::read_text_optional(&path).await? {
        None => Ok(PackageDescriptor::default()),
        Some(content) => serde_json::from_str(&content).map_err(|e| Error::RootDescriptor {
            path,
            message: e.to_string(),
        }),
    }
}

/// Member patterns from `package.json#workspaces` and `pnpm-workspace.yaml`.
pub async fn workspace_patterns(root: &Path, descriptor: &PackageDescriptor) -> Result<Vec<String>> {
    let mut patterns = descriptor.workspace_patterns();

    let pnpm_path = root.join(PNPM_WORKSPACE_FILE);
    if let Some(content) = kb_fs::io::read_text_optional(&pnpm_path).await? {
        let pnpm: PnpmWorkspace =
            serde_yaml::from_str(&content).map_err(|e| Error::WorkspaceFile {
                path: pnpm_path.clone(),
                message: e.to_string(),
            })?;
        patterns.extend(pnpm.packages);
    }

    patterns.dedup();
    Ok(patterns)
}

/// Expand member globs into package directories.
///
/// Patterns starting with `!` exclude matches. Only directories that
/// contain a package descriptor are returned.
pub fn expand_patterns(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut excludes = Vec::new();
    for pattern in patterns.iter().filter_map(|p| p.strip_prefix('!')) {
        let compiled = glob::Pattern::new(pattern.trim_end_matches('/')).map_err(|e| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;
        excludes.push(compiled);
    }

    let mut members = Vec::new();
    for pattern in patterns.iter().filter(|p| !p.starts_with('!')) {
        let full = root.join(pattern.trim_end_matches('/'));
        let entries = glob::glob(&full.to_string_lossy()).map_err(|e| Error::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for dir in entries.flatten() {
            if !dir.join(DESCRIPTOR_FILE).is_file() {
                continue;
            }
            let relative = dir.strip_prefix(root).unwrap_or(&dir);
            if excludes.iter().any(|ex| ex.matches_path(relative)) {
                debug!(member = %relative.display(), "workspace member excluded");
                continue;
            }
            members.push(dir);
        }
    }

    members.sort();
    members.dedup();
    Ok(members)
}

/// Workspace member directories of `root`.
pub async fn workspace_members(root: &Path) -> Result<Vec<PathBuf>> {
    let descriptor = read_root_descriptor(root).await?;
    let patterns = workspace_patterns(root, &descriptor).await?;
    expand_patterns(root, &patterns)
}

/// Top-level and scoped package directories under `node_modules`.
pub async fn installed_packages(root: &Path) -> Vec<PathBuf> {
    let modules = root.join(NODE_MODULES);
    let mut packages = Vec::new();

    for entry in list_dirs(&modules).await {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            packages.extend(list_dirs(&entry).await);
        } else {
            packages.push(entry);
        }
    }

    packages.sort();
    packages
}

async fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        // Follow symlinks: pnpm links workspace packages into node_modules
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            dirs.push(path);
        }
    }
    dirs
}
