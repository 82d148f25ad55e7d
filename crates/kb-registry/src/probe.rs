//! Resolution of a command's `requires` entries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Decides whether a declared requirement is installed.
#[async_trait]
pub trait RequirementProbe: Send + Sync {
    /// Whether `requirement` resolves from `package_root`.
    async fn is_installed(&self, requirement: &str, package_root: &Path) -> bool;
}

/// Looks for `node_modules/<name>/package.json` from the package root up
/// to the workspace root.
#[derive(Debug, Clone)]
pub struct NodeModulesProbe {
    workspace_root: PathBuf,
}

impl NodeModulesProbe {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl RequirementProbe for NodeModulesProbe {
    async fn is_installed(&self, requirement: &str, package_root: &Path) -> bool {
        let mut dir = Some(package_root);
        while let Some(current) = dir {
            let descriptor = current
                .join("node_modules")
                .join(requirement)
                .join("package.json");
            if tokio::fs::try_exists(&descriptor).await.unwrap_or(false) {
                return true;
            }
            if current == self.workspace_root {
                break;
            }
            dir = current.parent();
        }
        // Packages outside the workspace fall back to the root install
        let root_install = self
            .workspace_root
            .join("node_modules")
            .join(requirement)
            .join("package.json");
        tokio::fs::try_exists(&root_install).await.unwrap_or(false)
    }
}
