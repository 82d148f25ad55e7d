//! Manifest loading with timeout and failure isolation.

use async_trait::async_trait;
use kb_fs::ConfigStore;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{CommandManifest, ManifestEntry, ManifestFile, ManifestKind, UnavailableManifest};
use crate::unavailable::{extract_missing_module, remediation_hint};
use crate::{Error, MANIFEST_SCHEMA, Result};

/// Reads one package's manifest and normalizes it into command manifests.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    async fn load(
        &self,
        manifest_path: &Path,
        package_name: &str,
        package_root: &Path,
    ) -> Result<Vec<CommandManifest>>;
}

/// Loads declarative JSON/TOML manifest files from disk.
#[derive(Debug, Default, Clone)]
pub struct FileManifestLoader {
    store: ConfigStore,
}

impl FileManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestLoader for FileManifestLoader {
    async fn load(
        &self,
        manifest_path: &Path,
        package_name: &str,
        package_root: &Path,
    ) -> Result<Vec<CommandManifest>> {
        let file: ManifestFile = self.store.load_async(manifest_path).await?;
        if file.schema != MANIFEST_SCHEMA {
            return Err(Error::UnsupportedSchema {
                path: manifest_path.to_path_buf(),
                schema: file.schema,
            });
        }

        let manifests = normalize(file, package_name, package_root)?;

        for manifest in &manifests {
            if let Some(spec) = &manifest.handler {
                let program = package_root.join(&spec.bin);
                if !tokio::fs::try_exists(&program).await.unwrap_or(false) {
                    return Err(Error::MissingModule {
                        package: package_name.to_string(),
                        module: format!("./{}", spec.bin.trim_start_matches("./")),
                    });
                }
            }
        }

        debug!(package = package_name, commands = manifests.len(), "manifest loaded");
        Ok(manifests)
    }
}

/// Turn a parsed manifest file into qualified, validated command manifests.
///
/// Ids without a namespace are qualified with the command's group, the
/// file's group, or the package's short name, in that order. Every id and
/// alias must be unique within the package.
pub fn normalize(
    file: ManifestFile,
    package_name: &str,
    package_root: &Path,
) -> Result<Vec<CommandManifest>> {
    let short_name = package_name.rsplit('/').next().unwrap_or(package_name);
    let mut seen: HashSet<String> = HashSet::new();
    let mut manifests = Vec::with_capacity(file.commands.len());

    for decl in file.commands {
        let raw_id = decl.id.trim();
        if raw_id.is_empty() || raw_id.chars().any(char::is_whitespace) {
            return Err(Error::InvalidCommand {
                package: package_name.to_string(),
                id: decl.id.clone(),
                reason: "ids must be non-empty and contain no whitespace".to_string(),
            });
        }

        let group = decl
            .group
            .clone()
            .or_else(|| file.group.clone())
            .or_else(|| raw_id.split_once(':').map(|(ns, _)| ns.to_string()))
            .unwrap_or_else(|| short_name.to_string());

        let id = if raw_id.contains(':') {
            raw_id.to_string()
        } else {
            format!("{group}:{raw_id}")
        };

        for name in std::iter::once(&id).chain(decl.aliases.iter()) {
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateCommand {
                    package: package_name.to_string(),
                    name: name.clone(),
                });
            }
        }

        manifests.push(CommandManifest {
            id,
            group,
            aliases: decl.aliases,
            describe: decl.describe,
            flags: decl.flags,
            examples: decl.examples,
            requires: decl.requires,
            source_package: package_name.to_string(),
            package_root: package_root.to_path_buf(),
            kind: ManifestKind::Plugin,
            handler: decl.handler,
            loader: None,
        });
    }

    Ok(manifests)
}

/// Result of a guarded manifest load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Loaded manifests, or a single unavailable entry if loading failed.
    Loaded(Vec<ManifestEntry>),
    /// The load did not finish in time; the package is skipped.
    TimedOut,
}

impl LoadOutcome {
    pub fn into_entries(self) -> Vec<ManifestEntry> {
        match self {
            Self::Loaded(entries) => entries,
            Self::TimedOut => Vec::new(),
        }
    }
}

/// Load a package's manifest, bounded by `timeout`.
///
/// - Timeout: logs a warning and yields [`LoadOutcome::TimedOut`].
/// - Environmental failure (unreadable, unparsable, missing module): yields
///   one [`ManifestEntry::Unavailable`] with a remediation hint.
/// - Authoring failure (duplicate id or alias): returned as `Err`.
pub async fn load_with_timeout(
    loader: &dyn ManifestLoader,
    manifest_path: &Path,
    package_name: &str,
    package_root: &Path,
    timeout: Duration,
) -> Result<LoadOutcome> {
    let load = loader.load(manifest_path, package_name, package_root);
    match tokio::time::timeout(timeout, load).await {
        Err(_) => {
            warn!(
                package = package_name,
                timeout_ms = timeout.as_millis() as u64,
                "manifest load timed out, skipping package"
            );
            Ok(LoadOutcome::TimedOut)
        }
        Ok(Ok(manifests)) => Ok(LoadOutcome::Loaded(
            manifests.into_iter().map(ManifestEntry::Loaded).collect(),
        )),
        Ok(Err(e)) if e.is_authoring_error() => Err(e),
        Ok(Err(e)) => {
            warn!(package = package_name, error = %e, "manifest unavailable");
            Ok(LoadOutcome::Loaded(vec![ManifestEntry::Unavailable(
                unavailable_from_error(package_name, package_root, &e),
            )]))
        }
    }
}

/// Build the unavailable record for a failed load.
pub fn unavailable_from_error(
    package_name: &str,
    package_root: &Path,
    error: &Error,
) -> UnavailableManifest {
    let text = error.to_string();
    let requires = extract_missing_module(&text);
    let hint = requires
        .as_deref()
        .map(|module| remediation_hint(package_name, module));

    UnavailableManifest {
        package: package_name.to_string(),
        package_root: package_root.to_path_buf(),
        reason: text,
        requires,
        hint,
    }
}
