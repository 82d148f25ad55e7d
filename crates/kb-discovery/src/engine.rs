//! The discovery engine: enumerate, locate, load concurrently, dedupe.

use futures::future::join_all;
use kb_manifest::{
    BuiltinTable, DEFAULT_LOAD_TIMEOUT_MS, FileManifestLoader, LoadOutcome, ManifestEntry,
    ManifestLoader, attach_handler, load_with_timeout, unavailable_from_error,
};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::package::{PackageDescriptor, locate_manifest};
use crate::state::PluginState;
use crate::types::{Candidate, Discovery, DiscoveryOrigin, DiscoveryResult, DiscoverySource};
use crate::workspace;
use crate::Result;

/// Which sources to scan and how long each manifest load may take.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub workspace: bool,
    pub node_modules: bool,
    /// Package-name prefixes trusted without an allow-list entry.
    pub trusted_scopes: Vec<String>,
    pub load_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            workspace: true,
            node_modules: true,
            trusted_scopes: vec!["@kb-labs/".to_string()],
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
        }
    }
}

/// Scans a workspace for command-providing packages.
pub struct DiscoveryEngine {
    options: DiscoveryOptions,
    loader: Arc<dyn ManifestLoader>,
    builtins: BuiltinTable,
}

impl DiscoveryEngine {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            loader: Arc::new(FileManifestLoader::new()),
            builtins: BuiltinTable::new(),
        }
    }

    /// Replace the manifest loader.
    pub fn with_loader(mut self, loader: Arc<dyn ManifestLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Commands compiled into the host.
    pub fn with_builtins(mut self, builtins: BuiltinTable) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    pub fn builtins(&self) -> &BuiltinTable {
        &self.builtins
    }

    fn is_trusted(&self, name: &str) -> bool {
        self.options
            .trusted_scopes
            .iter()
            .any(|scope| name.starts_with(scope.as_str()))
    }

    async fn candidate_from_dir(
        &self,
        dir: &Path,
        source: DiscoverySource,
        state: &PluginState,
    ) -> Option<Candidate> {
        let descriptor = match PackageDescriptor::read(dir).await {
            Ok(d) => d,
            Err(e) => {
                if source != DiscoverySource::NodeModules {
                    warn!(dir = %dir.display(), error = %e, "skipping package with unreadable descriptor");
                }
                return None;
            }
        };
        let name = descriptor.name.clone()?;

        if state.is_blocked(&name) {
            debug!(package = %name, "plugin blocked by state file");
            return None;
        }
        if source == DiscoverySource::NodeModules
            && !(descriptor.is_plugin() && (self.is_trusted(&name) || state.is_allowed(&name)))
        {
            return None;
        }

        let Some(manifest_path) = locate_manifest(dir, &descriptor).await else {
            debug!(package = %name, %source, "no manifest found");
            return None;
        };

        Some(Candidate {
            name,
            version: descriptor.version,
            source,
            root: dir.to_path_buf(),
            manifest_path,
        })
    }

    async fn candidates_from(
        &self,
        dirs: Vec<PathBuf>,
        source: DiscoverySource,
        state: &PluginState,
    ) -> Vec<Candidate> {
        let scans = dirs
            .iter()
            .map(|dir| self.candidate_from_dir(dir, source, state));
        join_all(scans).await.into_iter().flatten().collect()
    }

    /// Workspace members that carry a manifest.
    ///
    /// Cheap enough to run on every cache read: it only reads descriptors
    /// and checks for manifest files.
    pub async fn workspace_candidates(&self, root: &Path) -> Result<Vec<Candidate>> {
        if !self.options.workspace {
            return Ok(Vec::new());
        }
        let state = PluginState::load(root).await;
        let members = workspace::workspace_members(root).await?;
        Ok(self
            .candidates_from(members, DiscoverySource::Workspace, &state)
            .await)
    }

    /// Every candidate package, deduplicated by name.
    pub async fn candidates(&self, root: &Path) -> Result<Vec<Candidate>> {
        // Parse the root descriptor first so a broken one fails the pass
        workspace::read_root_descriptor(root).await?;
        let state = PluginState::load(root).await;

        let mut all = self.workspace_candidates(root).await?;
        all.extend(
            self.candidates_from(state.linked_dirs(root), DiscoverySource::Linked, &state)
                .await,
        );
        if self.options.node_modules {
            let installed = workspace::installed_packages(root).await;
            all.extend(
                self.candidates_from(installed, DiscoverySource::NodeModules, &state)
                    .await,
            );
        }

        Ok(dedupe(all))
    }

    /// One builtin result per package that contributed builtins.
    pub fn builtin_results(&self) -> Vec<DiscoveryResult> {
        let mut by_package: BTreeMap<String, DiscoveryResult> = BTreeMap::new();
        for manifest in self.builtins.manifests() {
            let result = by_package
                .entry(manifest.source_package.clone())
                .or_insert_with(|| DiscoveryResult {
                    source: DiscoverySource::Builtin,
                    package_name: manifest.source_package.clone(),
                    package_version: None,
                    manifest_path: PathBuf::new(),
                    package_root: manifest.package_root.clone(),
                    manifests: Vec::new(),
                });
            result.manifests.push(ManifestEntry::Loaded(manifest));
        }
        by_package.into_values().collect()
    }

    /// Run a full, uncached discovery pass.
    ///
    /// All manifests load concurrently and every load settles before the
    /// results are assembled. A package that fails degrades to an
    /// unavailable entry; a package that times out is skipped. The pass
    /// fails only for a broken root descriptor or an authoring error in a
    /// workspace package.
    pub async fn discover(&self, root: &Path) -> Result<Discovery> {
        let candidates = self.candidates(root).await?;
        info!(root = %root.display(), candidates = candidates.len(), "discovering plugins");

        let loads = candidates.iter().map(|candidate| async move {
            let outcome = load_with_timeout(
                self.loader.as_ref(),
                &candidate.manifest_path,
                &candidate.name,
                &candidate.root,
                self.options.load_timeout,
            )
            .await;
            (candidate, outcome)
        });
        let settled = join_all(loads).await;

        let mut results = self.builtin_results();
        let mut timed_out = Vec::new();
        let mut fatal = None;

        for (candidate, outcome) in settled {
            let entries = match outcome {
                Ok(LoadOutcome::TimedOut) => {
                    timed_out.push(candidate.name.clone());
                    continue;
                }
                Ok(LoadOutcome::Loaded(entries)) => entries,
                Err(e) if candidate.source == DiscoverySource::Workspace => {
                    fatal.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    warn!(package = %candidate.name, error = %e, "broken plugin manifest");
                    vec![ManifestEntry::Unavailable(unavailable_from_error(
                        &candidate.name,
                        &candidate.root,
                        &e,
                    ))]
                }
            };
            results.push(self.result_for(candidate, entries));
        }

        if let Some(e) = fatal {
            return Err(e.into());
        }

        sort_results(&mut results);
        Ok(Discovery::new(results, timed_out, DiscoveryOrigin::Fresh))
    }

    fn result_for(&self, candidate: &Candidate, mut entries: Vec<ManifestEntry>) -> DiscoveryResult {
        for entry in &mut entries {
            if let ManifestEntry::Loaded(manifest) = entry {
                attach_handler(manifest, &self.builtins);
            }
        }
        DiscoveryResult {
            source: candidate.source,
            package_name: candidate.name.clone(),
            package_version: candidate.version.clone(),
            manifest_path: candidate.manifest_path.clone(),
            package_root: candidate.root.clone(),
            manifests: entries,
        }
    }
}

/// Order results by source priority, then package name.
pub fn sort_results(results: &mut [DiscoveryResult]) {
    results.sort_by(|a, b| {
        (Reverse(a.source.priority()), &a.package_name)
            .cmp(&(Reverse(b.source.priority()), &b.package_name))
    });
}

/// Keep one candidate per package name.
///
/// The higher-priority source wins outright; within one source the higher
/// semver version wins, and the first seen wins when versions don't parse.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_name: HashMap<String, Candidate> = HashMap::new();

    for candidate in candidates {
        match by_name.get(&candidate.name) {
            Some(existing) if !outranks(&candidate, existing) => {
                debug!(
                    package = %candidate.name,
                    kept = %existing.source,
                    dropped = %candidate.source,
                    "duplicate package"
                );
            }
            _ => {
                by_name.insert(candidate.name.clone(), candidate);
            }
        }
    }

    let mut deduped: Vec<Candidate> = by_name.into_values().collect();
    deduped.sort_by(|a, b| a.name.cmp(&b.name));
    deduped
}

fn outranks(candidate: &Candidate, existing: &Candidate) -> bool {
    let (new, old) = (candidate.source.priority(), existing.source.priority());
    if new != old {
        return new > old;
    }
    let parse = |v: &Option<String>| v.as_deref().and_then(|s| semver::Version::parse(s).ok());
    match (parse(&candidate.version), parse(&existing.version)) {
        (Some(new), Some(old)) => new > old,
        _ => false,
    }
}
