//! Cached discovery: memory tier, then disk tier, then a fresh pass.

use kb_fs::{Clock, SystemClock};
use kb_manifest::{ManifestEntry, attach_handler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheLookup, DiskCache, Fingerprint, MemoryTier};
use crate::engine::{DiscoveryEngine, sort_results};
use crate::types::{Discovery, DiscoveryOrigin, DiscoveryResult};
use crate::Result;

/// Where the caches live and how long they stay fresh.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub memory_ttl: Duration,
    pub disk_ttl: Duration,
    pub host_runtime_version: String,
    pub cli_version: String,
    /// Configuration file whose content hash invalidates the disk cache.
    pub config_file: Option<PathBuf>,
}

impl CacheSettings {
    /// Defaults for a workspace rooted at `root`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            dir: root.join(".kb").join("cache"),
            memory_ttl: Duration::from_secs(60),
            disk_ttl: Duration::from_secs(300),
            host_runtime_version: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            cli_version: env!("CARGO_PKG_VERSION").to_string(),
            config_file: None,
        }
    }
}

/// Discovery behind the memory and disk caches.
pub struct DiscoveryService {
    engine: DiscoveryEngine,
    memory: MemoryTier,
    disk: DiskCache,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl DiscoveryService {
    pub fn new(engine: DiscoveryEngine, settings: CacheSettings) -> Self {
        Self {
            memory: MemoryTier::new(settings.memory_ttl),
            disk: DiskCache::new(&settings.dir, settings.disk_ttl),
            engine,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &DiscoveryEngine {
        &self.engine
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Discover plugins under `root`.
    ///
    /// With `no_cache` both tiers are bypassed for reading; a complete
    /// fresh pass still refreshes them.
    pub async fn discover(&self, root: &Path, no_cache: bool) -> Result<Discovery> {
        if !no_cache {
            if let Some(results) = self.memory.get(root, self.clock.now()) {
                debug!(root = %root.display(), "discovery served from memory");
                return Ok(Discovery::new(results, Vec::new(), DiscoveryOrigin::Memory));
            }
            if let Some(results) = self.from_disk(root).await? {
                self.memory.put(root, results.clone(), self.clock.now());
                return Ok(Discovery::new(results, Vec::new(), DiscoveryOrigin::Disk));
            }
        }

        let discovery = self.engine.discover(root).await?;
        if discovery.partial {
            debug!(
                timed_out = discovery.timed_out.len(),
                "partial discovery pass, caches not updated"
            );
            return Ok(discovery);
        }

        self.memory
            .put(root, discovery.results.clone(), self.clock.now());
        if let Err(e) = self.write_disk(root, &discovery.results).await {
            warn!(error = %e, "failed to write discovery cache");
        }
        Ok(discovery)
    }

    /// Drop both cache tiers.
    pub async fn invalidate(&self) -> Result<()> {
        self.memory.clear();
        self.disk.clear().await?;
        info!(path = %self.disk.path().display(), "discovery cache cleared");
        Ok(())
    }

    async fn fingerprint(&self, root: &Path) -> Result<Fingerprint> {
        Fingerprint::compute(
            root,
            &self.settings.host_runtime_version,
            &self.settings.cli_version,
            self.settings.config_file.as_deref(),
        )
        .await
    }

    async fn from_disk(&self, root: &Path) -> Result<Option<Vec<DiscoveryResult>>> {
        let fingerprint = self.fingerprint(root).await?;
        let workspace = self.engine.workspace_candidates(root).await?;

        match self
            .disk
            .lookup(&fingerprint, &workspace, self.clock.now_ms())
            .await
        {
            CacheLookup::Hit {
                mut results,
                revalidated,
            } => {
                debug!(packages = results.len(), revalidated, "discovery served from disk");
                for result in &mut results {
                    for entry in &mut result.manifests {
                        if let ManifestEntry::Loaded(manifest) = entry {
                            attach_handler(manifest, self.engine.builtins());
                        }
                    }
                }
                results.extend(self.engine.builtin_results());
                sort_results(&mut results);
                Ok(Some(results))
            }
            CacheLookup::Miss(reason) => {
                debug!(%reason, "discovery cache miss");
                Ok(None)
            }
        }
    }

    async fn write_disk(&self, root: &Path, results: &[DiscoveryResult]) -> Result<()> {
        let fingerprint = self.fingerprint(root).await?;
        self.disk
            .write(&fingerprint, results, self.clock.now_ms())
            .await
    }
}
