//! Two-tier discovery cache.
//!
//! The in-process [`MemoryTier`] answers repeated calls within a short TTL
//! without any I/O. The on-disk [`DiskCache`] survives across process
//! invocations and is validated in three steps:
//!
//! 1. Global triggers: host runtime / CLI version, lockfile, config, and
//!    plugin-state hashes. Any mismatch discards the whole file.
//! 2. Per-package checks. Before the file's TTL has elapsed only the
//!    descriptor and manifest mtimes are compared. After it, the manifest
//!    content hash and package version are recomputed and are
//!    authoritative; surviving entries are re-stamped.
//! 3. A scan for workspace packages that are not in the cache at all.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kb_fs::{hash_bytes, hash_value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::package::{DESCRIPTOR_FILE, PackageDescriptor};
use crate::state::PluginState;
use crate::types::{Candidate, DiscoveryResult, DiscoverySource};
use crate::Result;

/// Cache file name inside the cache root.
pub const CACHE_FILE_NAME: &str = "cli-manifests.json";

/// Lockfiles checked, in order, for the lockfile trigger.
pub const LOCKFILES: &[&str] = &["pnpm-lock.yaml", "package-lock.json", "yarn.lock"];

/// Global invalidation inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub host_runtime_version: String,
    pub cli_version: String,
    pub lockfile_hash: String,
    pub config_hash: String,
    pub plugins_state_hash: String,
}

impl Fingerprint {
    /// Hash the invalidation inputs of `root`.
    pub async fn compute(
        root: &Path,
        host_runtime_version: &str,
        cli_version: &str,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        let mut lockfile_hash = String::new();
        for name in LOCKFILES {
            let hash = kb_fs::canonical::hash_optional_file(&root.join(name)).await?;
            if !hash.is_empty() {
                lockfile_hash = hash;
                break;
            }
        }

        let config_hash = match config_file {
            Some(path) => kb_fs::canonical::hash_optional_file(path).await?,
            None => String::new(),
        };
        let plugins_state_hash =
            kb_fs::canonical::hash_optional_file(&PluginState::path(root)).await?;

        Ok(Self {
            host_runtime_version: host_runtime_version.to_string(),
            cli_version: cli_version.to_string(),
            lockfile_hash,
            config_hash,
            plugins_state_hash,
        })
    }

    /// Combined hash of every trigger.
    pub fn global_state_hash(&self) -> String {
        hash_value(self).unwrap_or_default()
    }

    /// Name of the first trigger that differs from `file`, if any.
    fn first_mismatch(&self, file: &CacheFile) -> Option<&'static str> {
        if self.host_runtime_version != file.host_runtime_version {
            Some("host runtime version")
        } else if self.cli_version != file.cli_version {
            Some("cli version")
        } else if self.lockfile_hash != file.lockfile_hash {
            Some("lockfile")
        } else if self.config_hash != file.config_hash {
            Some("config")
        } else if self.plugins_state_hash != file.plugins_state_hash {
            Some("plugin state")
        } else if self.global_state_hash() != file.global_state_hash {
            Some("global state")
        } else {
            None
        }
    }
}

/// Per-package record in the cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCacheEntry {
    #[serde(default)]
    pub package_version: Option<String>,
    pub manifest_content_hash: String,
    pub manifest_path: PathBuf,
    pub package_descriptor_mtime: i64,
    pub manifest_mtime: i64,
    pub cached_at: i64,
    pub result: DiscoveryResult,
}

/// On-disk cache document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFile {
    pub host_runtime_version: String,
    pub cli_version: String,
    /// Write time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub ttl_ms: u64,
    pub global_state_hash: String,
    pub lockfile_hash: String,
    pub config_hash: String,
    pub plugins_state_hash: String,
    pub packages: BTreeMap<String, PackageCacheEntry>,
}

/// Why the disk cache could not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Unreadable(String),
    GlobalMismatch(&'static str),
    PackageRemoved(String),
    PackageChanged(String),
    NewPackage(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "no cache file"),
            Self::Unreadable(msg) => write!(f, "unreadable cache file: {msg}"),
            Self::GlobalMismatch(trigger) => write!(f, "{trigger} changed"),
            Self::PackageRemoved(p) => write!(f, "package {p} was removed"),
            Self::PackageChanged(p) => write!(f, "package {p} changed"),
            Self::NewPackage(p) => write!(f, "new workspace package {p}"),
        }
    }
}

/// Answer of a disk-cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit {
        results: Vec<DiscoveryResult>,
        /// Packages whose content hash had to be recomputed.
        revalidated: usize,
    },
    Miss(MissReason),
}

/// Cheap-or-authoritative outcome of checking one entry.
enum EntryCheck {
    Fresh,
    Revalidated { descriptor_mtime: i64, manifest_mtime: i64 },
}

/// The on-disk tier.
#[derive(Debug, Clone)]
pub struct DiskCache {
    path: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(cache_root: &Path, ttl: Duration) -> Self {
        Self {
            path: cache_root.join(CACHE_FILE_NAME),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the cache file.
    pub async fn read(&self) -> std::result::Result<CacheFile, MissReason> {
        let content = match kb_fs::io::read_text_optional(&self.path).await {
            Ok(Some(content)) => content,
            Ok(None) => return Err(MissReason::Absent),
            Err(e) => return Err(MissReason::Unreadable(e.to_string())),
        };
        serde_json::from_str(&content).map_err(|e| MissReason::Unreadable(e.to_string()))
    }

    /// Validate the cache against the current state of the workspace.
    ///
    /// `workspace` is the current list of workspace candidates, used to
    /// detect packages added since the cache was written. Returned results
    /// have no handlers attached.
    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
        workspace: &[Candidate],
        now_ms: i64,
    ) -> CacheLookup {
        let mut file = match self.read().await {
            Ok(file) => file,
            Err(reason) => return CacheLookup::Miss(reason),
        };

        if let Some(trigger) = fingerprint.first_mismatch(&file) {
            return CacheLookup::Miss(MissReason::GlobalMismatch(trigger));
        }

        for candidate in workspace {
            match file.packages.get(&candidate.name) {
                None => return CacheLookup::Miss(MissReason::NewPackage(candidate.name.clone())),
                Some(entry) if entry.manifest_path != candidate.manifest_path => {
                    return CacheLookup::Miss(MissReason::PackageChanged(candidate.name.clone()));
                }
                Some(_) => {}
            }
        }

        let expired = now_ms.saturating_sub(file.timestamp) > file.ttl_ms as i64;
        let mut revalidated = 0;

        for (name, entry) in file.packages.iter_mut() {
            match check_entry(name, entry, expired).await {
                Ok(EntryCheck::Fresh) => {}
                Ok(EntryCheck::Revalidated {
                    descriptor_mtime,
                    manifest_mtime,
                }) => {
                    entry.package_descriptor_mtime = descriptor_mtime;
                    entry.manifest_mtime = manifest_mtime;
                    revalidated += 1;
                }
                Err(reason) => return CacheLookup::Miss(reason),
            }
        }

        if expired {
            file.timestamp = now_ms;
            file.ttl_ms = self.ttl.as_millis() as u64;
            if let Err(e) = self.save(&file).await {
                warn!(error = %e, "failed to re-stamp discovery cache");
            }
        }

        debug!(packages = file.packages.len(), revalidated, "discovery cache hit");
        let results = file.packages.into_values().map(|entry| entry.result).collect();
        CacheLookup::Hit {
            results,
            revalidated,
        }
    }

    /// Write a fresh cache file for `results`. Builtin results are skipped.
    pub async fn write(
        &self,
        fingerprint: &Fingerprint,
        results: &[DiscoveryResult],
        now_ms: i64,
    ) -> Result<()> {
        let mut packages = BTreeMap::new();
        for result in results
            .iter()
            .filter(|r| r.source != DiscoverySource::Builtin)
        {
            let descriptor = result.package_root.join(DESCRIPTOR_FILE);
            let content = tokio::fs::read(&result.manifest_path)
                .await
                .map_err(|e| kb_fs::Error::io(&result.manifest_path, e))?;
            packages.insert(
                result.package_name.clone(),
                PackageCacheEntry {
                    package_version: result.package_version.clone(),
                    manifest_content_hash: hash_bytes(&content),
                    manifest_path: result.manifest_path.clone(),
                    package_descriptor_mtime: kb_fs::io::modified_ms(&descriptor).await?,
                    manifest_mtime: kb_fs::io::modified_ms(&result.manifest_path).await?,
                    cached_at: now_ms,
                    result: result.clone(),
                },
            );
        }

        let file = CacheFile {
            host_runtime_version: fingerprint.host_runtime_version.clone(),
            cli_version: fingerprint.cli_version.clone(),
            timestamp: now_ms,
            ttl_ms: self.ttl.as_millis() as u64,
            global_state_hash: fingerprint.global_state_hash(),
            lockfile_hash: fingerprint.lockfile_hash.clone(),
            config_hash: fingerprint.config_hash.clone(),
            plugins_state_hash: fingerprint.plugins_state_hash.clone(),
            packages,
        };
        self.save(&file).await?;
        info!(path = %self.path.display(), packages = file.packages.len(), "discovery cache written");
        Ok(())
    }

    async fn save(&self, file: &CacheFile) -> Result<()> {
        kb_fs::ConfigStore::new().save_async(&self.path, file).await?;
        Ok(())
    }

    /// Delete the cache file.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(kb_fs::Error::io(&self.path, e).into()),
        }
    }
}

async fn check_entry(
    name: &str,
    entry: &PackageCacheEntry,
    expired: bool,
) -> std::result::Result<EntryCheck, MissReason> {
    let removed = || MissReason::PackageRemoved(name.to_string());
    let changed = || MissReason::PackageChanged(name.to_string());

    let descriptor = entry.result.package_root.join(DESCRIPTOR_FILE);
    let descriptor_mtime = kb_fs::io::modified_ms(&descriptor)
        .await
        .map_err(|_| removed())?;
    let manifest_mtime = kb_fs::io::modified_ms(&entry.manifest_path)
        .await
        .map_err(|_| removed())?;
    let mtimes_match = descriptor_mtime == entry.package_descriptor_mtime
        && manifest_mtime == entry.manifest_mtime;

    if !expired {
        return if mtimes_match {
            Ok(EntryCheck::Fresh)
        } else {
            Err(changed())
        };
    }

    let content = tokio::fs::read(&entry.manifest_path)
        .await
        .map_err(|_| removed())?;
    if hash_bytes(&content) != entry.manifest_content_hash {
        return Err(changed());
    }
    let version = PackageDescriptor::read(&entry.result.package_root)
        .await
        .map_err(|_| changed())?
        .version;
    if version != entry.package_version {
        return Err(changed());
    }

    Ok(EntryCheck::Revalidated {
        descriptor_mtime,
        manifest_mtime,
    })
}

struct MemoryEntry {
    root: PathBuf,
    stored_at: DateTime<Utc>,
    results: Vec<DiscoveryResult>,
}

/// The in-process tier: the last full result set, kept for a short TTL.
pub struct MemoryTier {
    ttl: ChronoDuration,
    slot: Mutex<Option<MemoryEntry>>,
}

impl MemoryTier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(60)),
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self, root: &Path, now: DateTime<Utc>) -> Option<Vec<DiscoveryResult>> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.as_ref()
            .filter(|entry| entry.root == root && now - entry.stored_at <= self.ttl)
            .map(|entry| entry.results.clone())
    }

    pub fn put(&self, root: &Path, results: Vec<DiscoveryResult>, now: DateTime<Utc>) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(MemoryEntry {
            root: root.to_path_buf(),
            stored_at: now,
            results,
        });
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }
}

impl fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier").field("ttl", &self.ttl).finish()
    }
}
