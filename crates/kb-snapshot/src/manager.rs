//! Snapshot build, persist, and fallback load.

use kb_channel::ReplicationChannel;
use kb_fs::{Clock, SystemClock};
use kb_registry::CommandIndex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotSource, raw_rev, verify_document};

pub const PRIMARY_FILE: &str = "registry.json";
pub const BACKUP_FILE: &str = "registry.prev.json";

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Primary,
    Backup,
    SharedCache,
    /// Nothing valid was found; an empty snapshot was synthesized.
    Empty,
}

impl fmt::Display for LoadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Backup => "backup",
            Self::SharedCache => "shared cache",
            Self::Empty => "empty",
        })
    }
}

/// Outcome of [`SnapshotManager::load`].
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: Snapshot,
    pub origin: LoadOrigin,
    /// Why each source tried before `origin` was rejected.
    pub failures: Vec<String>,
}

impl LoadReport {
    /// The primary file was not usable.
    pub fn recovered(&self) -> bool {
        self.origin != LoadOrigin::Primary
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    current: Option<Snapshot>,
    /// Highest rev seen in any document, valid or not.
    rev_hint: u64,
    /// The on-disk lineage has been read by [`SnapshotManager::load`].
    lineage_loaded: bool,
}

/// Owns the snapshot files under one cache root.
pub struct SnapshotManager {
    dir: PathBuf,
    ttl: Duration,
    producer_version: String,
    clock: Arc<dyn Clock>,
    channel: Option<Arc<ReplicationChannel>>,
    state: Mutex<ManagerState>,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            clock: Arc::new(SystemClock),
            channel: None,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mirror snapshots to, and recover them from, the shared cache.
    pub fn with_channel(mut self, channel: Arc<ReplicationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_producer_version(mut self, version: impl Into<String>) -> Self {
        self.producer_version = version.into();
        self
    }

    pub fn primary_path(&self) -> PathBuf {
        self.dir.join(PRIMARY_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The last built or loaded snapshot, with staleness evaluated now.
    pub fn current(&self) -> Option<Snapshot> {
        let now = self.clock.now();
        self.lock().current.as_ref().map(|s| s.view_at(now))
    }

    /// Rev of the current snapshot, 0 if there is none.
    pub fn rev(&self) -> u64 {
        self.lock().current.as_ref().map_or(0, |s| s.rev)
    }

    /// Build the next snapshot of `index`.
    ///
    /// The rev is one above every rev this manager has seen, including revs
    /// read from documents that failed validation.
    pub fn build(&self, index: &CommandIndex, cwd: &Path) -> Result<Snapshot> {
        let (rev, previous_checksum) = {
            let state = self.lock();
            let last = state.current.as_ref().map_or(0, |s| s.rev);
            (
                last.max(state.rev_hint) + 1,
                state.current.as_ref().and_then(|s| s.checksum.clone()),
            )
        };
        let source = SnapshotSource {
            producer_version: self.producer_version.clone(),
            cwd: cwd.to_path_buf(),
        };
        Snapshot::from_index(index, rev, self.clock.now(), self.ttl, source, previous_checksum)
    }

    /// Write `snapshot` as the new primary.
    ///
    /// The existing primary is copied to the backup path first, but only
    /// when it verifies, so a corrupted primary never replaces a good
    /// backup. The document is mirrored to the shared cache afterwards.
    /// Backup and mirror failures are logged only.
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let document = serde_json::to_string_pretty(snapshot)?;
        let primary = self.primary_path();

        self.back_up_primary(&primary).await;

        kb_fs::io::write_atomic_async(primary.clone(), document.clone().into_bytes()).await?;
        {
            let mut state = self.lock();
            state.rev_hint = state.rev_hint.max(snapshot.rev);
            state.current = Some(snapshot.clone());
            state.lineage_loaded = true;
        }
        info!(rev = snapshot.rev, path = %primary.display(), "snapshot persisted");

        if let Some(channel) = &self.channel
            && let Err(e) = channel.mirror_snapshot(&document).await
        {
            warn!(error = %e, "failed to mirror snapshot to shared cache");
        }
        Ok(())
    }

    async fn back_up_primary(&self, primary: &Path) {
        let text = match kb_fs::io::read_text_optional(primary).await {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                warn!(path = %primary.display(), error = %e, "failed to read snapshot for backup");
                return;
            }
        };
        if let Err(e) = verify_document(&text, "primary") {
            warn!(error = %e, "not backing up invalid primary snapshot");
            return;
        }
        let backup = self.backup_path();
        if let Err(e) = kb_fs::io::write_atomic_async(backup.clone(), text.into_bytes()).await {
            warn!(path = %backup.display(), error = %e, "failed to back up snapshot");
        }
    }

    /// Build and persist in one step.
    ///
    /// A manager that has neither loaded nor persisted yet reads the
    /// existing files first, so a fresh process continues the rev lineage
    /// already on disk.
    pub async fn publish(&self, index: &CommandIndex, cwd: &Path) -> Result<Snapshot> {
        if !self.lock().lineage_loaded {
            let report = self.load().await;
            debug!(rev = report.snapshot.rev, origin = %report.origin, "continuing snapshot lineage");
        }
        let snapshot = self.build(index, cwd)?;
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// Load the newest valid snapshot: primary, backup, shared cache, empty.
    pub async fn load(&self) -> LoadReport {
        let mut failures = Vec::new();

        for (origin, path) in [
            (LoadOrigin::Primary, self.primary_path()),
            (LoadOrigin::Backup, self.backup_path()),
        ] {
            match kb_fs::io::read_text_optional(&path).await {
                Ok(Some(text)) => match self.validate(&text, origin) {
                    Ok(snapshot) => return self.accept(snapshot, origin, failures),
                    Err(reason) => failures.push(reason),
                },
                Ok(None) => debug!(%origin, path = %path.display(), "no snapshot file"),
                Err(e) => {
                    warn!(%origin, error = %e, "failed to read snapshot");
                    failures.push(format!("{origin}: {e}"));
                }
            }
        }

        if let Some(channel) = &self.channel {
            match channel.fetch_snapshot().await {
                Ok(Some(text)) => match self.validate(&text, LoadOrigin::SharedCache) {
                    Ok(snapshot) => {
                        return self.accept(snapshot, LoadOrigin::SharedCache, failures);
                    }
                    Err(reason) => failures.push(reason),
                },
                Ok(None) => debug!("no snapshot in shared cache"),
                Err(e) => {
                    warn!(error = %e, "failed to read snapshot from shared cache");
                    failures.push(format!("shared cache: {e}"));
                }
            }
        }

        let source = SnapshotSource {
            producer_version: self.producer_version.clone(),
            cwd: self.dir.clone(),
        };
        let empty = Snapshot::empty(self.clock.now(), self.ttl, source);
        warn!(failures = failures.len(), "no valid snapshot found, serving empty registry");
        self.accept(empty, LoadOrigin::Empty, failures)
    }

    fn validate(&self, text: &str, origin: LoadOrigin) -> std::result::Result<Snapshot, String> {
        verify_document(text, &origin.to_string()).map_err(|e| {
            if let Some(rev) = raw_rev(text) {
                let mut state = self.lock();
                state.rev_hint = state.rev_hint.max(rev);
            }
            warn!(%origin, error = %e, "rejecting snapshot");
            e.to_string()
        })
    }

    fn accept(&self, snapshot: Snapshot, origin: LoadOrigin, failures: Vec<String>) -> LoadReport {
        let view = snapshot.view_at(self.clock.now());
        {
            let mut state = self.lock();
            state.rev_hint = state.rev_hint.max(snapshot.rev);
            state.current = Some(snapshot);
            state.lineage_loaded = true;
        }
        if origin != LoadOrigin::Empty {
            info!(rev = view.rev, %origin, stale = view.stale, "snapshot loaded");
        }
        LoadReport {
            snapshot: view,
            origin,
            failures,
        }
    }
}

impl fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish()
    }
}
