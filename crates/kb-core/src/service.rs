//! Producer refresh and consumer reload for one workspace.

use kb_channel::{RegistryChanged, RegistryStream, ReplicationChannel, SharedStore};
use kb_discovery::{DiscoveryEngine, DiscoveryOrigin, DiscoveryService};
use kb_fs::{Clock, SystemClock};
use kb_manifest::{BuiltinTable, ManifestLoader};
use kb_registry::{CommandIndex, RegisteredCommand, Registrar};
use kb_snapshot::{
    ComponentHealth, HealthReport, LoadOrigin, Snapshot, SnapshotManager, SnapshotSource,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RegistryConfig, SnapshotMode};
use crate::refresh::SingleFlight;
use crate::{Error, Result};

/// What produced the current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    /// Producer: a discovery pass answered from this tier.
    Discovery(DiscoveryOrigin),
    /// Consumer: a snapshot loaded from this source.
    Snapshot(LoadOrigin),
}

/// Result of one refresh or reload.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: Snapshot,
    pub health: HealthReport,
    pub origin: RefreshOrigin,
    /// Packages skipped because their manifest load timed out.
    pub timed_out: Vec<String>,
    /// This caller joined a run started by another caller.
    pub shared: bool,
}

type Flight = SingleFlight<std::result::Result<RefreshOutcome, Arc<Error>>>;

/// Builder for [`RegistryService`].
pub struct RegistryServiceBuilder {
    root: PathBuf,
    config: RegistryConfig,
    config_file: Option<PathBuf>,
    builtins: BuiltinTable,
    loader: Option<Arc<dyn ManifestLoader>>,
    store: Option<Arc<dyn SharedStore>>,
    clock: Arc<dyn Clock>,
}

impl RegistryServiceBuilder {
    /// Configuration file whose content participates in cache invalidation.
    pub fn config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn builtins(mut self, builtins: BuiltinTable) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ManifestLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Shared cache and pub/sub store. Without one, snapshots stay local.
    pub fn store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> RegistryService {
        let config = self.config;
        let root = self.root;

        let mut engine =
            DiscoveryEngine::new(config.discovery_options()).with_builtins(self.builtins.clone());
        if let Some(loader) = self.loader {
            engine = engine.with_loader(loader);
        }
        let discovery = DiscoveryService::new(
            engine,
            config.cache_settings(&root, self.config_file.as_deref()),
        )
        .with_clock(self.clock.clone());

        if let Some(url) = &config.channel.url
            && self.store.is_none()
        {
            warn!(%url, "no shared store client for url, snapshots stay local");
        }
        let channel = self.store.map(|store| {
            Arc::new(ReplicationChannel::new(
                store,
                config.channel_keys(),
                config.channel.reconnect,
            ))
        });

        let mut snapshots = SnapshotManager::new(config.cache_root(&root), config.snapshot_ttl())
            .with_clock(self.clock.clone());
        if let Some(channel) = &channel {
            snapshots = snapshots.with_channel(channel.clone());
        }

        RegistryService {
            registrar: Registrar::new(&root),
            root,
            config,
            discovery,
            snapshots,
            channel,
            builtins: self.builtins,
            index: RwLock::new(Arc::new(CommandIndex::default())),
            flight: SingleFlight::new(),
            last_error: Mutex::new(None),
            clock: self.clock,
        }
    }
}

/// The command registry for one workspace.
pub struct RegistryService {
    root: PathBuf,
    config: RegistryConfig,
    discovery: DiscoveryService,
    registrar: Registrar,
    snapshots: SnapshotManager,
    channel: Option<Arc<ReplicationChannel>>,
    builtins: BuiltinTable,
    index: RwLock<Arc<CommandIndex>>,
    flight: Flight,
    last_error: Mutex<Option<String>>,
    clock: Arc<dyn Clock>,
}

impl RegistryService {
    pub fn builder(root: impl Into<PathBuf>, config: RegistryConfig) -> RegistryServiceBuilder {
        RegistryServiceBuilder {
            root: root.into(),
            config,
            config_file: None,
            builtins: BuiltinTable::new(),
            loader: None,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn mode(&self) -> SnapshotMode {
        self.config.snapshot.mode
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn channel(&self) -> Option<&Arc<ReplicationChannel>> {
        self.channel.as_ref()
    }

    /// The current command index.
    pub fn index(&self) -> Arc<CommandIndex> {
        self.index
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Active command for `name`, by id or alias.
    pub fn resolve(&self, name: &str) -> Option<RegisteredCommand> {
        self.index().get(name).cloned()
    }

    fn set_index(&self, index: CommandIndex) {
        *self.index.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(index);
    }

    fn require_mode(&self, operation: &'static str, expected: SnapshotMode) -> Result<()> {
        if self.mode() == expected {
            Ok(())
        } else {
            Err(Error::WrongMode {
                operation,
                expected: expected.as_str(),
                actual: self.mode().as_str(),
            })
        }
    }

    /// Bring the registry up: producers continue the existing rev lineage
    /// and refresh; consumers load the current snapshot.
    pub async fn start(&self) -> Result<RefreshOutcome> {
        match self.mode() {
            SnapshotMode::Producer => {
                let report = self.snapshots.load().await;
                debug!(rev = report.snapshot.rev, origin = %report.origin, "resuming snapshot lineage");
                self.refresh(false).await
            }
            SnapshotMode::Consumer => self.reload().await,
        }
    }

    /// Producer: discover, register, persist, notify.
    pub async fn refresh(&self, no_cache: bool) -> Result<RefreshOutcome> {
        self.require_mode("refresh", SnapshotMode::Producer)?;
        self.guarded(|| self.run_refresh(no_cache)).await
    }

    /// Consumer: load the newest valid snapshot and rebuild the index.
    pub async fn reload(&self) -> Result<RefreshOutcome> {
        self.require_mode("reload", SnapshotMode::Consumer)?;
        self.guarded(|| self.run_reload()).await
    }

    async fn guarded<F, Fut>(&self, task: F) -> Result<RefreshOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RefreshOutcome>>,
    {
        let (outcome, shared) = self
            .flight
            .run(move || async move { task().await.map_err(Arc::new) })
            .await;
        match outcome {
            Ok(mut outcome) => {
                outcome.shared = shared;
                Ok(outcome)
            }
            Err(e) => Err(Error::from_shared(e)),
        }
    }

    async fn run_refresh(&self, no_cache: bool) -> Result<RefreshOutcome> {
        let result = self.refresh_pipeline(no_cache).await;
        self.record(&result);
        let mut outcome = result?;
        outcome.health = self.health();
        self.publish_health(&outcome.health).await;
        Ok(outcome)
    }

    async fn refresh_pipeline(&self, no_cache: bool) -> Result<RefreshOutcome> {
        let discovery = self.discovery.discover(&self.root, no_cache).await?;
        let index = self
            .registrar
            .register(&discovery.results, discovery.partial)
            .await?;
        let snapshot = self.snapshots.publish(&index, &self.root).await?;
        self.set_index(index);

        if let Some(channel) = &self.channel {
            let message = RegistryChanged {
                rev: snapshot.rev,
                generated_at: snapshot.generated_at,
            };
            if let Err(e) = channel.publish_registry_changed(&message).await {
                warn!(rev = snapshot.rev, error = %e, "failed to publish registry change");
            }
        }

        info!(
            rev = snapshot.rev,
            commands = snapshot.manifest_entries.len(),
            partial = snapshot.partial,
            "registry refreshed"
        );
        Ok(RefreshOutcome {
            health: self.health(),
            snapshot,
            origin: RefreshOrigin::Discovery(discovery.origin),
            timed_out: discovery.timed_out,
            shared: false,
        })
    }

    async fn run_reload(&self) -> Result<RefreshOutcome> {
        let report = self.snapshots.load().await;
        let mut index = report.snapshot.to_index();
        index.attach_handlers(&self.builtins);
        self.set_index(index);

        if report.origin == LoadOrigin::Empty && !report.failures.is_empty() {
            self.set_last_error(Some(report.failures.join("; ")));
        } else {
            self.set_last_error(None);
        }

        Ok(RefreshOutcome {
            health: self.health(),
            snapshot: report.snapshot,
            origin: RefreshOrigin::Snapshot(report.origin),
            timed_out: Vec::new(),
            shared: false,
        })
    }

    /// Reload if `message` announces a rev newer than the current one.
    pub async fn handle_notification(
        &self,
        message: &RegistryChanged,
    ) -> Result<Option<RefreshOutcome>> {
        let known = self.snapshots.rev();
        if message.rev <= known {
            debug!(rev = message.rev, known, "ignoring notification for known rev");
            return Ok(None);
        }
        info!(rev = message.rev, known, "registry changed, reloading");
        self.reload().await.map(Some)
    }

    fn record<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => self.set_last_error(None),
            Err(e) => {
                error!(error = %e, "registry refresh failed");
                self.set_last_error(Some(e.to_string()));
            }
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = error;
    }

    /// Health of the current snapshot and every component.
    pub fn health(&self) -> HealthReport {
        let now = self.clock.now();
        let snapshot = self.snapshots.current().unwrap_or_else(|| {
            let source = SnapshotSource {
                producer_version: env!("CARGO_PKG_VERSION").to_string(),
                cwd: self.root.clone(),
            };
            Snapshot::empty(now, self.config.snapshot_ttl(), source)
        });

        let mut components = vec![ComponentHealth {
            name: "registry".to_string(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone(),
        }];
        if let Some(channel) = &self.channel {
            components.extend(channel.component_errors().into_iter().map(
                |(role, last_error)| ComponentHealth {
                    name: role.to_string(),
                    last_error,
                },
            ));
        }
        kb_snapshot::evaluate(&snapshot, &components, now)
    }

    async fn publish_health(&self, report: &HealthReport) {
        if let Some(channel) = &self.channel
            && let Err(e) = channel.publish_health(&report.notification()).await
        {
            warn!(error = %e, "failed to publish health");
        }
    }

    /// Producer loop: refresh every `refreshIntervalMs` until cancelled.
    ///
    /// The first refresh happens one interval in; call [`start`](Self::start)
    /// beforehand to publish immediately.
    pub async fn serve(&self, cancel: CancellationToken) -> Result<()> {
        self.require_mode("serve", SnapshotMode::Producer)?;
        let mut ticker = tokio::time::interval(self.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        info!(interval_ms = self.config.snapshot.refresh_interval_ms, "producer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Failures are recorded in health; the loop keeps going
                    let _ = self.refresh(false).await;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Consumer loop: reload on newer-rev notifications until cancelled.
    ///
    /// The snapshot file is also re-read every `refreshIntervalMs`, so a
    /// lost notification delays a reload but never prevents it.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<()> {
        self.require_mode("watch", SnapshotMode::Consumer)?;
        self.reload().await?;

        let mut stream = match &self.channel {
            Some(channel) => channel.subscribe_registry(&cancel).await,
            None => None,
        };
        let mut poll = tokio::time::interval(self.config.refresh_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        poll.tick().await;
        info!(subscribed = stream.is_some(), "consumer watching for registry changes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = next_notification(&mut stream) => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_notification(&message).await {
                            warn!(rev = message.rev, error = %e, "failed to apply registry notification");
                        }
                    }
                    None => {
                        warn!("registry notification channel closed");
                        stream = None;
                    }
                },
                _ = poll.tick() => {
                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "periodic registry reload failed");
                    }
                }
            }
        }

        drop(stream);
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        if let Some(channel) = &self.channel {
            channel.quiesce();
        }
        info!("registry service stopped");
    }
}

async fn next_notification(stream: &mut Option<RegistryStream>) -> Option<RegistryChanged> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
