//! Producer to consumer replication over a shared store
//!
//! Every test wires a producer and one or more consumers to the same
//! in-memory store, the way cooperating processes share one cache server.

use kb_channel::{MemoryStore, SharedStore};
use kb_core::{RefreshOrigin, RegistryConfig, RegistryService, SnapshotMode};
use kb_snapshot::{HealthStatus, LoadOrigin};
use kb_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_command_package("packages/release", "@kb-labs/release", &["release:run"]);
    ws
}

fn registry(
    ws: &TestWorkspace,
    mode: SnapshotMode,
    store: &MemoryStore,
    cache_root: Option<PathBuf>,
) -> RegistryService {
    let mut config = RegistryConfig::default();
    config.snapshot.mode = mode;
    config.snapshot.refresh_interval_ms = 50;
    config.cache_root = cache_root;
    let store: Arc<dyn SharedStore> = Arc::new(store.clone());
    RegistryService::builder(ws.root(), config).store(store).build()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}

#[tokio::test]
async fn test_watchers_follow_every_published_rev() {
    let ws = workspace();
    let store = MemoryStore::new();
    let producer = registry(&ws, SnapshotMode::Producer, &store, None);
    let cancel = CancellationToken::new();

    let mut watchers = Vec::new();
    let mut consumers = Vec::new();
    for _ in 0..3 {
        let consumer = Arc::new(registry(&ws, SnapshotMode::Consumer, &store, None));
        consumers.push(consumer.clone());
        let cancel = cancel.clone();
        watchers.push(tokio::spawn(async move { consumer.watch(cancel).await }));
    }

    producer.start().await.unwrap();
    eventually(|| consumers.iter().all(|c| c.snapshots().rev() == 1)).await;

    ws.add_command_package("packages/lint", "@kb-labs/lint", &["lint:check"]);
    producer.refresh(true).await.unwrap();
    eventually(|| consumers.iter().all(|c| c.index().contains("lint:check"))).await;

    for consumer in &consumers {
        assert_eq!(consumer.snapshots().rev(), 2);
        assert_eq!(consumer.index().len(), producer.index().len());
    }

    cancel.cancel();
    for watcher in watchers {
        watcher.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_remote_consumer_reads_shared_cache() {
    let ws = workspace();
    let store = MemoryStore::new();
    let producer = registry(&ws, SnapshotMode::Producer, &store, None);
    producer.refresh(false).await.unwrap();

    // A consumer on another host has no access to the producer's files
    let elsewhere = TempDir::new().unwrap();
    let consumer = registry(
        &ws,
        SnapshotMode::Consumer,
        &store,
        Some(elsewhere.path().to_path_buf()),
    );
    let outcome = consumer.reload().await.unwrap();

    assert_eq!(outcome.origin, RefreshOrigin::Snapshot(LoadOrigin::SharedCache));
    assert_eq!(outcome.snapshot.rev, 1);
    assert!(consumer.index().contains("release:run"));
    assert_eq!(outcome.health.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_tampered_snapshot_recovers_from_backup() {
    let ws = workspace();
    let store = MemoryStore::new();
    {
        let producer = registry(&ws, SnapshotMode::Producer, &store, None);
        producer.refresh(false).await.unwrap();
        producer.refresh(true).await.unwrap();
    }

    let primary = ws.path(".kb/cache/registry.json");
    let text = std::fs::read_to_string(&primary).unwrap();
    assert!(text.contains("Run devlink:plan"));
    std::fs::write(&primary, text.replace("Run devlink:plan", "Run tampered")).unwrap();

    let consumer = registry(&ws, SnapshotMode::Consumer, &store, None);
    let outcome = consumer.reload().await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Snapshot(LoadOrigin::Backup));
    assert_eq!(outcome.snapshot.rev, 1);
    assert!(!outcome.snapshot.corrupted);

    // A restarted producer never reuses a rev it has seen on disk
    let producer = registry(&ws, SnapshotMode::Producer, &store, None);
    let next = producer.start().await.unwrap();
    assert_eq!(next.snapshot.rev, 3);

    let outcome = consumer.reload().await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Snapshot(LoadOrigin::Primary));
    assert_eq!(outcome.snapshot.rev, 3);
}

#[tokio::test]
async fn test_everything_corrupted_serves_empty_degraded_registry() {
    let ws = workspace();
    ws.write_file(".kb/cache/registry.json", "{\"schemaTag\": ");
    ws.write_file(".kb/cache/registry.prev.json", "not json");

    let consumer = registry(&ws, SnapshotMode::Consumer, &MemoryStore::new(), None);
    let outcome = consumer.reload().await.unwrap();

    assert_eq!(outcome.origin, RefreshOrigin::Snapshot(LoadOrigin::Empty));
    assert!(outcome.snapshot.partial);
    assert!(outcome.snapshot.corrupted);
    assert!(consumer.index().is_empty());
    assert_eq!(outcome.health.status, HealthStatus::Degraded);
    assert!(
        outcome
            .health
            .components
            .iter()
            .any(|c| c.name == "registry" && c.last_error.is_some())
    );
}

#[tokio::test]
async fn test_namespaces_isolate_registries() {
    let ws = workspace();
    let store = MemoryStore::new();
    let producer = registry(&ws, SnapshotMode::Producer, &store, None);
    producer.refresh(false).await.unwrap();

    let elsewhere = TempDir::new().unwrap();
    let mut config = RegistryConfig::default();
    config.snapshot.mode = SnapshotMode::Consumer;
    config.channel.namespace = "other".to_string();
    config.cache_root = Some(elsewhere.path().to_path_buf());
    let shared: Arc<dyn SharedStore> = Arc::new(store.clone());
    let consumer = RegistryService::builder(ws.root(), config)
        .store(shared)
        .build();

    let outcome = consumer.reload().await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Snapshot(LoadOrigin::Empty));
}
