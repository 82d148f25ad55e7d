//! Discovery through registration to a consumer's index

use async_trait::async_trait;
use kb_channel::{MemoryStore, SharedStore};
use kb_core::{RefreshOrigin, RegistryConfig, RegistryService, SnapshotMode};
use kb_discovery::{DiscoveryOrigin, DiscoverySource};
use kb_manifest::{BuiltinTable, CommandHandler, CommandManifest, LoaderHandle, ManifestKind};
use kb_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

struct Version;

#[async_trait]
impl CommandHandler for Version {
    fn label(&self) -> String {
        "builtin version".into()
    }

    async fn invoke(&self, _argv: &[String]) -> kb_manifest::Result<i32> {
        Ok(0)
    }
}

fn builtins() -> BuiltinTable {
    let mut table = BuiltinTable::new();
    table.register(
        CommandManifest {
            id: "core:version".into(),
            group: "core".into(),
            aliases: vec!["version".into()],
            describe: "Print the host version".into(),
            flags: vec![],
            examples: vec![],
            requires: vec![],
            source_package: "@kb-labs/cli".into(),
            package_root: PathBuf::new(),
            kind: ManifestKind::Builtin,
            handler: None,
            loader: None,
        },
        LoaderHandle::new(Version),
    );
    table
}

fn registry(ws: &TestWorkspace, mode: SnapshotMode, store: &MemoryStore) -> RegistryService {
    let mut config = RegistryConfig::default();
    config.snapshot.mode = mode;
    let store: Arc<dyn SharedStore> = Arc::new(store.clone());
    RegistryService::builder(ws.root(), config)
        .store(store)
        .builtins(builtins())
        .build()
}

#[tokio::test]
async fn test_workspace_command_shadows_installed_plugin() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_installed_plugin("@kb-labs/devlink-legacy", "0.9.0", &["devlink:plan", "devlink:old"]);
    let store = MemoryStore::new();

    let producer = registry(&ws, SnapshotMode::Producer, &store);
    producer.refresh(false).await.unwrap();
    let consumer = registry(&ws, SnapshotMode::Consumer, &store);
    consumer.reload().await.unwrap();

    let index = consumer.index();
    let winner = index.get("devlink:plan").unwrap();
    assert_eq!(winner.source, DiscoverySource::Workspace);
    assert_eq!(winner.manifest.source_package, "@kb-labs/devlink");
    assert!(index.get("devlink:old").is_some());

    let shadowed: Vec<_> = index
        .shadowed()
        .map(|c| (c.id().to_string(), c.manifest.source_package.clone()))
        .collect();
    assert_eq!(
        shadowed,
        vec![("devlink:plan".to_string(), "@kb-labs/devlink-legacy".to_string())]
    );
}

#[tokio::test]
async fn test_unmet_requirement_is_visible_but_not_executable() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_package("packages/ai", "@kb-labs/ai", "1.0.0");
    ws.add_manifest(
        "packages/ai",
        json!([{ "id": "ai:review", "requires": ["@kb-labs/llm-sdk"] }]),
    );
    let store = MemoryStore::new();

    let producer = registry(&ws, SnapshotMode::Producer, &store);
    let outcome = producer.refresh(false).await.unwrap();
    assert!(!outcome.snapshot.partial);

    let consumer = registry(&ws, SnapshotMode::Consumer, &store);
    consumer.reload().await.unwrap();
    let command = consumer.resolve("ai:review").unwrap();
    assert!(!command.available);
    assert!(!command.is_executable());
    assert_eq!(
        command.unavailable_reason.as_deref(),
        Some("missing dependency @kb-labs/llm-sdk")
    );
    assert_eq!(command.hint.as_deref(), Some("pnpm add @kb-labs/llm-sdk"));
}

#[tokio::test]
async fn test_builtin_handlers_survive_the_snapshot() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    let store = MemoryStore::new();

    registry(&ws, SnapshotMode::Producer, &store)
        .refresh(false)
        .await
        .unwrap();
    let consumer = registry(&ws, SnapshotMode::Consumer, &store);
    consumer.reload().await.unwrap();

    let version = consumer.resolve("version").unwrap();
    assert_eq!(version.id(), "core:version");
    assert_eq!(version.source, DiscoverySource::Builtin);
    assert!(version.is_executable());
    let handler = version.manifest.loader.clone().unwrap();
    assert_eq!(handler.invoke(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_disk_cache_is_shared_between_producer_runs() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.write_lockfile("lockfileVersion: '9.0'\n");
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    let store = MemoryStore::new();

    let first = registry(&ws, SnapshotMode::Producer, &store);
    let outcome = first.refresh(false).await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Discovery(DiscoveryOrigin::Fresh));

    let second = registry(&ws, SnapshotMode::Producer, &store);
    let outcome = second.start().await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Discovery(DiscoveryOrigin::Disk));
    assert!(second.index().contains("core:version"));
    assert_eq!(outcome.snapshot.rev, 2);

    // A lockfile change invalidates the whole cache file
    ws.write_lockfile("lockfileVersion: '9.1'\n");
    let third = registry(&ws, SnapshotMode::Producer, &store);
    let outcome = third.start().await.unwrap();
    assert_eq!(outcome.origin, RefreshOrigin::Discovery(DiscoveryOrigin::Fresh));
}

#[tokio::test]
async fn test_disabling_a_plugin_removes_its_commands() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_command_package("packages/release", "@kb-labs/release", &["release:run"]);
    let store = MemoryStore::new();
    let producer = registry(&ws, SnapshotMode::Producer, &store);
    producer.refresh(false).await.unwrap();
    assert!(producer.index().contains("release:run"));

    ws.write_plugin_state(&[], &["@kb-labs/release"], &[]);
    let outcome = producer.refresh(false).await.unwrap();

    // The memory tier still holds the old pass until bypassed
    assert_eq!(outcome.origin, RefreshOrigin::Discovery(DiscoveryOrigin::Memory));
    producer.refresh(true).await.unwrap();
    assert!(!producer.index().contains("release:run"));
    assert!(producer.index().contains("devlink:plan"));
}
