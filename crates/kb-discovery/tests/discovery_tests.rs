//! Integration tests for the discovery engine

use async_trait::async_trait;
use kb_discovery::{DiscoveryEngine, DiscoveryOptions, DiscoverySource, Error};
use kb_manifest::{CommandManifest, ManifestEntry, ManifestLoader};
use kb_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn engine() -> DiscoveryEngine {
    DiscoveryEngine::new(DiscoveryOptions::default())
}

fn package_names(results: &[kb_discovery::DiscoveryResult]) -> Vec<&str> {
    results.iter().map(|r| r.package_name.as_str()).collect()
}

#[tokio::test]
async fn test_discovers_workspace_members() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_command_package("packages/release", "@kb-labs/release", &["release:run"]);
    ws.add_package("packages/no-manifest", "@kb-labs/plain", "1.0.0");

    let discovery = engine().discover(ws.root()).await.unwrap();

    assert!(!discovery.partial);
    assert_eq!(
        package_names(&discovery.results),
        vec!["@kb-labs/devlink", "@kb-labs/release"]
    );
    assert!(
        discovery
            .results
            .iter()
            .all(|r| r.source == DiscoverySource::Workspace)
    );
}

#[tokio::test]
async fn test_missing_root_descriptor_is_empty_workspace() {
    let ws = TestWorkspace::new();
    let discovery = engine().discover(ws.root()).await.unwrap();
    assert!(discovery.results.is_empty());
    assert!(!discovery.partial);
}

#[tokio::test]
async fn test_unparsable_root_descriptor_fails() {
    let ws = TestWorkspace::new();
    ws.write_file("package.json", "{ not json");

    let err = engine().discover(ws.root()).await.unwrap_err();
    assert!(matches!(err, Error::RootDescriptor { .. }));
}

#[tokio::test]
async fn test_node_modules_requires_trust_or_allow_list() {
    let ws = TestWorkspace::new();
    ws.init_root(&[]);
    ws.add_installed_plugin("@kb-labs/audit", "1.0.0", &["audit:run"]);
    ws.add_installed_plugin("third-party-tool", "2.0.0", &["tool:run"]);

    let discovery = engine().discover(ws.root()).await.unwrap();
    assert_eq!(package_names(&discovery.results), vec!["@kb-labs/audit"]);

    ws.write_plugin_state(&["third-party-tool"], &[], &[]);
    let discovery = engine().discover(ws.root()).await.unwrap();
    assert_eq!(
        package_names(&discovery.results),
        vec!["@kb-labs/audit", "third-party-tool"]
    );
}

#[tokio::test]
async fn test_disabled_plugin_is_skipped_everywhere() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_installed_plugin("@kb-labs/audit", "1.0.0", &["audit:run"]);
    ws.write_plugin_state(&[], &["@kb-labs/devlink", "@kb-labs/audit"], &[]);

    let discovery = engine().discover(ws.root()).await.unwrap();
    assert!(discovery.results.is_empty());
}

#[tokio::test]
async fn test_linked_packages_are_discovered() {
    let ws = TestWorkspace::new();
    ws.init_root(&[]);
    ws.add_command_package("vendor/linked", "@kb-labs/linked", &["linked:go"]);
    ws.write_plugin_state(&[], &[], &["vendor/linked"]);

    let discovery = engine().discover(ws.root()).await.unwrap();
    assert_eq!(discovery.results.len(), 1);
    assert_eq!(discovery.results[0].source, DiscoverySource::Linked);
    assert_eq!(discovery.results[0].package_root, ws.path("vendor/linked"));
}

#[tokio::test]
async fn test_workspace_copy_shadows_installed_copy() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/audit", "@kb-labs/audit", &["audit:run"]);
    ws.add_installed_plugin("@kb-labs/audit", "9.9.9", &["audit:run"]);

    let discovery = engine().discover(ws.root()).await.unwrap();
    assert_eq!(discovery.results.len(), 1);
    assert_eq!(discovery.results[0].source, DiscoverySource::Workspace);
}

#[tokio::test]
async fn test_missing_handler_degrades_to_unavailable() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_package("packages/broken", "@kb-labs/broken", "1.0.0");
    ws.add_manifest(
        "packages/broken",
        json!([{ "id": "broken:run", "handler": { "bin": "dist/cli.js" } }]),
    );
    ws.add_command_package("packages/ok", "@kb-labs/ok", &["ok:run"]);

    let discovery = engine().discover(ws.root()).await.unwrap();

    assert!(discovery.partial);
    assert!(discovery.timed_out.is_empty());
    let broken = discovery
        .results
        .iter()
        .find(|r| r.package_name == "@kb-labs/broken")
        .unwrap();
    let ManifestEntry::Unavailable(record) = &broken.manifests[0] else {
        panic!("expected an unavailable entry");
    };
    assert_eq!(record.requires.as_deref(), Some("./dist/cli.js"));
    assert!(record.hint.as_deref().unwrap().starts_with("rebuild @kb-labs/broken"));
}

#[tokio::test]
async fn test_workspace_duplicate_command_is_fatal() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/dup", "@kb-labs/dup", &["dup:run", "dup:run"]);

    let err = engine().discover(ws.root()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Manifest(kb_manifest::Error::DuplicateCommand { .. })
    ));
}

#[tokio::test]
async fn test_installed_duplicate_command_degrades() {
    let ws = TestWorkspace::new();
    ws.init_root(&[]);
    ws.add_installed_plugin("@kb-labs/dup", "1.0.0", &["dup:run", "dup:run"]);

    let discovery = engine().discover(ws.root()).await.unwrap();
    assert!(discovery.partial);
    assert!(discovery.results[0].manifests[0].is_unavailable());
}

struct StalledLoader;

#[async_trait]
impl ManifestLoader for StalledLoader {
    async fn load(
        &self,
        _manifest_path: &Path,
        _package_name: &str,
        _package_root: &Path,
    ) -> kb_manifest::Result<Vec<CommandManifest>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_package_is_skipped_and_marks_partial() {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/slow", "@kb-labs/slow", &["slow:run"]);

    let discovery = engine()
        .with_loader(Arc::new(StalledLoader))
        .discover(ws.root())
        .await
        .unwrap();

    assert!(discovery.partial);
    assert!(discovery.results.is_empty());
    assert_eq!(discovery.timed_out, vec!["@kb-labs/slow".to_string()]);
}
