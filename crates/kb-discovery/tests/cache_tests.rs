//! Integration tests for the disk cache and the cached discovery service

use chrono::{Duration as ChronoDuration, Utc};
use kb_discovery::{
    CacheLookup, CacheSettings, DiscoveryEngine, DiscoveryOptions, DiscoveryOrigin,
    DiscoveryService, DiskCache, Fingerprint, MissReason,
};
use kb_fs::ManualClock;
use kb_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const MINUTE_MS: i64 = 60_000;
const T0: i64 = 1_700_000_000_000;

fn workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.write_lockfile("lockfileVersion: '9.0'\n");
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_command_package("packages/release", "@kb-labs/release", &["release:run"]);
    ws
}

async fn fingerprint(ws: &TestWorkspace) -> Fingerprint {
    Fingerprint::compute(ws.root(), "test-host", "1.0.0", None)
        .await
        .unwrap()
}

/// Run a fresh pass and write the cache at `T0`.
async fn primed(ws: &TestWorkspace) -> (DiscoveryEngine, DiskCache) {
    let engine = DiscoveryEngine::new(DiscoveryOptions::default());
    let cache = DiskCache::new(&ws.path(".kb/cache"), Duration::from_secs(300));
    let discovery = engine.discover(ws.root()).await.unwrap();
    cache
        .write(&fingerprint(ws).await, &discovery.results, T0)
        .await
        .unwrap();
    (engine, cache)
}

async fn lookup(ws: &TestWorkspace, engine: &DiscoveryEngine, cache: &DiskCache, at: i64) -> CacheLookup {
    let candidates = engine.workspace_candidates(ws.root()).await.unwrap();
    cache.lookup(&fingerprint(ws).await, &candidates, at).await
}

#[tokio::test]
async fn test_within_ttl_unchanged_mtimes_skip_hashing() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;

    match lookup(&ws, &engine, &cache, T0 + 2 * MINUTE_MS).await {
        CacheLookup::Hit { results, revalidated } => {
            assert_eq!(results.len(), 2);
            assert_eq!(revalidated, 0);
        }
        CacheLookup::Miss(reason) => panic!("unexpected miss: {reason}"),
    }
}

#[tokio::test]
async fn test_within_ttl_touched_manifest_misses() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.touch("packages/devlink/kb.manifest.json");

    let outcome = lookup(&ws, &engine, &cache, T0 + 2 * MINUTE_MS).await;
    assert!(matches!(
        outcome,
        CacheLookup::Miss(MissReason::PackageChanged(ref p)) if p == "@kb-labs/devlink"
    ));
}

#[tokio::test]
async fn test_after_ttl_touched_but_identical_content_is_accepted() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.touch("packages/devlink/kb.manifest.json");

    match lookup(&ws, &engine, &cache, T0 + 6 * MINUTE_MS).await {
        CacheLookup::Hit { revalidated, .. } => assert_eq!(revalidated, 2),
        CacheLookup::Miss(reason) => panic!("unexpected miss: {reason}"),
    }

    // Re-stamped: the next lookup is back on the cheap path
    match lookup(&ws, &engine, &cache, T0 + 7 * MINUTE_MS).await {
        CacheLookup::Hit { revalidated, .. } => assert_eq!(revalidated, 0),
        CacheLookup::Miss(reason) => panic!("unexpected miss: {reason}"),
    }
}

#[tokio::test]
async fn test_after_ttl_changed_bytes_are_rejected() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.add_manifest(
        "packages/release",
        json!([{ "id": "release:run", "describe": "Changed" }]),
    );

    let outcome = lookup(&ws, &engine, &cache, T0 + 6 * MINUTE_MS).await;
    assert!(matches!(
        outcome,
        CacheLookup::Miss(MissReason::PackageChanged(ref p)) if p == "@kb-labs/release"
    ));
}

#[tokio::test]
async fn test_after_ttl_version_bump_is_rejected() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.add_package("packages/release", "@kb-labs/release", "2.0.0");

    let outcome = lookup(&ws, &engine, &cache, T0 + 6 * MINUTE_MS).await;
    assert!(matches!(outcome, CacheLookup::Miss(MissReason::PackageChanged(_))));
}

#[tokio::test]
async fn test_new_workspace_package_invalidates() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.add_command_package("packages/audit", "@kb-labs/audit", &["audit:run"]);

    let outcome = lookup(&ws, &engine, &cache, T0 + MINUTE_MS).await;
    assert!(matches!(
        outcome,
        CacheLookup::Miss(MissReason::NewPackage(ref p)) if p == "@kb-labs/audit"
    ));
}

#[tokio::test]
async fn test_removed_package_invalidates() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    std::fs::remove_dir_all(ws.path("packages/release")).unwrap();

    let outcome = lookup(&ws, &engine, &cache, T0 + MINUTE_MS).await;
    assert!(matches!(outcome, CacheLookup::Miss(MissReason::PackageRemoved(_))));
}

#[tokio::test]
async fn test_lockfile_change_is_global_mismatch() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.write_lockfile("lockfileVersion: '9.0'\npackages: {}\n");

    let outcome = lookup(&ws, &engine, &cache, T0 + MINUTE_MS).await;
    assert!(matches!(outcome, CacheLookup::Miss(MissReason::GlobalMismatch("lockfile"))));
}

#[tokio::test]
async fn test_plugin_state_change_is_global_mismatch() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    ws.write_plugin_state(&["x"], &[], &[]);

    let outcome = lookup(&ws, &engine, &cache, T0 + MINUTE_MS).await;
    assert!(matches!(
        outcome,
        CacheLookup::Miss(MissReason::GlobalMismatch("plugin state"))
    ));
}

#[tokio::test]
async fn test_corrupted_cache_file_is_a_miss() {
    let ws = workspace();
    let (engine, cache) = primed(&ws).await;
    std::fs::write(cache.path(), "{ truncated").unwrap();

    let outcome = lookup(&ws, &engine, &cache, T0).await;
    assert!(matches!(outcome, CacheLookup::Miss(MissReason::Unreadable(_))));
}

fn service(ws: &TestWorkspace, clock: &ManualClock) -> DiscoveryService {
    let mut settings = CacheSettings::for_root(ws.root());
    settings.cli_version = "1.0.0".into();
    DiscoveryService::new(DiscoveryEngine::new(DiscoveryOptions::default()), settings)
        .with_clock(Arc::new(clock.clone()))
}

#[tokio::test]
async fn test_service_answers_from_each_tier() {
    let ws = workspace();
    let clock = ManualClock::new(Utc::now());

    let first = service(&ws, &clock);
    assert_eq!(
        first.discover(ws.root(), false).await.unwrap().origin,
        DiscoveryOrigin::Fresh
    );
    ws.assert_file_exists(".kb/cache/cli-manifests.json");
    assert_eq!(
        first.discover(ws.root(), false).await.unwrap().origin,
        DiscoveryOrigin::Memory
    );

    // A new process starts with an empty memory tier
    let second = service(&ws, &clock);
    let discovery = second.discover(ws.root(), false).await.unwrap();
    assert_eq!(discovery.origin, DiscoveryOrigin::Disk);
    assert_eq!(discovery.results.len(), 2);

    assert_eq!(
        second.discover(ws.root(), true).await.unwrap().origin,
        DiscoveryOrigin::Fresh
    );
}

#[tokio::test]
async fn test_memory_tier_expires() {
    let ws = workspace();
    let clock = ManualClock::new(Utc::now());
    let svc = service(&ws, &clock);

    svc.discover(ws.root(), false).await.unwrap();
    clock.advance(ChronoDuration::seconds(61));

    assert_eq!(
        svc.discover(ws.root(), false).await.unwrap().origin,
        DiscoveryOrigin::Disk
    );
}

#[tokio::test]
async fn test_partial_pass_is_not_cached() {
    let ws = workspace();
    ws.add_package("packages/broken", "@kb-labs/broken", "1.0.0");
    ws.add_manifest(
        "packages/broken",
        json!([{ "id": "broken:run", "handler": { "bin": "dist/cli.js" } }]),
    );
    let clock = ManualClock::new(Utc::now());
    let svc = service(&ws, &clock);

    let discovery = svc.discover(ws.root(), false).await.unwrap();
    assert!(discovery.partial);
    ws.assert_file_not_exists(".kb/cache/cli-manifests.json");
    assert_eq!(
        svc.discover(ws.root(), false).await.unwrap().origin,
        DiscoveryOrigin::Fresh
    );
}

#[tokio::test]
async fn test_invalidate_drops_both_tiers() {
    let ws = workspace();
    let clock = ManualClock::new(Utc::now());
    let svc = service(&ws, &clock);

    svc.discover(ws.root(), false).await.unwrap();
    svc.invalidate().await.unwrap();

    ws.assert_file_not_exists(".kb/cache/cli-manifests.json");
    assert_eq!(
        svc.discover(ws.root(), false).await.unwrap().origin,
        DiscoveryOrigin::Fresh
    );
}
