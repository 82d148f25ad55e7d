//! Integration tests for configuration file discovery

use kb_core::{ConfigLoader, SnapshotMode};
use kb_test_utils::TestWorkspace;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

#[tokio::test]
async fn test_defaults_without_config_file() {
    let ws = TestWorkspace::new();
    let loaded = ConfigLoader::new(ws.root()).with_env(no_env).load().await.unwrap();

    assert_eq!(loaded.path, None);
    assert_eq!(loaded.config.snapshot.mode, SnapshotMode::Producer);
    assert_eq!(loaded.config.snapshot.ttl_ms, 600_000);
    assert_eq!(loaded.config.channel.namespace, "kb");
    assert_eq!(loaded.config.cache_root(ws.root()), ws.path(".kb/cache"));
    assert!(!loaded.config.telemetry);
}

#[rstest]
#[case::json(
    "kb.config.json",
    r#"{"registry": {"snapshot": {"mode": "consumer", "ttlMs": 1000}}}"#
)]
#[case::dot_kb_json(
    ".kb/kb.config.json",
    r#"{"registry": {"snapshot": {"mode": "consumer", "ttlMs": 1000}}}"#
)]
#[case::toml("kb.config.toml", "[registry.snapshot]\nmode = \"consumer\"\nttlMs = 1000\n")]
#[tokio::test]
async fn test_config_file_formats(#[case] file: &str, #[case] content: &str) {
    let ws = TestWorkspace::new();
    ws.write_file(file, content);

    let loaded = ConfigLoader::new(ws.root()).with_env(no_env).load().await.unwrap();

    assert_eq!(loaded.path, Some(ws.path(file)));
    assert_eq!(loaded.config.snapshot.mode, SnapshotMode::Consumer);
    assert_eq!(loaded.config.snapshot.ttl_ms, 1000);
    // Unset keys keep their defaults
    assert_eq!(loaded.config.snapshot.refresh_interval_ms, 60_000);
}

#[tokio::test]
async fn test_root_file_wins_over_dot_kb() {
    let ws = TestWorkspace::new();
    ws.write_file("kb.config.json", r#"{"registry": {"channel": {"namespace": "root"}}}"#);
    ws.write_file(".kb/kb.config.json", r#"{"registry": {"channel": {"namespace": "nested"}}}"#);

    let loaded = ConfigLoader::new(ws.root()).with_env(no_env).load().await.unwrap();

    assert_eq!(loaded.config.channel.namespace, "root");
}

#[tokio::test]
async fn test_env_overrides_file() {
    let ws = TestWorkspace::new();
    ws.write_file(
        "kb.config.json",
        r#"{"registry": {"snapshot": {"mode": "producer"}, "channel": {"namespace": "file"}}}"#,
    );
    let env: HashMap<&str, &str> = HashMap::from([
        ("KB_CACHE_MODE", "consumer"),
        ("KB_CACHE_NAMESPACE", "env"),
        ("KB_CACHE_URL", "redis://localhost:6379"),
        ("KB_LOG_LEVEL", "debug"),
    ]);

    let loaded = ConfigLoader::new(ws.root())
        .with_env(move |name| env.get(name).map(|v| v.to_string()))
        .load()
        .await
        .unwrap();

    assert_eq!(loaded.config.snapshot.mode, SnapshotMode::Consumer);
    assert_eq!(loaded.config.channel.namespace, "env");
    assert_eq!(
        loaded.config.channel.url.as_deref(),
        Some("redis://localhost:6379")
    );
    assert_eq!(loaded.config.log_level.as_deref(), Some("debug"));
    assert_eq!(loaded.config.channel_keys().registry_changed, "env:registry:changed");
}

#[tokio::test]
async fn test_malformed_config_is_an_error() {
    let ws = TestWorkspace::new();
    ws.write_file("kb.config.json", "{ registry: ");

    let result = ConfigLoader::new(ws.root()).with_env(no_env).load().await;

    assert!(result.is_err());
}
