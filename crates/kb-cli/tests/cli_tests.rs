//! End-to-end tests that invoke the compiled `kb-registry` binary

use assert_cmd::Command;
use kb_test_utils::TestWorkspace;
use predicates::prelude::*;
use serde_json::Value;

/// Get a Command for the kb-registry binary rooted at `ws`
fn kb_cmd(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("kb-registry").expect("Failed to find kb-registry binary");
    cmd.arg("--root").arg(ws.root());
    for var in ["KB_ROOT", "KB_CACHE_MODE", "KB_CACHE_NAMESPACE", "KB_CACHE_URL", "KB_LOG_LEVEL"] {
        cmd.env_remove(var);
    }
    cmd
}

fn workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.init_root(&["packages/*"]);
    ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
    ws.add_command_package("packages/release", "@kb-labs/release", &["release:run"]);
    ws
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should be JSON")
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("kb-registry")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("kb-registry")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kb-registry"));
}

#[test]
fn test_refresh_then_list() {
    let ws = workspace();

    kb_cmd(&ws)
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot rev 1"));
    ws.assert_file_exists(".kb/cache/registry.json");

    kb_cmd(&ws)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("devlink:plan"))
        .stdout(predicate::str::contains("release:run"));

    kb_cmd(&ws)
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot rev 2"));
}

#[test]
fn test_list_without_snapshot() {
    let ws = workspace();

    kb_cmd(&ws)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No registry snapshot"));
}

#[test]
fn test_discover_json_does_not_publish() {
    let ws = workspace();

    let output = kb_cmd(&ws)
        .args(["discover", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json = stdout_json(&output);
    assert_eq!(json["origin"], "fresh");
    assert_eq!(json["partial"], false);
    assert_eq!(json["results"].as_array().map(Vec::len), Some(2));
    ws.assert_file_not_exists(".kb/cache/registry.json");
}

#[test]
fn test_health_json_after_refresh() {
    let ws = workspace();
    kb_cmd(&ws).arg("refresh").assert().success();

    let output = kb_cmd(&ws)
        .args(["health", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json = stdout_json(&output);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["snapshot"]["rev"], 1);
}

#[test]
fn test_health_degraded_without_snapshot() {
    let ws = workspace();

    kb_cmd(&ws)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("degraded"));
}

#[test]
fn test_workspace_collision_fails_refresh() {
    let ws = workspace();
    ws.add_command_package("packages/clash", "@kb-labs/clash", &["devlink:plan"]);

    kb_cmd(&ws)
        .arg("refresh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("declared by both"));
}

#[test]
fn test_missing_root_fails() {
    let ws = TestWorkspace::new();

    Command::cargo_bin("kb-registry")
        .unwrap()
        .arg("--root")
        .arg(ws.path("does-not-exist"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
}
