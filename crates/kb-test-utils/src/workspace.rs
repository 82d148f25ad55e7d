//! [`TestWorkspace`] builder for discovery and registry scenarios.

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A temporary monorepo with helpers for laying out packages.
///
/// # Example
///
/// ```rust,no_run
/// use kb_test_utils::TestWorkspace;
///
/// let ws = TestWorkspace::new();
/// ws.init_root(&["packages/*"]);
/// ws.add_command_package("packages/devlink", "@kb-labs/devlink", &["devlink:plan"]);
/// ws.assert_file_exists("packages/devlink/kb.manifest.json");
/// ```
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write_file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn write_json(&self, rel: &str, value: &Value) -> PathBuf {
        self.write_file(rel, &serde_json::to_string_pretty(value).unwrap())
    }

    /// Root `package.json` declaring the given workspace globs.
    pub fn init_root(&self, patterns: &[&str]) {
        self.write_json(
            "package.json",
            &json!({ "name": "kb-root", "private": true, "workspaces": patterns }),
        );
    }

    /// A package descriptor at `dir` with no manifest.
    pub fn add_package(&self, dir: &str, name: &str, version: &str) -> PathBuf {
        self.write_json(
            &format!("{dir}/package.json"),
            &json!({ "name": name, "version": version }),
        );
        self.path(dir)
    }

    /// `kb.manifest.json` at `dir` declaring `commands` verbatim.
    pub fn add_manifest(&self, dir: &str, commands: Value) -> PathBuf {
        self.write_json(
            &format!("{dir}/kb.manifest.json"),
            &json!({ "schema": "kb.cli/1", "commands": commands }),
        )
    }

    /// A workspace package with one manifest command per id.
    pub fn add_command_package(&self, dir: &str, name: &str, ids: &[&str]) -> PathBuf {
        self.add_package(dir, name, "1.0.0");
        self.add_manifest(dir, commands_for(ids));
        self.path(dir)
    }

    /// An installed dependency under `node_modules` flagged as a plugin.
    pub fn add_installed_plugin(&self, name: &str, version: &str, ids: &[&str]) -> PathBuf {
        let dir = format!("node_modules/{name}");
        self.write_json(
            &format!("{dir}/package.json"),
            &json!({ "name": name, "version": version, "kb": { "plugin": true } }),
        );
        self.add_manifest(&dir, commands_for(ids));
        self.path(&dir)
    }

    /// An executable-looking handler script under a package.
    pub fn add_handler_bin(&self, dir: &str, bin: &str) -> PathBuf {
        self.write_file(&format!("{dir}/{bin}"), "#!/bin/sh\nexit 0\n")
    }

    /// `.kb/plugins.json`.
    pub fn write_plugin_state(&self, enabled: &[&str], disabled: &[&str], linked: &[&str]) {
        self.write_json(
            ".kb/plugins.json",
            &json!({ "enabled": enabled, "disabled": disabled, "linked": linked }),
        );
    }

    pub fn write_lockfile(&self, content: &str) {
        self.write_file("pnpm-lock.yaml", content);
    }

    /// Move the modification time of `rel` forward without changing its bytes.
    pub fn touch(&self, rel: &str) {
        let path = self.path(rel);
        let current = fs::metadata(&path).unwrap().modified().unwrap();
        let later = current.max(SystemTime::now()) + Duration::from_secs(2);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    /// Assert that `rel` exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, rel: &str) {
        let full_path = self.path(rel);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that `rel` does **not** exist.
    pub fn assert_file_not_exists(&self, rel: &str) {
        let full_path = self.path(rel);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `rel` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, rel: &str, content: &str) {
        let full_path = self.path(rel);
        let file_content = fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()));
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            full_path.display(),
            content,
            file_content
        );
    }
}

fn commands_for(ids: &[&str]) -> Value {
    Value::Array(
        ids.iter()
            .map(|id| json!({ "id": id, "describe": format!("Run {id}") }))
            .collect(),
    )
}
