//! Command handler ABI.
//!
//! Manifests are pure data. Execution goes through [`CommandHandler`]:
//! plugin commands run as subprocesses of their package, builtin commands
//! are registered in-process through a [`BuiltinTable`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::types::{CommandManifest, ManifestKind};
use crate::{Error, Result};

/// Something that can run a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> String;

    /// Run the command with the given arguments and return its exit code.
    async fn invoke(&self, argv: &[String]) -> Result<i32>;
}

/// Shared, cloneable handle to a [`CommandHandler`].
#[derive(Clone)]
pub struct LoaderHandle(pub Arc<dyn CommandHandler>);

impl LoaderHandle {
    pub fn new(handler: impl CommandHandler + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub async fn invoke(&self, argv: &[String]) -> Result<i32> {
        self.0.invoke(argv).await
    }
}

impl fmt::Debug for LoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoaderHandle").field(&self.0.label()).finish()
    }
}

/// Runs a plugin command as a child process rooted at its package.
#[derive(Debug, Clone)]
pub struct SubprocessHandler {
    pub command: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[async_trait]
impl CommandHandler for SubprocessHandler {
    fn label(&self) -> String {
        format!("subprocess:{}", self.program.display())
    }

    async fn invoke(&self, argv: &[String]) -> Result<i32> {
        debug!(command = %self.command, program = %self.program.display(), "spawning handler");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .args(argv)
            .current_dir(&self.cwd)
            .status()
            .await
            .map_err(|source| Error::Handler {
                command: self.command.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }
}

/// In-process commands compiled into the host.
#[derive(Clone, Default)]
pub struct BuiltinTable {
    entries: HashMap<String, (CommandManifest, LoaderHandle)>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builtin command. The manifest's kind is forced to builtin.
    pub fn register(&mut self, mut manifest: CommandManifest, handler: LoaderHandle) {
        manifest.kind = ManifestKind::Builtin;
        manifest.loader = Some(handler.clone());
        self.entries.insert(manifest.id.clone(), (manifest, handler));
    }

    pub fn handler(&self, id: &str) -> Option<LoaderHandle> {
        self.entries.get(id).map(|(_, handler)| handler.clone())
    }

    /// Manifests of every registered builtin, sorted by id.
    pub fn manifests(&self) -> Vec<CommandManifest> {
        let mut manifests: Vec<CommandManifest> =
            self.entries.values().map(|(m, _)| m.clone()).collect();
        manifests.sort_by(|a, b| a.id.cmp(&b.id));
        manifests
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BuiltinTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.entries.keys().collect();
        ids.sort();
        f.debug_struct("BuiltinTable").field("ids", &ids).finish()
    }
}

/// Re-attach the runtime handler of a deserialized manifest.
///
/// Plugin manifests get a [`SubprocessHandler`] built from their handler
/// spec; builtins are looked up in `builtins`. A manifest with nothing to
/// attach keeps `loader = None` and stays non-executable.
pub fn attach_handler(manifest: &mut CommandManifest, builtins: &BuiltinTable) {
    manifest.loader = match manifest.kind {
        ManifestKind::Builtin => builtins.handler(&manifest.id),
        ManifestKind::Plugin => manifest.handler.as_ref().map(|spec| {
            LoaderHandle::new(SubprocessHandler {
                command: manifest.id.clone(),
                program: manifest.package_root.join(&spec.bin),
                args: spec.args.clone(),
                cwd: manifest.package_root.clone(),
            })
        }),
    };
}
