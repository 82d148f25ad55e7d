//! Manifest data model.
//!
//! # Example manifest
//!
//! ```json
//! {
//!   "schema": "kb.cli/1",
//!   "group": "devlink",
//!   "commands": [
//!     {
//!       "id": "plan",
//!       "aliases": ["dl:plan"],
//!       "describe": "Plan workspace links",
//!       "flags": [{ "name": "dry-run", "type": "boolean", "alias": "d" }],
//!       "requires": ["@kb-labs/devlink-core"],
//!       "handler": { "bin": "bin/plan.sh" }
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::handler::LoaderHandle;

/// Manifest file as written by a plugin author.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestFile {
    /// Schema tag, must equal [`MANIFEST_SCHEMA`](crate::MANIFEST_SCHEMA).
    pub schema: String,
    /// Default group for ids declared without a namespace.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub commands: Vec<CommandDecl>,
}

/// One command as declared in a manifest file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandDecl {
    pub id: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub describe: String,
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub handler: Option<HandlerSpec>,
}

/// Value type of a command flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    #[default]
    String,
    Boolean,
    Number,
    Array,
}

/// A flag accepted by a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: FlagKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// Where a command's executable lives, relative to its package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub bin: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How a manifest's handler is re-attached after deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// Declared by an installed or workspace package, run as a subprocess.
    #[default]
    Plugin,
    /// Compiled into the host binary.
    Builtin,
}

/// A normalized, immutable command manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandManifest {
    /// Fully qualified `namespace:command` id.
    pub id: String,
    pub group: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub describe: String,
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub source_package: String,
    #[serde(default)]
    pub package_root: PathBuf,
    #[serde(default)]
    pub kind: ManifestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerSpec>,
    /// Runtime handle; never serialized, see [`attach_handler`](crate::attach_handler).
    #[serde(skip)]
    pub loader: Option<LoaderHandle>,
}

impl CommandManifest {
    /// Id followed by aliases, the names this command may be invoked by.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Namespace part of the id (`devlink` for `devlink:plan`).
    pub fn namespace(&self) -> &str {
        self.id.split_once(':').map(|(ns, _)| ns).unwrap_or(&self.group)
    }

    pub fn is_executable(&self) -> bool {
        self.loader.is_some()
    }
}

impl PartialEq for CommandManifest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.group == other.group
            && self.aliases == other.aliases
            && self.describe == other.describe
            && self.flags == other.flags
            && self.examples == other.examples
            && self.requires == other.requires
            && self.source_package == other.source_package
            && self.package_root == other.package_root
            && self.kind == other.kind
            && self.handler == other.handler
    }
}

/// Placeholder recorded for a package whose manifest could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableManifest {
    pub package: String,
    #[serde(default)]
    pub package_root: PathBuf,
    /// Human-readable explanation, shown in place of a description.
    pub reason: String,
    /// Module or dependency that appears to be missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    /// Remediation for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl UnavailableManifest {
    /// Description shown wherever a command description would appear.
    pub fn describe(&self) -> String {
        format!("{} is unavailable: {}", self.package, self.reason)
    }
}

/// Either a loaded manifest or the explicit record of a failed load.
///
/// Unavailable entries carry no handler, so downstream code cannot treat
/// them as executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ManifestEntry {
    Loaded(CommandManifest),
    Unavailable(UnavailableManifest),
}

impl ManifestEntry {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn as_loaded(&self) -> Option<&CommandManifest> {
        match self {
            Self::Loaded(manifest) => Some(manifest),
            Self::Unavailable(_) => None,
        }
    }

    pub fn package(&self) -> &str {
        match self {
            Self::Loaded(manifest) => &manifest.source_package,
            Self::Unavailable(unavailable) => &unavailable.package,
        }
    }
}
