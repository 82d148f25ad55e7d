//! Command manifests for the KB command registry.
//!
//! A plugin package declares its commands in a static manifest file
//! (`kb.manifest.json` or `kb.manifest.toml`). This crate parses and
//! normalizes those files into [`CommandManifest`]s, turns load failures
//! into explicit [`ManifestEntry::Unavailable`] records, and defines the
//! [`CommandHandler`] ABI through which commands are actually invoked.
//!
//! Reading a manifest never executes plugin code.

pub mod error;
pub mod handler;
pub mod loader;
pub mod types;
pub mod unavailable;

/// Schema tag every manifest file must declare.
pub const MANIFEST_SCHEMA: &str = "kb.cli/1";

/// Default per-package load timeout in milliseconds.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 1500;

pub use error::{Error, Result};
pub use handler::{BuiltinTable, CommandHandler, LoaderHandle, SubprocessHandler, attach_handler};
pub use loader::{
    FileManifestLoader, LoadOutcome, ManifestLoader, load_with_timeout, normalize,
    unavailable_from_error,
};
pub use types::{
    CommandManifest, FlagKind, FlagSpec, HandlerSpec, ManifestEntry, ManifestFile, ManifestKind,
    UnavailableManifest,
};
pub use unavailable::{extract_missing_module, remediation_hint};
