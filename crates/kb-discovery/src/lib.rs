//! Discovery of command-providing packages.
//!
//! The [`DiscoveryEngine`] walks workspace members, linked packages, and
//! installed dependencies, then loads every candidate's manifest
//! concurrently. The [`DiscoveryService`] fronts the engine with two cache
//! tiers: a short-lived in-process tier and an on-disk cache file with a
//! graduated revalidation policy.
//!
//! ```text
//! discover(root, no_cache)
//!     |
//!     +-- MemoryTier hit?  -> results
//!     +-- DiskCache valid? -> results (handlers re-attached)
//!     +-- DiscoveryEngine  -> results -> write both tiers
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod package;
pub mod service;
pub mod state;
pub mod types;
pub mod workspace;

pub use cache::{
    CACHE_FILE_NAME, CacheFile, CacheLookup, DiskCache, Fingerprint, MemoryTier, MissReason,
    PackageCacheEntry,
};
pub use engine::{DiscoveryEngine, DiscoveryOptions};
pub use error::{Error, Result};
pub use package::{PackageDescriptor, locate_manifest};
pub use service::{CacheSettings, DiscoveryService};
pub use state::PluginState;
pub use types::{Candidate, Discovery, DiscoveryOrigin, DiscoveryResult, DiscoverySource};
