//! Orchestration layer for the KB command registry.
//!
//! [`RegistryService`] wires discovery, registration, snapshots, and the
//! replication channel together for one workspace:
//!
//! - **Producer** mode discovers packages, builds the command index,
//!   persists a snapshot, and notifies consumers.
//! - **Consumer** mode never scans the filesystem. It loads snapshots and
//!   reloads when a notification announces a newer rev.
//!
//! Every refresh and reload passes through one [`SingleFlight`] guard so
//! that timer, manual, and notification-triggered runs never interleave.

pub mod config;
pub mod error;
pub mod refresh;
pub mod service;

pub use config::{
    CONFIG_FILES, ChannelConfig, ConfigLoader, DiscoveryConfig, LoadedConfig, RegistryConfig,
    SnapshotConfig, SnapshotMode,
};
pub use error::{Error, Result};
pub use refresh::SingleFlight;
pub use service::{RefreshOrigin, RefreshOutcome, RegistryService, RegistryServiceBuilder};
