//! Registry snapshots for the KB command registry.
//!
//! A [`Snapshot`] is a versioned, checksummed view of the whole command
//! index. The producer builds and persists one after every refresh;
//! consumers only ever load them. Loading never fails: a corrupted primary
//! file falls back to the backup, then to the shared cache, and finally to
//! an empty snapshot flagged `partial` and `corrupted`.
//!
//! # Files
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<cacheRoot>/registry.json` | primary |
//! | `<cacheRoot>/registry.prev.json` | previous primary, copied before each write |
//! | `<cacheRoot>/registry.tmp.json.<random>` | staging for the atomic rename |

pub mod error;
pub mod health;
pub mod manager;
pub mod snapshot;

pub use error::{Error, Result};
pub use health::{ComponentHealth, HealthReport, HealthStatus, SnapshotHealth, evaluate};
pub use manager::{LoadOrigin, LoadReport, SnapshotManager};
pub use snapshot::{
    CHECKSUM_ALGORITHM, PluginBrief, SNAPSHOT_SCHEMA, Snapshot, SnapshotSource, compute_checksum,
    verify_document,
};
