//! Filesystem primitives for the KB command registry
//!
//! Provides canonical hashing, atomic file I/O, a format-agnostic
//! configuration store, and an injectable clock shared by the discovery
//! cache and the snapshot manager.

pub mod canonical;
pub mod clock;
pub mod error;
pub mod io;
pub mod store;

pub use canonical::{canonicalize, hash_bytes, hash_file, hash_value};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use store::ConfigStore;
