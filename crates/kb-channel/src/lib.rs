//! Replication channel for the KB command registry.
//!
//! Producers mirror the full snapshot into a shared key-value store and
//! publish a small `{rev, generatedAt}` notification after every persist.
//! Consumers treat a notification only as a wake-up signal and reload the
//! snapshot from its source of truth.
//!
//! The store itself sits behind [`SharedStore`]; [`MemoryStore`] is the
//! in-process implementation. Each connection role (publisher, subscriber,
//! shared cache) has its own [`ConnectionTracker`] and reconnects with the
//! delays produced by [`ReconnectPolicy`].

pub mod channel;
pub mod connection;
pub mod error;
pub mod notify;
pub mod reconnect;
pub mod store;

pub use channel::{ChannelKeys, RegistryStream, ReplicationChannel};
pub use connection::{ConnectionRole, ConnectionState, ConnectionTracker};
pub use error::{Error, Result};
pub use notify::{HealthChanged, RegistryChanged};
pub use reconnect::ReconnectPolicy;
pub use store::{MemoryStore, SharedStore, Subscription};
