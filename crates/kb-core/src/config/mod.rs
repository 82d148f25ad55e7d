//! Registry configuration
//!
//! Configuration is read from the first file that exists, in this order:
//!
//! 1. `kb.config.json`
//! 2. `.kb/kb.config.json`
//! 3. `kb.config.toml`
//!
//! Only the `registry` section is consumed. Environment overrides are
//! applied on top:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `KB_LOG_LEVEL` | log level for the binary |
//! | `KB_CACHE_MODE` | `producer` or `consumer` |
//! | `KB_CACHE_NAMESPACE` | shared-cache key prefix |
//! | `KB_CACHE_URL` | shared-cache connection string |
//! | `KB_TELEMETRY` | `on` / `off` |
//! | `KB_TELEMETRY_DISABLED`, `DO_NOT_TRACK` | force telemetry off |

mod loader;
mod settings;

pub use loader::{CONFIG_FILES, ConfigLoader, LoadedConfig};
pub use settings::{ChannelConfig, DiscoveryConfig, RegistryConfig, SnapshotConfig, SnapshotMode};
