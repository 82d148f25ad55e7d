//! Notification payloads. Wake-up signals only, never snapshot data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published on `<ns>:registry:changed` after every snapshot persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryChanged {
    pub rev: u64,
    pub generated_at: DateTime<Utc>,
}

/// Published on `<ns>:health:changed` after every producer refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChanged {
    pub status: String,
    pub ts: DateTime<Utc>,
}
