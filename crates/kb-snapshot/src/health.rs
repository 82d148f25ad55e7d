//! Health evaluation over the current snapshot and connection roles.

use chrono::{DateTime, Utc};
use kb_channel::HealthChanged;
use serde::Serialize;

use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotHealth {
    pub rev: u64,
    pub partial: bool,
    pub stale: bool,
    pub corrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ts: DateTime<Utc>,
    pub snapshot: SnapshotHealth,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    /// The small payload published on the health channel.
    pub fn notification(&self) -> HealthChanged {
        HealthChanged {
            status: self.status.as_str().to_string(),
            ts: self.ts,
        }
    }
}

/// Degraded if the snapshot is partial or stale, or any component has an error.
pub fn evaluate(
    snapshot: &Snapshot,
    components: &[ComponentHealth],
    now: DateTime<Utc>,
) -> HealthReport {
    let stale = snapshot.stale || snapshot.is_stale_at(now);
    let degraded = snapshot.partial || stale || components.iter().any(|c| c.last_error.is_some());

    HealthReport {
        status: if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        ts: now,
        snapshot: SnapshotHealth {
            rev: snapshot.rev,
            partial: snapshot.partial,
            stale,
            corrupted: snapshot.corrupted,
        },
        components: components.to_vec(),
    }
}
