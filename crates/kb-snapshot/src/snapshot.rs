//! Snapshot document and its checksum.

use chrono::{DateTime, SubsecRound, Utc};
use kb_discovery::DiscoverySource;
use kb_fs::{canonicalize, hash_bytes};
use kb_manifest::UnavailableManifest;
use kb_registry::{CommandIndex, RegisteredCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Schema tag written into every snapshot.
pub const SNAPSHOT_SCHEMA: &str = "kb.registry/1";

pub const CHECKSUM_ALGORITHM: &str = "sha256";

/// Fields excluded from the checksum input.
const CHECKSUM_FIELDS: [&str; 3] = ["checksum", "checksumAlgorithm", "previousChecksum"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSource {
    pub producer_version: String,
    pub cwd: PathBuf,
}

/// One package's summary in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginBrief {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DiscoverySource>,
    pub package_root: PathBuf,
    pub commands: usize,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Versioned point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_tag: String,
    pub rev: u64,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub partial: bool,
    pub stale: bool,
    pub corrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<String>,
    /// Checksum of the snapshot this one replaced. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_checksum: Option<String>,
    pub source: SnapshotSource,
    pub plugins: Vec<PluginBrief>,
    pub manifest_entries: Vec<RegisteredCommand>,
}

impl Snapshot {
    /// Assemble and seal a snapshot of `index`.
    pub fn from_index(
        index: &CommandIndex,
        rev: u64,
        now: DateTime<Utc>,
        ttl: Duration,
        source: SnapshotSource,
        previous_checksum: Option<String>,
    ) -> Result<Self> {
        let generated_at = now.trunc_subsecs(3);
        let ttl_ms = ttl.as_millis() as u64;
        let mut snapshot = Self {
            schema_tag: SNAPSHOT_SCHEMA.to_string(),
            rev,
            generated_at,
            expires_at: generated_at + chrono::Duration::milliseconds(ttl_ms as i64),
            ttl_ms,
            partial: index.is_partial(),
            stale: false,
            corrupted: false,
            checksum: None,
            checksum_algorithm: None,
            previous_checksum,
            source,
            plugins: plugin_briefs(index),
            manifest_entries: index.commands().to_vec(),
        };
        snapshot.seal()?;
        Ok(snapshot)
    }

    /// The snapshot served when nothing valid could be loaded.
    pub fn empty(now: DateTime<Utc>, ttl: Duration, source: SnapshotSource) -> Self {
        let generated_at = now.trunc_subsecs(3);
        let ttl_ms = ttl.as_millis() as u64;
        Self {
            schema_tag: SNAPSHOT_SCHEMA.to_string(),
            rev: 0,
            generated_at,
            expires_at: generated_at + chrono::Duration::milliseconds(ttl_ms as i64),
            ttl_ms,
            partial: true,
            stale: false,
            corrupted: true,
            checksum: None,
            checksum_algorithm: None,
            previous_checksum: None,
            source,
            plugins: Vec::new(),
            manifest_entries: Vec::new(),
        }
    }

    /// Compute and store the checksum.
    pub fn seal(&mut self) -> Result<()> {
        self.checksum = Some(compute_checksum(self)?);
        self.checksum_algorithm = Some(CHECKSUM_ALGORITHM.to_string());
        Ok(())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Copy with staleness evaluated at `now`; a stale snapshot is also partial.
    pub fn view_at(&self, now: DateTime<Utc>) -> Self {
        let mut view = self.clone();
        view.stale = view.stale || self.is_stale_at(now);
        view.partial = view.partial || view.stale;
        view
    }

    /// Rebuild a command index from the stored entries.
    pub fn to_index(&self) -> CommandIndex {
        let unavailable = self
            .plugins
            .iter()
            .filter(|p| !p.available)
            .map(|p| UnavailableManifest {
                package: p.name.clone(),
                package_root: p.package_root.clone(),
                reason: p.reason.clone().unwrap_or_default(),
                requires: p.requires.clone(),
                hint: p.hint.clone(),
            })
            .collect();
        CommandIndex::new(self.manifest_entries.clone(), unavailable, self.partial)
    }
}

fn plugin_briefs(index: &CommandIndex) -> Vec<PluginBrief> {
    let mut briefs: BTreeMap<String, PluginBrief> = BTreeMap::new();
    for command in index.commands() {
        let brief = briefs
            .entry(command.manifest.source_package.clone())
            .or_insert_with(|| PluginBrief {
                name: command.manifest.source_package.clone(),
                source: Some(command.source),
                package_root: command.manifest.package_root.clone(),
                commands: 0,
                available: true,
                reason: None,
                requires: None,
                hint: None,
            });
        brief.commands += 1;
    }
    for record in index.unavailable() {
        briefs.insert(
            record.package.clone(),
            PluginBrief {
                name: record.package.clone(),
                source: None,
                package_root: record.package_root.clone(),
                commands: 0,
                available: false,
                reason: Some(record.reason.clone()),
                requires: record.requires.clone(),
                hint: record.hint.clone(),
            },
        );
    }
    briefs.into_values().collect()
}

fn checksum_of_value(mut value: Value) -> String {
    if let Value::Object(map) = &mut value {
        for field in CHECKSUM_FIELDS {
            map.remove(field);
        }
    }
    hash_bytes(canonicalize(&value).as_bytes())
}

/// Checksum over every field except the checksum fields themselves.
pub fn compute_checksum(snapshot: &Snapshot) -> Result<String> {
    Ok(checksum_of_value(serde_json::to_value(snapshot)?))
}

/// Parse and validate a stored snapshot document.
///
/// Verification runs on the document as stored, before it is mapped into
/// [`Snapshot`], so unknown fields still count toward the checksum.
pub fn verify_document(text: &str, origin: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::invalid(origin, format!("not valid JSON: {e}")))?;

    let schema = value.get("schemaTag").and_then(Value::as_str);
    if schema != Some(SNAPSHOT_SCHEMA) {
        return Err(Error::invalid(
            origin,
            format!("unsupported schema {}", schema.unwrap_or("<missing>")),
        ));
    }

    let algorithm = value.get("checksumAlgorithm").and_then(Value::as_str);
    if algorithm != Some(CHECKSUM_ALGORITHM) {
        return Err(Error::invalid(origin, "unsupported checksum algorithm"));
    }
    let Some(stored) = value.get("checksum").and_then(Value::as_str).map(str::to_string) else {
        return Err(Error::invalid(origin, "missing checksum"));
    };

    let actual = checksum_of_value(value.clone());
    if actual != stored {
        return Err(Error::invalid(
            origin,
            format!("checksum mismatch (stored {stored}, computed {actual})"),
        ));
    }

    serde_json::from_value(value).map_err(|e| Error::invalid(origin, e.to_string()))
}

/// Best-effort `rev` from a document that failed validation.
pub(crate) fn raw_rev(text: &str) -> Option<u64> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("rev")
        .and_then(Value::as_u64)
}
