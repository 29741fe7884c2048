//! Snapshot model and the naming convention that joins the two jobs.
//!
//! A failsafe copy's name is derived from its automated source by dropping the
//! 4-character source-type tag (`rds:` on RDS, `auto` elsewhere) plus one separator
//! following it, then prepending `failsafe-`. The derived name is the only
//! idempotence mechanism: both jobs re-derive it on every run and compare by exact name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker carried by every copy this crate creates
pub const FAILSAFE_PREFIX: &str = "failsafe-";

/// Length of the source-type tag on automated snapshot names
pub const SOURCE_PREFIX_LEN: usize = 4;

/// At most one of these is dropped after the source-type tag
const TAG_SEPARATORS: [char; 2] = ['-', ':'];

/// Separator between the account/region qualifier and the name of a shared snapshot
pub const QUALIFIER_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Automated,
    Manual,
    Shared,
}

impl SnapshotKind {
    /// Value of the provider's `SnapshotType` filter
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Automated => "automated",
            SnapshotKind::Manual => "manual",
            SnapshotKind::Shared => "shared",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "automated" => Some(SnapshotKind::Automated),
            "manual" => Some(SnapshotKind::Manual),
            "shared" => Some(SnapshotKind::Shared),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Creating,
    Available,
    Failed,
    /// Any other provider state (copying, deleting, ...)
    Other(String),
}

impl SnapshotStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "creating" => SnapshotStatus::Creating,
            "available" => SnapshotStatus::Available,
            "failed" => SnapshotStatus::Failed,
            other => SnapshotStatus::Other(other.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SnapshotStatus::Available)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::Creating => f.write_str("creating"),
            SnapshotStatus::Available => f.write_str("available"),
            SnapshotStatus::Failed => f.write_str("failed"),
            SnapshotStatus::Other(s) => f.write_str(s),
        }
    }
}

/// A cluster snapshot as reported by the provider. Never persisted locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Snapshot identifier. Shared snapshots carry their fully-qualified ARN here.
    pub identifier: String,
    /// Cluster the snapshot was taken from
    pub cluster_id: String,
    pub kind: SnapshotKind,
    pub status: SnapshotStatus,
    /// Absent until the snapshot is available
    pub created_at: Option<DateTime<Utc>>,
    /// Accounts granted restore access (only populated where the provider reports it)
    pub shared_with: Vec<String>,
}

impl Snapshot {
    /// Creation time used for ordering.
    ///
    /// Anything not yet available sorts as `now`, so an in-flight copy is always the
    /// newest entry and never looks old to retention.
    pub fn effective_created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (&self.status, self.created_at) {
            (SnapshotStatus::Available, Some(created_at)) => created_at,
            _ => now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }
}

/// Derive the failsafe copy name from an automated snapshot name.
///
/// `rds:db1-2024-01-01-03-10` becomes `failsafe-db1-2024-01-01-03-10` and `auto-001`
/// becomes `failsafe-001`. Names shorter than the tag collapse to the bare marker.
pub fn derive_target_name(source: &str) -> String {
    let rest = match source.char_indices().nth(SOURCE_PREFIX_LEN) {
        Some((offset, _)) => &source[offset..],
        None => "",
    };
    let stem = rest.strip_prefix(TAG_SEPARATORS).unwrap_or(rest);
    format!("{}{}", FAILSAFE_PREFIX, stem)
}

/// True when a manual snapshot named exactly `target` already exists
pub fn is_already_copied(target: &str, manuals: &[Snapshot]) -> bool {
    manuals.iter().any(|s| s.identifier == target)
}

pub fn has_failsafe_marker(name: &str) -> bool {
    name.starts_with(FAILSAFE_PREFIX)
}

/// Match a shared snapshot's qualified identifier against a plain target name.
///
/// The identifier must end with `:<target>`; a bare substring or suffix without the
/// separator does not match.
pub fn matches_shared_identifier(qualified: &str, target: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    match qualified.strip_suffix(target) {
        Some(head) => head.ends_with(QUALIFIER_SEPARATOR),
        None => false,
    }
}
