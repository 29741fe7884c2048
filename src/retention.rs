//! Retention decisions for failsafe copies.
//!
//! The two accounts use different policies:
//! - Live account cleanup: every manual snapshot carrying the `failsafe-` marker
//!   goes, regardless of age. Anything else is ignored.
//! - Failsafe account pruning: every *available* manual snapshot whose age in whole
//!   days reaches the threshold goes, marker or not.

use chrono::{DateTime, Utc};

use crate::snapshot::{has_failsafe_marker, Snapshot};

pub const DEFAULT_RETENTION_DAYS: i64 = 2;

/// Age-based retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Snapshots this many whole days old (or older) are deleted
    pub days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(days: i64) -> Self {
        Self { days }
    }
}

/// Whole days elapsed since creation, rounded down
pub fn age_in_days(now: DateTime<Utc>, created_at: DateTime<Utc>) -> i64 {
    now.signed_duration_since(created_at).num_days()
}

/// A snapshot with its computed age
#[derive(Debug, Clone)]
pub struct AgedSnapshot {
    pub snapshot: Snapshot,
    pub age_days: i64,
}

/// Result of retention analysis
#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    /// Available snapshots younger than the threshold
    pub keep: Vec<AgedSnapshot>,
    /// Available snapshots at or past the threshold
    pub delete: Vec<AgedSnapshot>,
    /// Not yet available; never considered old
    pub skipped: Vec<Snapshot>,
}

impl PrunePlan {
    pub fn has_deletions(&self) -> bool {
        !self.delete.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Keep: {} snapshots, Delete: {} snapshots, Skipped (not available): {}",
            self.keep.len(),
            self.delete.len(),
            self.skipped.len()
        )
    }
}

/// Decide which manual snapshots of the failsafe account to delete
pub fn analyze_retention(
    snapshots: &[Snapshot],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> PrunePlan {
    let mut plan = PrunePlan::default();

    for snapshot in snapshots {
        let created_at = match (snapshot.is_available(), snapshot.created_at) {
            (true, Some(created_at)) => created_at,
            _ => {
                plan.skipped.push(snapshot.clone());
                continue;
            }
        };

        let aged = AgedSnapshot {
            snapshot: snapshot.clone(),
            age_days: age_in_days(now, created_at),
        };
        if aged.age_days >= policy.days {
            plan.delete.push(aged);
        } else {
            plan.keep.push(aged);
        }
    }

    plan
}

/// Result of the live account's pre-copy cleanup
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    pub delete: Vec<Snapshot>,
    /// Manual snapshots without the marker, left alone
    pub ignored: Vec<Snapshot>,
}

/// Retire every previous failsafe copy; never touch anything else
pub fn cleanup_plan(manuals: &[Snapshot]) -> CleanupPlan {
    let (delete, ignored): (Vec<Snapshot>, Vec<Snapshot>) = manuals
        .iter()
        .cloned()
        .partition(|s| has_failsafe_marker(&s.identifier));
    CleanupPlan { delete, ignored }
}

/// Format age of a snapshot in human-readable form
pub fn format_age(now: DateTime<Utc>, created_at: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(created_at);

    if age.num_hours() < 1 {
        format!("{} min old", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{} hours old", age.num_hours())
    } else {
        format!("{} days old", age.num_days())
    }
}
