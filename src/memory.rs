//! In-memory snapshot provider and notifier for tests.
//!
//! Copies behave like the real service: a new copy is missing from the first
//! listing after the request, then reports `creating` for a configurable number
//! of listings, then turns `available`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{Result, SnapshotError};
use crate::notify::{NotificationMessage, Notifier};
use crate::provider::SnapshotProvider;
use crate::snapshot::{Snapshot, SnapshotKind, SnapshotStatus};

/// Mutating call recorded by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Copy { source: String, target: String },
    Delete(String),
    Share { identifier: String, account: String },
}

struct Entry {
    snapshot: Snapshot,
    /// Listings this entry is still missing from
    hidden: u32,
    /// Listings this entry still reports `creating`
    pending: u32,
    /// Listings a deleted entry stays visible as `deleting`
    remove_after: Option<u32>,
}

struct Inner {
    local: Vec<Entry>,
    shared: Vec<Snapshot>,
    calls: Vec<Call>,
    copy_pending: u32,
    delete_linger: u32,
    list_count: u32,
    fail_next_list: Option<String>,
    failing_clusters: HashSet<String>,
}

pub struct InMemoryProvider {
    inner: Mutex<Inner>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                local: Vec::new(),
                shared: Vec::new(),
                calls: Vec::new(),
                copy_pending: 1,
                delete_linger: 0,
                list_count: 0,
                fail_next_list: None,
                failing_clusters: HashSet::new(),
            }),
        }
    }

    fn available(
        cluster_id: &str,
        identifier: &str,
        kind: SnapshotKind,
        days_ago: i64,
    ) -> Snapshot {
        Snapshot {
            identifier: identifier.to_string(),
            cluster_id: cluster_id.to_string(),
            kind,
            status: SnapshotStatus::Available,
            created_at: Some(Utc::now() - Duration::days(days_ago)),
            shared_with: vec![],
        }
    }

    pub fn add_automated(&self, cluster_id: &str, identifier: &str, days_ago: i64) {
        self.add_local(Self::available(cluster_id, identifier, SnapshotKind::Automated, days_ago));
    }

    pub fn add_manual(&self, cluster_id: &str, identifier: &str, days_ago: i64) {
        self.add_local(Self::available(cluster_id, identifier, SnapshotKind::Manual, days_ago));
    }

    /// Add a local snapshot exactly as given
    pub fn add_local(&self, snapshot: Snapshot) {
        self.inner.lock().unwrap().local.push(Entry {
            snapshot,
            hidden: 0,
            pending: 0,
            remove_after: None,
        });
    }

    pub fn add_shared(&self, cluster_id: &str, arn: &str, days_ago: i64) {
        let snapshot = Self::available(cluster_id, arn, SnapshotKind::Shared, days_ago);
        self.inner.lock().unwrap().shared.push(snapshot);
    }

    /// Number of listings a new copy reports `creating` before it turns available
    pub fn set_copy_pending(&self, listings: u32) {
        self.inner.lock().unwrap().copy_pending = listings;
    }

    /// Number of listings a deleted snapshot keeps showing up as `deleting`
    pub fn set_delete_linger(&self, listings: u32) {
        self.inner.lock().unwrap().delete_linger = listings;
    }

    pub fn fail_next_list(&self, code: &str) {
        self.inner.lock().unwrap().fail_next_list = Some(code.to_string());
    }

    /// Every listing for this cluster fails with a permanent error
    pub fn fail_cluster(&self, cluster_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_clusters
            .insert(cluster_id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn list_count(&self) -> u32 {
        self.inner.lock().unwrap().list_count
    }

    pub fn local(&self, identifier: &str) -> Option<Snapshot> {
        self.inner
            .lock()
            .unwrap()
            .local
            .iter()
            .find(|e| e.snapshot.identifier == identifier)
            .map(|e| e.snapshot.clone())
    }

    /// Names of local manual snapshots for a cluster, in insertion order
    pub fn manual_names(&self, cluster_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .local
            .iter()
            .filter(|e| {
                e.snapshot.kind == SnapshotKind::Manual && e.snapshot.cluster_id == cluster_id
            })
            .map(|e| e.snapshot.identifier.clone())
            .collect()
    }
}

#[async_trait]
impl SnapshotProvider for InMemoryProvider {
    async fn list_snapshots(
        &self,
        cluster_id: Option<&str>,
        kind: SnapshotKind,
        _include_shared: bool,
    ) -> Result<Vec<Snapshot>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_count += 1;

        if let Some(code) = inner.fail_next_list.take() {
            return Err(SnapshotError::Provider {
                operation: "DescribeDBClusterSnapshots",
                transient: true,
                message: code,
            });
        }
        if let Some(cluster) = cluster_id {
            if inner.failing_clusters.contains(cluster) {
                return Err(SnapshotError::Provider {
                    operation: "DescribeDBClusterSnapshots",
                    transient: false,
                    message: format!("DBClusterNotFoundFault: {}", cluster),
                });
            }
        }

        let in_scope = |s: &Snapshot| cluster_id.map_or(true, |c| s.cluster_id == c);

        if kind == SnapshotKind::Shared {
            return Ok(inner.shared.iter().filter(|s| in_scope(s)).cloned().collect());
        }

        let mut out = Vec::new();
        for entry in inner.local.iter_mut() {
            if entry.snapshot.kind != kind || !in_scope(&entry.snapshot) {
                continue;
            }
            if let Some(remaining) = entry.remove_after.as_mut() {
                if *remaining == 0 {
                    continue;
                }
                *remaining -= 1;
            }
            if entry.hidden > 0 {
                entry.hidden -= 1;
                continue;
            }
            if entry.pending > 0 {
                entry.pending -= 1;
            } else if entry.snapshot.status == SnapshotStatus::Creating {
                entry.snapshot.status = SnapshotStatus::Available;
                entry.snapshot.created_at = Some(Utc::now());
            }
            out.push(entry.snapshot.clone());
        }
        inner.local.retain(|e| e.remove_after != Some(0));
        Ok(out)
    }

    async fn copy_snapshot(&self, source: &str, target: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let source_snapshot = inner
            .local
            .iter()
            .map(|e| &e.snapshot)
            .chain(inner.shared.iter())
            .find(|s| s.identifier == source)
            .cloned()
            .ok_or_else(|| SnapshotError::not_found("source snapshot", source))?;

        if inner.local.iter().any(|e| e.snapshot.identifier == target) {
            return Err(SnapshotError::AlreadyExists(target.to_string()));
        }

        inner.calls.push(Call::Copy {
            source: source.to_string(),
            target: target.to_string(),
        });
        let pending = inner.copy_pending;
        inner.local.push(Entry {
            snapshot: Snapshot {
                identifier: target.to_string(),
                cluster_id: source_snapshot.cluster_id,
                kind: SnapshotKind::Manual,
                status: SnapshotStatus::Creating,
                created_at: None,
                shared_with: vec![],
            },
            hidden: 1,
            pending,
            remove_after: None,
        });
        Ok(())
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let linger = inner.delete_linger;
        let position = inner
            .local
            .iter()
            .position(|e| e.snapshot.identifier == identifier)
            .ok_or_else(|| SnapshotError::not_found("snapshot", identifier))?;

        let entry = &mut inner.local[position];
        if entry.remove_after.is_some() {
            return Err(SnapshotError::Provider {
                operation: "DeleteDBClusterSnapshot",
                transient: false,
                message: format!("InvalidDBClusterSnapshotStateFault: {}", identifier),
            });
        }
        if linger > 0 {
            entry.snapshot.status = SnapshotStatus::Other("deleting".to_string());
            entry.remove_after = Some(linger);
        } else {
            inner.local.remove(position);
        }
        inner.calls.push(Call::Delete(identifier.to_string()));
        Ok(())
    }

    async fn share_snapshot(&self, identifier: &str, account: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .local
            .iter_mut()
            .find(|e| e.snapshot.identifier == identifier)
            .ok_or_else(|| SnapshotError::not_found("snapshot", identifier))?;
        entry.snapshot.shared_with.push(account.to_string());
        inner.calls.push(Call::Share {
            identifier: identifier.to_string(),
            account: account.to_string(),
        });
        Ok(())
    }
}

/// Notifier that keeps every published message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, message: &NotificationMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
