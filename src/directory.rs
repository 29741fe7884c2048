//! Sorted, read-only view over the provider's snapshot listing.
//!
//! Nothing is cached: every query goes back to the provider.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::provider::SnapshotProvider;
use crate::snapshot::{Snapshot, SnapshotKind};

#[derive(Clone)]
pub struct SnapshotDirectory {
    provider: Arc<dyn SnapshotProvider>,
}

impl SnapshotDirectory {
    pub fn new(provider: Arc<dyn SnapshotProvider>) -> Self {
        Self { provider }
    }

    /// List snapshots sorted ascending by effective creation time
    pub async fn list(
        &self,
        cluster_id: Option<&str>,
        kind: SnapshotKind,
        include_shared: bool,
    ) -> Result<Vec<Snapshot>> {
        let snapshots = self
            .provider
            .list_snapshots(cluster_id, kind, include_shared)
            .await?;
        tracing::debug!(
            "Listed {} {} snapshots for {}",
            snapshots.len(),
            kind,
            cluster_id.unwrap_or("all clusters")
        );
        Ok(sort_by_effective_time(snapshots, Utc::now()))
    }

    pub async fn manuals(&self, cluster_id: &str) -> Result<Vec<Snapshot>> {
        self.list(Some(cluster_id), SnapshotKind::Manual, false).await
    }

    /// Every snapshot shared with this account, whatever its source cluster
    pub async fn shared(&self) -> Result<Vec<Snapshot>> {
        self.list(None, SnapshotKind::Shared, true).await
    }

    /// The automated snapshot with the greatest effective creation time
    pub async fn newest_automated(&self, cluster_id: &str) -> Result<Option<Snapshot>> {
        let mut autos = self
            .list(Some(cluster_id), SnapshotKind::Automated, false)
            .await?;
        Ok(autos.pop())
    }
}

/// Stable sort; entries that are not yet available all sort as `now`.
pub fn sort_by_effective_time(mut snapshots: Vec<Snapshot>, now: DateTime<Utc>) -> Vec<Snapshot> {
    snapshots.sort_by_key(|s| s.effective_created_at(now));
    snapshots
}
