use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotKind};

/// The cluster snapshot API of one account.
///
/// Listings are eventually consistent: a copy just requested may be missing from
/// the next listing.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// List snapshots of one kind, optionally restricted to one source cluster.
    ///
    /// `cluster_id = None` with `SnapshotKind::Shared` lists every snapshot shared
    /// with this account. Order is unspecified.
    async fn list_snapshots(
        &self,
        cluster_id: Option<&str>,
        kind: SnapshotKind,
        include_shared: bool,
    ) -> Result<Vec<Snapshot>>;

    /// Start an asynchronous copy. Returns once the request is accepted.
    async fn copy_snapshot(&self, source: &str, target: &str) -> Result<()>;

    async fn delete_snapshot(&self, identifier: &str) -> Result<()>;

    /// Grant `account` permission to restore the snapshot
    async fn share_snapshot(&self, identifier: &str, account: &str) -> Result<()>;
}
