//! Live account job: copy the newest automated snapshot, share it, announce it.
//!
//! Each configured cluster holds a single failsafe slot. A pass retires whatever
//! occupies the slot, then fills it from the newest automated snapshot:
//!
//! `CleanupOld -> LocateNewestAuto -> CheckDedup -> Copy -> AwaitAvailable -> Share -> Notify`
//!
//! Two passes for the same cluster must not overlap (one could delete the other's
//! copy between cleanup and copy); the scheduler is expected to run at most one
//! invocation at a time.

use std::sync::Arc;

use crate::directory::SnapshotDirectory;
use crate::error::{Result, SnapshotError};
use crate::notify::{NotificationMessage, Notifier};
use crate::provider::SnapshotProvider;
use crate::retention;
use crate::snapshot::{derive_target_name, is_already_copied};
use crate::waiter::CopyWaiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The target already existed; nothing was copied, shared or announced
    AlreadyCopied { source: String, target: String },
    Published {
        source: String,
        target: String,
        shared_with: Option<String>,
        notified: bool,
    },
}

impl PublishOutcome {
    pub fn target(&self) -> &str {
        match self {
            PublishOutcome::AlreadyCopied { target, .. } => target,
            PublishOutcome::Published { target, .. } => target,
        }
    }
}

/// Per-cluster results of one run, in configuration order
#[derive(Debug)]
pub struct PublishReport {
    pub results: Vec<(String, Result<PublishOutcome>)>,
}

impl PublishReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

pub struct Publisher {
    provider: Arc<dyn SnapshotProvider>,
    directory: SnapshotDirectory,
    waiter: CopyWaiter,
    share_with: Option<String>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Publisher {
    pub fn new(provider: Arc<dyn SnapshotProvider>, waiter: CopyWaiter) -> Self {
        Self {
            directory: SnapshotDirectory::new(provider.clone()),
            provider,
            waiter,
            share_with: None,
            notifier: None,
        }
    }

    /// Account granted restore access to each new copy
    pub fn with_share_with(mut self, account: Option<String>) -> Self {
        self.share_with = account;
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn Notifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Publish every database in order. A failure is logged and recorded, and the
    /// next database is still attempted.
    pub async fn run(&self, databases: &[String]) -> Result<PublishReport> {
        if databases.is_empty() {
            return Err(SnapshotError::Configuration(
                "no databases configured for publishing".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(databases.len());
        for cluster_id in databases {
            let result = self.publish(cluster_id).await;
            if let Err(e) = &result {
                tracing::error!("Failed to publish failsafe copy of {}: {}", cluster_id, e);
            }
            results.push((cluster_id.clone(), result));
        }

        Ok(PublishReport { results })
    }

    /// One pass for one cluster
    pub async fn publish(&self, cluster_id: &str) -> Result<PublishOutcome> {
        let retired = self.cleanup_old(cluster_id).await?;
        tracing::debug!("Retired {} previous copies of {}", retired.len(), cluster_id);

        tracing::info!(
            "Creating manual copy of the most recent auto snapshot of {}",
            cluster_id
        );
        let newest = self
            .directory
            .newest_automated(cluster_id)
            .await?
            .ok_or_else(|| SnapshotError::not_found("automated snapshot", cluster_id))?;
        let source = newest.identifier;
        let target = derive_target_name(&source);
        tracing::info!("Newest automated snapshot {} -> {}", source, target);

        // Deletes finish asynchronously; a copy retired above may still be listed
        let retiring = retired.contains(&target);
        if retiring {
            self.waiter.await_gone(cluster_id, &target).await?;
        } else {
            let manuals = self.directory.manuals(cluster_id).await?;
            if is_already_copied(&target, &manuals) {
                tracing::info!("Manual snapshot already exists for auto snapshot {}", source);
                return Ok(PublishOutcome::AlreadyCopied { source, target });
            }
        }

        match self.provider.copy_snapshot(&source, &target).await {
            Ok(()) => {}
            Err(SnapshotError::AlreadyExists(_)) if !retiring => {
                tracing::info!("Copy of {} already requested as {}", source, target);
                return Ok(PublishOutcome::AlreadyCopied { source, target });
            }
            Err(e) => return Err(e),
        }

        self.waiter.await_available(cluster_id, &target).await?;
        tracing::info!("Snapshot {} copied to {}", source, target);

        if let Some(account) = &self.share_with {
            tracing::info!("Sharing {} with {}", target, account);
            self.provider.share_snapshot(&target, account).await?;
        }

        let notified = match &self.notifier {
            Some(notifier) => {
                tracing::info!("Announcing {} for {}", target, cluster_id);
                notifier
                    .publish(&NotificationMessage::new(cluster_id, target.as_str()))
                    .await?;
                true
            }
            None => false,
        };

        Ok(PublishOutcome::Published {
            source,
            target,
            shared_with: self.share_with.clone(),
            notified,
        })
    }

    /// Retire every previous failsafe copy of the cluster
    async fn cleanup_old(&self, cluster_id: &str) -> Result<Vec<String>> {
        tracing::info!("Deleting old manual snapshots for {}", cluster_id);
        let manuals = self.directory.manuals(cluster_id).await?;
        let plan = retention::cleanup_plan(&manuals);

        for snapshot in &plan.ignored {
            tracing::info!("Ignoring {}", snapshot.identifier);
        }

        let mut deleted = Vec::with_capacity(plan.delete.len());
        for snapshot in plan.delete {
            tracing::info!("Deleting {}", snapshot.identifier);
            self.provider.delete_snapshot(&snapshot.identifier).await?;
            deleted.push(snapshot.identifier);
        }
        Ok(deleted)
    }
}
