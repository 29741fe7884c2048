//! Failsafe account job: pull an announced copy in locally, then prune old copies.
//!
//! `ParseMessage -> LocateShared -> CheckLocalStale -> Copy -> AwaitAvailable -> PruneOld`
//!
//! An existing local copy with the announced name is treated as stale and replaced,
//! which makes duplicate deliveries of the same message harmless.

use chrono::Utc;
use std::sync::Arc;

use crate::directory::SnapshotDirectory;
use crate::error::{Result, SnapshotError};
use crate::notify::NotificationMessage;
use crate::provider::SnapshotProvider;
use crate::retention::{self, PrunePlan, RetentionPolicy};
use crate::snapshot::matches_shared_identifier;
use crate::waiter::CopyWaiter;

#[derive(Debug, Clone)]
pub struct ConsumeReport {
    pub instance: String,
    pub target: String,
    /// Qualified identifiers copied from, in order; the last one is the local copy
    pub copied_from: Vec<String>,
    /// A local copy with the target name existed before this run
    pub replaced_stale: bool,
    pub prune: PrunePlan,
}

pub struct Consumer {
    provider: Arc<dyn SnapshotProvider>,
    directory: SnapshotDirectory,
    waiter: CopyWaiter,
    policy: RetentionPolicy,
}

impl Consumer {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        waiter: CopyWaiter,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            directory: SnapshotDirectory::new(provider.clone()),
            provider,
            waiter,
            policy,
        }
    }

    pub async fn consume(&self, message: &NotificationMessage) -> Result<ConsumeReport> {
        let instance = message.instance.as_str();
        let target = message.failsafe_snapshot_id.as_str();
        if instance.is_empty() || target.is_empty() {
            return Err(SnapshotError::Configuration(
                "Instance and FailsafeSnapshotID not provided".to_string(),
            ));
        }

        let (copied_from, replaced_stale) = self.copy_shared(instance, target).await?;
        let prune = self.prune_old(instance).await?;

        Ok(ConsumeReport {
            instance: instance.to_string(),
            target: target.to_string(),
            copied_from,
            replaced_stale,
            prune,
        })
    }

    async fn copy_shared(&self, instance: &str, target: &str) -> Result<(Vec<String>, bool)> {
        tracing::info!("Making local copy of {}", target);

        let shared = self.directory.shared().await?;
        if shared.is_empty() {
            return Err(SnapshotError::not_found("shared snapshot", "any"));
        }

        let manuals = self.directory.manuals(instance).await?;
        let replaced_stale = manuals.iter().any(|s| s.identifier == target);
        if replaced_stale {
            tracing::warn!(
                "Local copy of {} already exists - will delete it before copying",
                target
            );
        }

        let matches: Vec<_> = shared
            .iter()
            .inspect(|s| tracing::debug!("Checking {}", s.identifier))
            .filter(|s| matches_shared_identifier(&s.identifier, target))
            .collect();

        if matches.is_empty() {
            return Err(SnapshotError::not_found(
                "shared snapshot",
                format!("...:{}", target),
            ));
        }
        if matches.len() > 1 {
            tracing::warn!(
                "{} shared snapshots match {}; copying each in turn, the last one wins",
                matches.len(),
                target
            );
        }

        let mut stale = replaced_stale;
        let mut copied_from = Vec::with_capacity(matches.len());
        for source in matches {
            if stale {
                tracing::info!("Deleting stale local copy {}", target);
                self.provider.delete_snapshot(target).await?;
            }
            self.provider.copy_snapshot(&source.identifier, target).await?;
            self.waiter.await_available(instance, target).await?;
            tracing::info!("Snapshot {} copied to {}", source.identifier, target);

            copied_from.push(source.identifier.clone());
            stale = true;
        }

        Ok((copied_from, replaced_stale))
    }

    /// Retention decision for an instance's local manual snapshots, without deleting
    pub async fn plan_prune(&self, instance: &str) -> Result<PrunePlan> {
        let manuals = self.directory.manuals(instance).await?;
        Ok(retention::analyze_retention(&manuals, &self.policy, Utc::now()))
    }

    /// Delete everything the plan marks for deletion; returns the deleted names
    pub async fn apply_prune(&self, plan: &PrunePlan) -> Result<Vec<String>> {
        for aged in &plan.keep {
            tracing::info!(
                "Not deleting {} (it is only {} days old)",
                aged.snapshot.identifier,
                aged.age_days
            );
        }

        let mut deleted = Vec::with_capacity(plan.delete.len());
        for aged in &plan.delete {
            tracing::info!("Deleting: {} ({} days old)", aged.snapshot.identifier, aged.age_days);
            self.provider.delete_snapshot(&aged.snapshot.identifier).await?;
            deleted.push(aged.snapshot.identifier.clone());
        }
        Ok(deleted)
    }

    pub async fn prune_old(&self, instance: &str) -> Result<PrunePlan> {
        tracing::info!(
            "Deleting manual snapshots older than {} days",
            self.policy.days
        );
        let plan = self.plan_prune(instance).await?;
        self.apply_prune(&plan).await?;
        Ok(plan)
    }
}
