//! Job entry points, one per account.
//!
//! Each takes the loaded configuration, its collaborators and an invocation
//! context. Everything runs sequentially inside a span tagged with the request id.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::Config;
use crate::consumer::{ConsumeReport, Consumer};
use crate::directory::SnapshotDirectory;
use crate::error::{Result, SnapshotError};
use crate::event::Envelope;
use crate::notify::Notifier;
use crate::provider::SnapshotProvider;
use crate::publisher::{PublishReport, Publisher};
use crate::waiter::CopyWaiter;

/// Per-invocation details supplied by whatever triggered the job
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub request_id: String,
    /// Wall-clock budget; bounds the copy wait when set
    pub deadline: Option<Instant>,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.deadline = limit.map(|l| Instant::now() + l);
        self
    }
}

fn build_waiter(
    config: &Config,
    provider: Arc<dyn SnapshotProvider>,
    ctx: &InvocationContext,
) -> CopyWaiter {
    CopyWaiter::new(SnapshotDirectory::new(provider))
        .with_poll_interval(config.waiter.poll_interval())
        .with_max_attempts(config.waiter.max_attempts)
        .with_deadline(ctx.deadline)
}

/// Live account job: publish a failsafe copy of every configured database.
///
/// `notifier` is only used when the configuration names a topic.
pub async fn publish(
    config: &Config,
    databases: &[String],
    provider: Arc<dyn SnapshotProvider>,
    notifier: Option<Arc<dyn Notifier>>,
    ctx: &InvocationContext,
) -> Result<PublishReport> {
    let span = tracing::info_span!("publish", request_id = %ctx.request_id);

    async {
        let waiter = build_waiter(config, provider.clone(), ctx);
        let notifier = notifier.filter(|_| config.publisher.topic_arn().is_some());
        let publisher = Publisher::new(provider, waiter)
            .with_share_with(config.publisher.share_with().map(str::to_string))
            .with_notifier(notifier);

        let report = publisher.run(databases).await?;
        tracing::info!(
            "Publish run finished: {} databases, {} failed",
            report.results.len(),
            report.failures()
        );
        Ok::<_, SnapshotError>(report)
    }
    .instrument(span)
    .await
}

/// Failsafe account job: process the notification carried by an SNS envelope
pub async fn consume(
    config: &Config,
    envelope: &Envelope,
    provider: Arc<dyn SnapshotProvider>,
    ctx: &InvocationContext,
) -> Result<ConsumeReport> {
    let span = tracing::info_span!("consume", request_id = %ctx.request_id);

    async {
        let message = envelope.notification_from(config.consumer.topic_arn())?;
        let waiter = build_waiter(config, provider.clone(), ctx);
        let consumer = Consumer::new(provider, waiter, config.consumer.retention_policy());

        let report = consumer.consume(&message).await.inspect_err(|e| {
            tracing::error!("Failed to save failsafe copy {}: {}", message.failsafe_snapshot_id, e)
        })?;
        tracing::info!(
            "Saved {} for {}; pruned {} old snapshots",
            report.target,
            report.instance,
            report.prune.delete.len()
        );
        Ok::<_, SnapshotError>(report)
    }
    .instrument(span)
    .await
}
