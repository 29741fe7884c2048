//! Blocking wait for an asynchronous copy or delete to finish.
//!
//! The provider has no completion callback, so this polls the manual listing.
//! With no bound configured the wait never gives up; deployments must rely on
//! the invocation environment's own time limit.

use std::time::Duration;
use tokio::time::Instant;

use crate::directory::SnapshotDirectory;
use crate::error::{Result, SnapshotError};
use crate::snapshot::Snapshot;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct CopyWaiter {
    directory: SnapshotDirectory,
    poll_interval: Duration,
    max_attempts: Option<u32>,
    deadline: Option<Instant>,
}

impl CopyWaiter {
    pub fn new(directory: SnapshotDirectory) -> Self {
        Self {
            directory,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Stop polling once this instant has passed
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wait until the manual snapshot `target` of `cluster_id` is available.
    ///
    /// Returns the number of polls it took.
    pub async fn await_available(&self, cluster_id: &str, target: &str) -> Result<u32> {
        tracing::info!("Waiting for copy of {} to complete", target);
        self.poll(cluster_id, target, |listed| match listed {
            Some(s) if s.is_available() => true,
            Some(s) => {
                tracing::debug!("{}: {}...", target, s.status);
                false
            }
            None => {
                tracing::debug!("{} not listed yet", target);
                false
            }
        })
        .await
    }

    /// Wait until a deleted manual snapshot has dropped out of the listing
    pub async fn await_gone(&self, cluster_id: &str, target: &str) -> Result<u32> {
        tracing::info!("Waiting for deletion of {} to complete", target);
        self.poll(cluster_id, target, |listed| match listed {
            Some(s) => {
                tracing::debug!("{}: {}...", target, s.status);
                false
            }
            None => true,
        })
        .await
    }

    async fn poll<F>(&self, cluster_id: &str, target: &str, done: F) -> Result<u32>
    where
        F: Fn(Option<&Snapshot>) -> bool,
    {
        let mut attempts = 0u32;

        loop {
            if self.exhausted(attempts) {
                return Err(SnapshotError::WaitExhausted {
                    name: target.to_string(),
                    attempts,
                });
            }

            tokio::time::sleep(self.next_pause()).await;
            attempts += 1;

            let manuals = self.directory.manuals(cluster_id).await?;
            if done(manuals.iter().find(|s| s.identifier == target)) {
                tracing::debug!("{} settled after {} polls", target, attempts);
                return Ok(attempts);
            }
        }
    }

    /// Poll interval, cut short so the last poll lands on the deadline
    fn next_pause(&self) -> Duration {
        match self.deadline {
            Some(deadline) => self
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.poll_interval,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
