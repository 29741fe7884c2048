//! Announcement of a failsafe copy from the live account to the failsafe account.

use async_trait::async_trait;
use aws_sdk_sns::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};

/// The only state handed from the publisher to the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "Instance")]
    pub instance: String,
    #[serde(rename = "FailsafeSnapshotID")]
    pub failsafe_snapshot_id: String,
}

impl NotificationMessage {
    pub fn new(instance: impl Into<String>, failsafe_snapshot_id: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            failsafe_snapshot_id: failsafe_snapshot_id.into(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, message: &NotificationMessage) -> Result<()>;
}

/// Publishes to an SNS topic
pub struct SnsNotifier {
    client: Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

/// Wrap a message for `MessageStructure=json`: every protocol receives the same body
pub fn sns_payload(message: &NotificationMessage) -> Result<String> {
    let body = serde_json::to_string(message).map_err(encode_error)?;
    serde_json::to_string(&serde_json::json!({ "default": body })).map_err(encode_error)
}

fn encode_error(e: serde_json::Error) -> SnapshotError {
    SnapshotError::Configuration(format!("cannot encode notification: {}", e))
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, message: &NotificationMessage) -> Result<()> {
        let payload = sns_payload(message)?;

        self.client
            .publish()
            .target_arn(&self.topic_arn)
            .message(payload)
            .message_structure("json")
            .send()
            .await
            .map_err(|e| crate::rds::classify("Publish", &self.topic_arn, e))?;

        tracing::debug!(
            "Published {} for {} to {}",
            message.failsafe_snapshot_id,
            message.instance,
            self.topic_arn
        );
        Ok(())
    }
}
