//! SNS delivery envelope handed to the consumer.

use serde::Deserialize;

use crate::error::{Result, SnapshotError};
use crate::notify::NotificationMessage;

pub const SNS_EVENT_SOURCE: &str = "aws:sns";

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Records", default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    #[serde(rename = "EventSource", default)]
    pub event_source: String,
    #[serde(rename = "Sns")]
    pub sns: Option<SnsRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnsRecord {
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "TopicArn")]
    pub topic_arn: Option<String>,
}

/// Message body as published; both fields are checked after parsing
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "Instance")]
    instance: Option<String>,
    #[serde(rename = "FailsafeSnapshotID")]
    failsafe_snapshot_id: Option<String>,
}

impl Envelope {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| SnapshotError::Configuration(format!("invalid event envelope: {}", e)))
    }

    /// SNS records carrying a non-empty message
    pub fn sns_messages(&self) -> impl Iterator<Item = &str> {
        self.messages_from(None)
    }

    /// SNS messages, limited to those published on `topic_arn` when given
    pub fn messages_from<'a>(
        &'a self,
        topic_arn: Option<&'a str>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.records
            .iter()
            .filter(|r| r.event_source == SNS_EVENT_SOURCE)
            .filter_map(|r| r.sns.as_ref())
            .filter(move |sns| match topic_arn {
                Some(topic) if sns.topic_arn.as_deref() != Some(topic) => {
                    tracing::debug!("Skipping record from topic {:?}", sns.topic_arn);
                    false
                }
                _ => true,
            })
            .map(|sns| sns.message.as_str())
            .filter(|m| !m.is_empty())
    }

    /// Extract the notification to process from any topic
    pub fn notification(&self) -> Result<NotificationMessage> {
        self.notification_from(None)
    }

    /// Extract the notification to process.
    ///
    /// Records are not aggregated: when several SNS records arrive together only
    /// the last one is used. Records from topics other than `topic_arn` are ignored.
    pub fn notification_from(&self, topic_arn: Option<&str>) -> Result<NotificationMessage> {
        let mut last = None;
        let mut count = 0;

        for body in self.messages_from(topic_arn) {
            count += 1;
            let message = parse_message(body)?;
            tracing::info!("Instance: {}", message.instance);
            tracing::info!("FailsafeSnapshotID: {}", message.failsafe_snapshot_id);
            last = Some(message);
        }

        if count > 1 {
            tracing::warn!(
                "Envelope carried {} notifications; only the last is processed",
                count
            );
        }

        last.ok_or_else(|| {
            SnapshotError::Configuration("Instance and FailsafeSnapshotID not provided".to_string())
        })
    }
}

/// Parse and validate one published message body
pub fn parse_message(body: &str) -> Result<NotificationMessage> {
    let raw: RawMessage = serde_json::from_str(body)
        .map_err(|e| SnapshotError::Configuration(format!("invalid notification: {}", e)))?;

    match (raw.instance, raw.failsafe_snapshot_id) {
        (Some(instance), Some(id)) if !instance.is_empty() && !id.is_empty() => {
            Ok(NotificationMessage::new(instance, id))
        }
        _ => Err(SnapshotError::Configuration(
            "Instance and FailsafeSnapshotID not provided".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sns_record(message: &str) -> serde_json::Value {
        json!({
            "EventSource": "aws:sns",
            "Sns": {
                "TopicArn": "arn:aws:sns:eu-west-1:222222222222:failsafe",
                "Message": message,
            }
        })
    }

    fn envelope(records: Vec<serde_json::Value>) -> Envelope {
        Envelope::from_json(&json!({ "Records": records }).to_string()).unwrap()
    }

    #[test]
    fn test_single_record() {
        let env = envelope(vec![sns_record(
            r#"{"Instance": "db1", "FailsafeSnapshotID": "failsafe-001"}"#,
        )]);
        assert_eq!(
            env.notification().unwrap(),
            NotificationMessage::new("db1", "failsafe-001")
        );
    }

    #[test]
    fn test_last_record_wins() {
        let env = envelope(vec![
            sns_record(r#"{"Instance": "db1", "FailsafeSnapshotID": "failsafe-001"}"#),
            sns_record(r#"{"Instance": "db2", "FailsafeSnapshotID": "failsafe-002"}"#),
        ]);
        assert_eq!(
            env.notification().unwrap(),
            NotificationMessage::new("db2", "failsafe-002")
        );
    }

    #[test]
    fn test_ignores_other_sources_and_empty_messages() {
        let env = envelope(vec![
            sns_record(r#"{"Instance": "db1", "FailsafeSnapshotID": "failsafe-001"}"#),
            json!({ "EventSource": "aws:sqs", "Sns": { "Message": "{}" } }),
            sns_record(""),
        ]);
        assert_eq!(env.sns_messages().count(), 1);
        assert_eq!(env.notification().unwrap().instance, "db1");
    }

    #[test]
    fn test_topic_filter() {
        let env = envelope(vec![
            sns_record(r#"{"Instance": "db1", "FailsafeSnapshotID": "failsafe-001"}"#),
            json!({
                "EventSource": "aws:sns",
                "Sns": {
                    "TopicArn": "arn:aws:sns:eu-west-1:333333333333:unrelated",
                    "Message": r#"{"Instance": "db9", "FailsafeSnapshotID": "failsafe-009"}"#,
                }
            }),
        ]);

        let topic = "arn:aws:sns:eu-west-1:222222222222:failsafe";
        assert_eq!(
            env.notification_from(Some(topic)).unwrap(),
            NotificationMessage::new("db1", "failsafe-001")
        );
        // unfiltered, the last record wins
        assert_eq!(env.notification().unwrap().instance, "db9");

        let err = env
            .notification_from(Some("arn:aws:sns:eu-west-1:222222222222:other"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Configuration(_)));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let env = envelope(vec![sns_record(r#"{"Instance": "db1"}"#)]);
        assert!(matches!(
            env.notification().unwrap_err(),
            SnapshotError::Configuration(_)
        ));

        let env = envelope(vec![sns_record(
            r#"{"Instance": "", "FailsafeSnapshotID": "failsafe-001"}"#,
        )]);
        assert!(env.notification().is_err());
    }

    #[test]
    fn test_no_sns_records() {
        let env = envelope(vec![]);
        assert!(matches!(
            env.notification().unwrap_err(),
            SnapshotError::Configuration(_)
        ));
        assert!(Envelope::from_json("{}").unwrap().notification().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(Envelope::from_json("not json").is_err());
        let env = envelope(vec![sns_record("not json")]);
        assert!(env.notification().is_err());
    }
}
