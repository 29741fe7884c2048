//! Configuration file support for snapsafe.
//!
//! Loads snapsafe.toml from current directory with CLI override support.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retention::{RetentionPolicy, DEFAULT_RETENTION_DAYS};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Live account job settings
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Failsafe account job settings
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Copy completion polling
    #[serde(default)]
    pub waiter: WaiterConfig,
}

/// AWS region and endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL (for LocalStack etc.)
    pub endpoint: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
        }
    }
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Cluster identifiers to copy, processed in order
    #[serde(default)]
    pub databases: Vec<String>,

    /// Failsafe account to grant restore access to (sharing disabled if unset)
    pub share_with: Option<String>,

    /// SNS topic announcing new copies (notification disabled if unset)
    pub topic_arn: Option<String>,
}

impl PublisherConfig {
    /// Share target, treating an empty string as unset
    pub fn share_with(&self) -> Option<&str> {
        self.share_with.as_deref().filter(|s| !s.is_empty())
    }

    /// Notification destination, treating an empty string as unset
    pub fn topic_arn(&self) -> Option<&str> {
        self.topic_arn.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Delete local manual snapshots this many whole days old
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Only accept notifications published on this topic (any topic if unset)
    pub topic_arn: Option<String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            topic_arn: None,
        }
    }
}

impl ConsumerConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_days)
    }

    /// Accepted topic, treating an empty string as unset
    pub fn topic_arn(&self) -> Option<&str> {
        self.topic_arn.as_deref().filter(|s| !s.is_empty())
    }
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaiterConfig {
    /// Seconds between status polls (default: 10)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up after this many polls (default: wait forever)
    pub max_attempts: Option<u32>,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: None,
        }
    }
}

impl WaiterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_poll_interval() -> u64 {
    10
}

impl Config {
    /// Load config from file, or return None if not found.
    ///
    /// If `path` is Some, load from that path.
    /// If `path` is None, check for ./snapsafe.toml in current directory.
    pub fn load(path: Option<&Path>) -> Result<Option<Self>> {
        let config_path = match path {
            Some(p) => {
                // Explicit path provided - must exist
                if !p.exists() {
                    return Err(anyhow!("Config file not found: {}", p.display()));
                }
                p.to_path_buf()
            }
            None => {
                let default_path = PathBuf::from("./snapsafe.toml");
                if !default_path.exists() {
                    return Ok(None);
                }
                default_path
            }
        };

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", config_path.display(), e))?;

        config.validate()?;

        tracing::info!("Loaded config from {}", config_path.display());
        Ok(Some(config))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.region.is_empty() {
            return Err(anyhow!("provider.region cannot be empty"));
        }

        for (i, db) in self.publisher.databases.iter().enumerate() {
            if db.trim().is_empty() {
                return Err(anyhow!("publisher.databases[{}] cannot be empty", i));
            }
        }

        if let Some(account) = self.publisher.share_with() {
            if !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(anyhow!(
                    "publisher.share_with must be an account number, got '{}'",
                    account
                ));
            }
        }

        if self.consumer.retention_days < 1 {
            return Err(anyhow!("consumer.retention_days must be at least 1"));
        }

        if self.waiter.poll_interval_secs == 0 {
            return Err(anyhow!("waiter.poll_interval_secs must be > 0"));
        }
        if self.waiter.max_attempts == Some(0) {
            return Err(anyhow!("waiter.max_attempts must be > 0 when set"));
        }

        Ok(())
    }
}
