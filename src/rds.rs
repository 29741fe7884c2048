use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rds::types::DbClusterSnapshot;
use aws_sdk_rds::Client;
use chrono::{DateTime, Utc};
use std::future::Future;

use crate::error::{Result, SnapshotError};
use crate::provider::SnapshotProvider;
use crate::snapshot::{Snapshot, SnapshotKind, SnapshotStatus};

/// Error codes worth retrying on a later run
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "Throttled",
    "RequestLimitExceeded",
    "RequestThrottled",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalFailure",
];

const NOT_FOUND_CODE: &str = "DBClusterSnapshotNotFoundFault";
const ALREADY_EXISTS_CODE: &str = "DBClusterSnapshotAlreadyExistsFault";

/// Load shared AWS config for a region, with optional custom endpoint (LocalStack etc.)
pub async fn load_config(region: &str, endpoint: Option<&str>) -> SdkConfig {
    let mut config_loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

    if let Some(endpoint) = endpoint {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    config_loader.load().await
}

pub fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

/// Map an SDK error onto the snapshot error taxonomy.
///
/// `subject` names the snapshot (or topic) the call was about.
pub(crate) fn classify<E, R>(
    operation: &'static str,
    subject: &str,
    err: SdkError<E, R>,
) -> SnapshotError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let transient = match &err {
        SdkError::TimeoutError(_)
        | SdkError::DispatchFailure(_)
        | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(ctx) => match ctx.err().code() {
            Some(NOT_FOUND_CODE) => return SnapshotError::not_found("snapshot", subject),
            Some(ALREADY_EXISTS_CODE) => return SnapshotError::AlreadyExists(subject.to_string()),
            Some(code) => is_transient_code(code),
            None => false,
        },
        _ => false,
    };

    SnapshotError::Provider {
        operation,
        transient,
        message: format!("{}: {}", subject, DisplayErrorContext(&err)),
    }
}

/// RDS cluster snapshot API of one account
pub struct RdsProvider {
    client: Client,
}

impl RdsProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn to_chrono(time: &aws_sdk_rds::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Follow `Marker` pagination until a page comes back without a next marker
async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    let mut marker = None;

    loop {
        let (page, next) = fetch_page(marker.take()).await?;
        tracing::debug!("Fetched page of {} snapshots", page.len());
        items.extend(page);

        match next {
            Some(next) if !next.is_empty() => marker = Some(next),
            _ => break,
        }
    }

    Ok(items)
}

/// Convert a provider record. Listings of shared snapshots carry the qualified ARN
/// in the identifier field.
///
/// `shared_with` stays empty: describe calls do not return sharing attributes, and
/// neither job reads them back.
fn to_snapshot(raw: &DbClusterSnapshot, kind: SnapshotKind) -> Option<Snapshot> {
    let identifier = raw.db_cluster_snapshot_identifier()?.to_string();
    let status = SnapshotStatus::parse(raw.status().unwrap_or("unknown"));
    let created_at = if status.is_available() {
        raw.snapshot_create_time().and_then(to_chrono)
    } else {
        None
    };

    Some(Snapshot {
        identifier,
        cluster_id: raw.db_cluster_identifier().unwrap_or_default().to_string(),
        kind,
        status,
        created_at,
        shared_with: vec![],
    })
}

#[async_trait]
impl SnapshotProvider for RdsProvider {
    async fn list_snapshots(
        &self,
        cluster_id: Option<&str>,
        kind: SnapshotKind,
        include_shared: bool,
    ) -> Result<Vec<Snapshot>> {
        let subject = cluster_id.unwrap_or("all clusters");

        collect_pages(|marker| {
            let request = self
                .client
                .describe_db_cluster_snapshots()
                .set_db_cluster_identifier(cluster_id.map(str::to_string))
                .snapshot_type(kind.as_str())
                .include_shared(include_shared)
                .set_marker(marker);

            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| classify("DescribeDBClusterSnapshots", subject, e))?;

                let page = resp
                    .db_cluster_snapshots()
                    .iter()
                    .filter_map(|raw| {
                        let snapshot = to_snapshot(raw, kind);
                        if snapshot.is_none() {
                            tracing::warn!("Skipping {} snapshot without identifier", kind);
                        }
                        snapshot
                    })
                    .collect();
                Ok((page, resp.marker().map(str::to_string)))
            }
        })
        .await
    }

    async fn copy_snapshot(&self, source: &str, target: &str) -> Result<()> {
        self.client
            .copy_db_cluster_snapshot()
            .source_db_cluster_snapshot_identifier(source)
            .target_db_cluster_snapshot_identifier(target)
            .send()
            .await
            .map_err(|e| classify("CopyDBClusterSnapshot", target, e))?;

        tracing::debug!("Requested copy of {} to {}", source, target);
        Ok(())
    }

    async fn delete_snapshot(&self, identifier: &str) -> Result<()> {
        self.client
            .delete_db_cluster_snapshot()
            .db_cluster_snapshot_identifier(identifier)
            .send()
            .await
            .map_err(|e| classify("DeleteDBClusterSnapshot", identifier, e))?;

        tracing::debug!("Deleted {}", identifier);
        Ok(())
    }

    async fn share_snapshot(&self, identifier: &str, account: &str) -> Result<()> {
        self.client
            .modify_db_cluster_snapshot_attribute()
            .db_cluster_snapshot_identifier(identifier)
            .attribute_name("restore")
            .values_to_add(account)
            .send()
            .await
            .map_err(|e| classify("ModifyDBClusterSnapshotAttribute", identifier, e))?;

        tracing::debug!("Granted restore on {} to {}", identifier, account);
        Ok(())
    }
}
