use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapsafe::config::Config;
use snapsafe::consumer::Consumer;
use snapsafe::directory::SnapshotDirectory;
use snapsafe::event::Envelope;
use snapsafe::handler::{self, InvocationContext};
use snapsafe::notify::{Notifier, SnsNotifier};
use snapsafe::provider::SnapshotProvider;
use snapsafe::rds::{self, RdsProvider};
use snapsafe::retention;
use snapsafe::snapshot::SnapshotKind;
use snapsafe::waiter::CopyWaiter;

#[derive(Parser)]
#[command(name = "snapsafe")]
#[command(about = "Cross-account RDS cluster snapshot replication")]
struct Cli {
    /// Config file (default: ./snapsafe.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AWS region (overrides config)
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// RDS/SNS endpoint URL (for LocalStack etc.)
    #[arg(long, global = true, env = "AWS_ENDPOINT_URL_RDS")]
    endpoint: Option<String>,

    /// Request id for log correlation (default: random)
    #[arg(long, global = true)]
    request_id: Option<String>,

    /// Give up waiting for a copy after this many seconds (default: wait forever)
    #[arg(long, global = true)]
    time_limit: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy, share and announce the newest automated snapshot (live account)
    Publish {
        /// Cluster identifiers (overrides publisher.databases)
        #[arg(short, long)]
        database: Vec<String>,
    },

    /// Save a local copy of an announced snapshot and prune old copies (failsafe account)
    Consume {
        /// SNS event envelope JSON file, or "-" for stdin
        #[arg(short, long)]
        event: String,
    },

    /// List snapshots of a cluster, oldest first
    List {
        /// Cluster identifier (omit with --kind shared to list everything shared)
        #[arg(long)]
        cluster: Option<String>,

        /// automated, manual or shared
        #[arg(long, default_value = "manual")]
        kind: String,
    },

    /// Show which local manual snapshots are past retention
    Prune {
        /// Cluster identifier
        #[arg(long)]
        instance: String,

        /// Actually delete (default is dry-run)
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "snapsafe=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?.unwrap_or_default();
    if let Some(region) = cli.region {
        config.provider.region = region;
    }
    if let Some(endpoint) = cli.endpoint {
        config.provider.endpoint = Some(endpoint);
    }
    config.validate()?;

    let ctx = InvocationContext::new(
        cli.request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    )
    .with_time_limit(cli.time_limit.map(Duration::from_secs));

    let sdk_config =
        rds::load_config(&config.provider.region, config.provider.endpoint.as_deref()).await;
    let provider: Arc<dyn SnapshotProvider> = Arc::new(RdsProvider::from_config(&sdk_config));

    match cli.command {
        Commands::Publish { database } => {
            let databases = if database.is_empty() {
                config.publisher.databases.clone()
            } else {
                database
            };
            if databases.is_empty() {
                return Err(anyhow!(
                    "No databases to publish: set publisher.databases or pass --database"
                ));
            }

            let notifier: Option<Arc<dyn Notifier>> = config.publisher.topic_arn().map(|arn| {
                let client = aws_sdk_sns::Client::new(&sdk_config);
                Arc::new(SnsNotifier::new(client, arn)) as Arc<dyn Notifier>
            });

            let report = handler::publish(&config, &databases, provider, notifier, &ctx).await?;
            if !report.is_success() {
                return Err(anyhow!(
                    "{} of {} databases failed",
                    report.failures(),
                    report.results.len()
                ));
            }
        }
        Commands::Consume { event } => {
            let data = read_event(&event)?;
            let envelope = Envelope::from_json(&data)?;
            handler::consume(&config, &envelope, provider, &ctx).await?;
        }
        Commands::List { cluster, kind } => {
            let kind = SnapshotKind::parse(&kind)
                .ok_or_else(|| anyhow!("Unknown snapshot kind '{}'", kind))?;
            list(provider, cluster.as_deref(), kind).await?;
        }
        Commands::Prune { instance, force } => {
            prune(&config, provider, &instance, force).await?;
        }
    }

    Ok(())
}

fn read_event(source: &str) -> Result<String> {
    if source == "-" {
        let mut data = String::new();
        std::io::stdin().read_to_string(&mut data)?;
        Ok(data)
    } else {
        std::fs::read_to_string(source).map_err(|e| anyhow!("Failed to read {}: {}", source, e))
    }
}

async fn list(
    provider: Arc<dyn SnapshotProvider>,
    cluster: Option<&str>,
    kind: SnapshotKind,
) -> Result<()> {
    let directory = SnapshotDirectory::new(provider);
    let include_shared = kind == SnapshotKind::Shared;
    let snapshots = directory.list(cluster, kind, include_shared).await?;
    let scope = cluster.unwrap_or("all clusters");

    if snapshots.is_empty() {
        println!("No {} snapshots found for {}", kind, scope);
        return Ok(());
    }

    let now = Utc::now();
    println!("{} snapshots for {}:", kind, scope);
    for snapshot in &snapshots {
        let age = match snapshot.created_at {
            Some(created_at) if snapshot.is_available() => retention::format_age(now, created_at),
            _ => "in progress".to_string(),
        };
        println!("  {} ({}, {})", snapshot.identifier, snapshot.status, age);
    }

    Ok(())
}

async fn prune(
    config: &Config,
    provider: Arc<dyn SnapshotProvider>,
    instance: &str,
    force: bool,
) -> Result<()> {
    let waiter = CopyWaiter::new(SnapshotDirectory::new(provider.clone()));
    let consumer = Consumer::new(provider, waiter, config.consumer.retention_policy());
    let plan = consumer.plan_prune(instance).await?;

    println!(
        "Retention plan for '{}' ({} days):",
        instance, config.consumer.retention_days
    );
    println!("  {}", plan.summary());
    println!();

    if !plan.has_deletions() {
        println!("Nothing to delete - all snapshots are within retention.");
        return Ok(());
    }

    println!("Deleting {} snapshots:", plan.delete.len());
    for aged in &plan.delete {
        println!("  {} ({} days old)", aged.snapshot.identifier, aged.age_days);
    }
    println!();

    if !force {
        println!("Dry-run mode: no snapshots deleted. Use --force to actually delete.");
        return Ok(());
    }

    let deleted = consumer.apply_prune(&plan).await?;
    println!("Prune complete: deleted {} snapshots", deleted.len());
    Ok(())
}
