use anyhow::{Context, Result};
use aws_lambda_events::event::s3::S3Event;
use clap::Parser;
use csvrefresh::{
    catalog::DryRunRefresher,
    config::{Config, FailurePolicy},
    dispatch::{Dispatcher, NotificationRecord, RecordOutcome},
    process::timestamp::SystemClock,
    storage::LocalStore,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Replay a saved S3 notification event against a local directory.
///
/// Each bucket is a sub-directory of `--root`; catalog refreshes are logged, not sent.
#[derive(Parser, Debug)]
struct Args {
    /// JSON file holding an S3 event (`{"Records": [...]}`)
    #[arg(long)]
    event: PathBuf,

    /// Directory standing in for S3
    #[arg(long)]
    root: PathBuf,

    /// Output bucket (sub-directory of root)
    #[arg(long, default_value = "processed")]
    processed_bucket: String,

    #[arg(long, default_value = "replay_table")]
    table: String,

    #[arg(long, default_value = "replay_db")]
    database: String,

    /// Keep going after a failed record
    #[arg(long)]
    continue_on_error: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .init();

    let args = Args::parse();

    let raw = tokio::fs::read(&args.event)
        .await
        .with_context(|| format!("reading event {}", args.event.display()))?;
    let event: S3Event = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing S3 event {}", args.event.display()))?;
    let records = NotificationRecord::from_s3_event(&event);
    info!("{} records in {}", records.len(), args.event.display());

    let config = Config {
        athena_output_location: format!("s3://{}/athena_results/", args.processed_bucket),
        processed_bucket: args.processed_bucket,
        athena_table: args.table,
        athena_database: args.database,
        failure_policy: if args.continue_on_error {
            FailurePolicy::ContinueOnError
        } else {
            FailurePolicy::FailFast
        },
    };

    let dispatcher = Dispatcher::new(
        LocalStore::new(&args.root),
        DryRunRefresher::new(),
        Arc::new(SystemClock),
        config,
    );
    let report = dispatcher.dispatch(&records).await;

    for outcome in &report.outcomes {
        match outcome {
            RecordOutcome::Processed(file) => {
                println!("{}", serde_json::to_string(file)?);
            }
            RecordOutcome::Skipped { key, reason } => warn!("skipped {}: {}", key, reason),
            RecordOutcome::Failed { bucket, key, error } => {
                error!("failed s3://{}/{}: {}", bucket, key, error)
            }
        }
    }

    let summary = report.summary();
    info!(?summary, "replay finished");
    if let Some((key, err)) = report.first_failure() {
        anyhow::bail!("{} failed: {}", key, err);
    }
    Ok(())
}
