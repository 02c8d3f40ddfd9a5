use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_lambda_events::event::s3::S3Event;
use csvrefresh::{
    catalog::AthenaRefresher,
    config::Config,
    dispatch::{Dispatcher, NotificationRecord},
    process::timestamp::SystemClock,
    storage::S3Store,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

type LambdaDispatcher = Dispatcher<S3Store, AthenaRefresher>;

/// Handles one S3 notification batch.
///
/// Under fail-fast a failed record fails the whole invocation; otherwise the
/// batch always reports 200 with its counters.
#[tracing::instrument(skip_all, fields(request_id = %event.context.request_id))]
async fn handler(dispatcher: &LambdaDispatcher, event: LambdaEvent<S3Event>) -> Result<Value, Error> {
    let records = NotificationRecord::from_s3_event(&event.payload);
    info!(record_count = records.len(), "processing s3 records");

    let report = dispatcher.dispatch(&records).await;
    report
        .to_response(dispatcher.config().failure_policy)
        .map_err(|err| {
            error!(key = %err.key, error = %err.message, "invocation failed");
            Error::from(err)
        })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env)
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .flatten_event(true)
        .init();

    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));

    // ─── 2) configuration, read once per process ─────────────────────
    let config = Config::from_env().context("reading configuration")?;
    info!(
        processed_bucket = %config.processed_bucket,
        database = %config.athena_database,
        table = %config.athena_table,
        policy = ?config.failure_policy,
        "startup"
    );

    // ─── 3) clients, shared across invocations ───────────────────────
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let dispatcher = Arc::new(Dispatcher::new(
        S3Store::new(aws_sdk_s3::Client::new(&aws_config)),
        AthenaRefresher::new(aws_sdk_athena::Client::new(&aws_config)),
        Arc::new(SystemClock),
        config,
    ));

    // ─── 4) serve events ─────────────────────────────────────────────
    run(service_fn(move |event: LambdaEvent<S3Event>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { handler(&dispatcher, event).await }
    }))
    .await
}
