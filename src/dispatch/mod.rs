// src/dispatch/mod.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument, Level};

pub mod event;
pub mod keys;

pub use event::NotificationRecord;
use keys::{is_csv_key, output_key};

use crate::{
    catalog::{CatalogError, CatalogRefresher},
    config::{Config, FailurePolicy},
    process::{timestamp::Clock, transform_to_vec, TransformError},
    storage::{ObjectStore, StorageError},
};

/// Why a single record could not be processed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A CSV that made it all the way through fetch → transform → store → refresh.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub source_bucket: String,
    pub source_key: String,
    pub output_bucket: String,
    pub output_key: String,
    pub rows: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub query_id: String,
    pub processing_start: DateTime<Utc>,
    pub processing_end: DateTime<Utc>,
}

/// Result of one notification record.
#[derive(Debug)]
pub enum RecordOutcome {
    Processed(ProcessedFile),
    Skipped {
        key: String,
        reason: String,
    },
    Failed {
        bucket: String,
        key: String,
        error: ProcessError,
    },
}

/// Outcomes of one batch, in record order. Under [`FailurePolicy::FailFast`]
/// it ends at the first failure and `not_attempted` counts what was left.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
    pub not_attempted: usize,
}

/// A batch that must fail the whole invocation.
#[derive(Debug, Error)]
#[error("processing {key} failed: {message}")]
pub struct InvocationError {
    pub key: String,
    pub message: String,
}

/// Counters surfaced in the invocation response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut s = BatchSummary {
            not_attempted: self.not_attempted,
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match outcome {
                RecordOutcome::Processed(_) => s.processed += 1,
                RecordOutcome::Skipped { .. } => s.skipped += 1,
                RecordOutcome::Failed { .. } => s.failed += 1,
            }
        }
        s
    }

    pub fn first_failure(&self) -> Option<(&str, &ProcessError)> {
        self.outcomes.iter().find_map(|o| match o {
            RecordOutcome::Failed { key, error, .. } => Some((key.as_str(), error)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.first_failure().is_some()
    }

    /// Invocation result for this batch: `{"statusCode": 200, "summary": ...}`,
    /// or an error when a record failed under [`FailurePolicy::FailFast`].
    pub fn to_response(&self, policy: FailurePolicy) -> Result<Value, InvocationError> {
        if policy == FailurePolicy::FailFast {
            if let Some((key, err)) = self.first_failure() {
                return Err(InvocationError {
                    key: key.to_string(),
                    message: err.to_string(),
                });
            }
        }
        Ok(json!({
            "statusCode": 200,
            "summary": self.summary(),
        }))
    }
}

/// Runs each notification record through fetch → transform → store → refresh.
///
/// Clients are injected so the same dispatcher drives S3/Athena in Lambda
/// and a local directory in the replay tool.
pub struct Dispatcher<S, C> {
    store: S,
    catalog: C,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<S: ObjectStore, C: CatalogRefresher> Dispatcher<S, C> {
    pub fn new(store: S, catalog: C, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store,
            catalog,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process `records` strictly in order, one at a time.
    #[tracing::instrument(skip_all, fields(records = records.len(), policy = ?self.config.failure_policy))]
    pub async fn dispatch(&self, records: &[NotificationRecord]) -> BatchReport {
        let mut report = BatchReport::default();

        for (idx, record) in records.iter().enumerate() {
            let span = tracing::span!(Level::INFO, "process_record", key = %record.key);
            let outcome = self.handle(record).instrument(span).await;
            let failed = matches!(outcome, RecordOutcome::Failed { .. });
            report.outcomes.push(outcome);

            if failed && self.config.failure_policy == FailurePolicy::FailFast {
                report.not_attempted = records.len() - idx - 1;
                if report.not_attempted > 0 {
                    warn!(
                        remaining = report.not_attempted,
                        "aborting batch after failed record"
                    );
                }
                break;
            }
        }

        let summary = report.summary();
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            not_attempted = summary.not_attempted,
            "batch finished"
        );
        report
    }

    /// Filter one record and, for CSVs, run the full pipeline.
    async fn handle(&self, record: &NotificationRecord) -> RecordOutcome {
        if record.bucket.is_empty() || record.key.is_empty() {
            warn!(?record, "Skipping record without bucket or key");
            return RecordOutcome::Skipped {
                key: record.key.clone(),
                reason: "missing bucket or key".to_string(),
            };
        }

        if !is_csv_key(&record.key) {
            info!("Skipping non-CSV file: {}", record.key);
            return RecordOutcome::Skipped {
                key: record.key.clone(),
                reason: "not a .csv object".to_string(),
            };
        }

        info!(
            "Processing file: {} from bucket: {}",
            record.key, record.bucket
        );
        match self.process_csv(record).await {
            Ok(file) => RecordOutcome::Processed(file),
            Err(error) => {
                error!(error = %error, bucket = %record.bucket, "error processing record");
                RecordOutcome::Failed {
                    bucket: record.bucket.clone(),
                    key: record.key.clone(),
                    error,
                }
            }
        }
    }

    async fn process_csv(&self, record: &NotificationRecord) -> Result<ProcessedFile, ProcessError> {
        let processing_start = Utc::now();
        let start = Instant::now();
        let out_key = output_key(&record.key);
        let out_bucket = &self.config.processed_bucket;

        let raw = self.store.fetch(&record.bucket, &record.key).await?;
        let (transformed, stats) = transform_to_vec(&raw, self.clock.as_ref())?;
        drop(raw);
        self.store.store(out_bucket, &out_key, &transformed).await?;
        info!(
            rows = stats.rows,
            elapsed = ?start.elapsed(),
            "Processed file saved to s3://{}/{}",
            out_bucket,
            out_key
        );

        let query_id = self
            .catalog
            .refresh(
                &self.config.athena_database,
                &self.config.athena_table,
                &self.config.athena_output_location,
            )
            .await?;
        debug!(query_id = %query_id, "catalog refresh started");

        Ok(ProcessedFile {
            source_bucket: record.bucket.clone(),
            source_key: record.key.clone(),
            output_bucket: out_bucket.clone(),
            output_key: out_key,
            rows: stats.rows,
            bytes_in: stats.bytes_in,
            bytes_out: stats.bytes_out,
            query_id,
            processing_start,
            processing_end: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::DryRunRefresher,
        process::timestamp::FixedClock,
        storage::LocalStore,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{fmt, EnvFilter};

    fn init_logging() {
        let _ = fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_target(false)
            .with_test_writer()
            .try_init();
    }

    fn config(policy: FailurePolicy) -> Config {
        Config {
            processed_bucket: "out".to_string(),
            athena_table: "sales".to_string(),
            athena_database: "analytics".to_string(),
            athena_output_location: "s3://out/athena_results/".to_string(),
            failure_policy: policy,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2025, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
        ))
    }

    /// Catalog double that remembers what it was asked and can be told to fail.
    #[derive(Default)]
    struct RecordingCatalog {
        calls: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogRefresher for RecordingCatalog {
        async fn refresh(
            &self,
            database: &str,
            table: &str,
            result_location: &str,
        ) -> Result<String, CatalogError> {
            if self.fail {
                return Err(CatalogError::Unavailable("throttled".to_string()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push((
                database.to_string(),
                table.to_string(),
                result_location.to_string(),
            ));
            Ok(format!("q-{}", calls.len()))
        }
    }

    async fn seeded_store(files: &[(&str, &[u8])]) -> (TempDir, LocalStore) {
        let tmp = tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        for (key, body) in files {
            store.store("in", key, body).await.unwrap();
        }
        (tmp, store)
    }

    #[tokio::test]
    async fn test_processes_csv_and_refreshes() {
        init_logging();
        let (_tmp, store) = seeded_store(&[("folder/data.csv", &b"Name,City\nAlice,NYC\n"[..])]).await;
        let catalog = RecordingCatalog::default();
        let dispatcher = Dispatcher::new(store, catalog, clock(), config(FailurePolicy::FailFast));

        let report = dispatcher
            .dispatch(&[NotificationRecord::new("in", "folder/data.csv")])
            .await;

        assert!(!report.has_failures());
        let file = match &report.outcomes[0] {
            RecordOutcome::Processed(f) => f,
            other => panic!("expected processed, got {:?}", other),
        };
        assert_eq!(file.output_bucket, "out");
        assert_eq!(file.output_key, "processed/folder/data_processed.csv");
        assert_eq!(file.rows, 1);
        assert_eq!(file.query_id, "q-1");

        let written = dispatcher
            .store
            .fetch("out", "processed/folder/data_processed.csv")
            .await
            .unwrap();
        assert_eq!(
            written,
            b"name,city,processed_timestamp\nalice,nyc,2025-01-02 03:04:05\n"
        );

        let calls = dispatcher.catalog.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(
                "analytics".to_string(),
                "sales".to_string(),
                "s3://out/athena_results/".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_skips_non_csv_and_accepts_uppercase() {
        let (_tmp, store) = seeded_store(&[("data.CSV", &b"A\nb\n"[..])]).await;
        let dispatcher = Dispatcher::new(
            store,
            DryRunRefresher::new(),
            clock(),
            config(FailurePolicy::FailFast),
        );

        let report = dispatcher
            .dispatch(&[
                NotificationRecord::new("in", "data.txt"),
                NotificationRecord::new("in", "data.CSV"),
                NotificationRecord::new("", ""),
            ])
            .await;

        assert_eq!(
            report.summary(),
            BatchSummary {
                processed: 1,
                skipped: 2,
                failed: 0,
                not_attempted: 0
            }
        );
        assert!(matches!(&report.outcomes[0], RecordOutcome::Skipped { key, .. } if key == "data.txt"));
        match &report.outcomes[1] {
            RecordOutcome::Processed(f) => {
                assert_eq!(f.output_key, "processed/data.CSV_processed.csv")
            }
            other => panic!("expected processed, got {:?}", other),
        }
        // one refresh per processed file only
        assert_eq!(dispatcher.catalog.issued(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_batch() {
        let (_tmp, store) = seeded_store(&[("good.csv", &b"A\nx\n"[..])]).await;
        let dispatcher = Dispatcher::new(
            store,
            DryRunRefresher::new(),
            clock(),
            config(FailurePolicy::FailFast),
        );

        let report = dispatcher
            .dispatch(&[
                NotificationRecord::new("in", "missing.csv"),
                NotificationRecord::new("in", "good.csv"),
                NotificationRecord::new("in", "other.txt"),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.not_attempted, 2);
        let (key, err) = report.first_failure().unwrap();
        assert_eq!(key, "missing.csv");
        assert!(matches!(
            err,
            ProcessError::Storage(StorageError::NotFound { .. })
        ));
        assert!(dispatcher
            .store
            .fetch("out", "processed/good_processed.csv")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_continue_on_error_attempts_everything() {
        let (_tmp, store) = seeded_store(&[
            ("empty.csv", &b""[..]),
            ("bad.csv", &b"a\n\xff\n"[..]),
            ("good.csv", &b"A\nx\n"[..]),
        ])
        .await;
        let dispatcher = Dispatcher::new(
            store,
            DryRunRefresher::new(),
            clock(),
            config(FailurePolicy::ContinueOnError),
        );

        let report = dispatcher
            .dispatch(&[
                NotificationRecord::new("in", "empty.csv"),
                NotificationRecord::new("in", "bad.csv"),
                NotificationRecord::new("in", "good.csv"),
            ])
            .await;

        assert_eq!(
            report.summary(),
            BatchSummary {
                processed: 1,
                skipped: 0,
                failed: 2,
                not_attempted: 0
            }
        );
        assert!(matches!(
            &report.outcomes[0],
            RecordOutcome::Failed {
                error: ProcessError::Transform(TransformError::MalformedInput),
                ..
            }
        ));
        assert!(matches!(
            &report.outcomes[1],
            RecordOutcome::Failed {
                error: ProcessError::Transform(TransformError::Decode { .. }),
                ..
            }
        ));
        assert!(dispatcher
            .store
            .fetch("out", "processed/good_processed.csv")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_catalog_failure_fails_record_after_store() {
        let (_tmp, store) = seeded_store(&[("a.csv", &b"A\nx\n"[..])]).await;
        let catalog = RecordingCatalog {
            fail: true,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(store, catalog, clock(), config(FailurePolicy::FailFast));

        let report = dispatcher
            .dispatch(&[NotificationRecord::new("in", "a.csv")])
            .await;

        assert!(matches!(
            report.first_failure(),
            Some((_, ProcessError::Catalog(CatalogError::Unavailable(_))))
        ));
        // the transformed object was already written before the refresh
        assert!(dispatcher
            .store
            .fetch("out", "processed/a_processed.csv")
            .await
            .is_ok());
    }

    fn failed(key: &str) -> RecordOutcome {
        RecordOutcome::Failed {
            bucket: "in".to_string(),
            key: key.to_string(),
            error: ProcessError::Transform(TransformError::MalformedInput),
        }
    }

    fn skipped(key: &str) -> RecordOutcome {
        RecordOutcome::Skipped {
            key: key.to_string(),
            reason: "not a .csv object".to_string(),
        }
    }

    #[test]
    fn test_response_for_clean_batch() {
        let report = BatchReport {
            outcomes: vec![skipped("a.txt")],
            not_attempted: 0,
        };
        for policy in [FailurePolicy::FailFast, FailurePolicy::ContinueOnError] {
            assert_eq!(
                report.to_response(policy).unwrap(),
                json!({
                    "statusCode": 200,
                    "summary": {"processed": 0, "skipped": 1, "failed": 0, "not_attempted": 0}
                })
            );
        }
    }

    #[test]
    fn test_response_fail_fast_is_error() {
        let report = BatchReport {
            outcomes: vec![skipped("a.txt"), failed("empty.csv")],
            not_attempted: 3,
        };
        let err = report.to_response(FailurePolicy::FailFast).unwrap_err();
        assert_eq!(err.key, "empty.csv");
        assert_eq!(
            err.to_string(),
            "processing empty.csv failed: malformed input: CSV document has no header row"
        );
    }

    #[test]
    fn test_response_continue_reports_failures() {
        let report = BatchReport {
            outcomes: vec![failed("empty.csv"), skipped("a.txt"), failed("other.csv")],
            not_attempted: 0,
        };
        let resp = report.to_response(FailurePolicy::ContinueOnError).unwrap();
        assert_eq!(resp["statusCode"], 200);
        assert_eq!(resp["summary"]["failed"], 2);
        assert_eq!(resp["summary"]["skipped"], 1);
    }
}
