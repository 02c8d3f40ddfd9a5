use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

pub mod athena;

pub use athena::AthenaRefresher;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog service unavailable: {0}")]
    Unavailable(String),
}

/// Starts a metadata repair of a catalog table so new objects become queryable.
#[async_trait]
pub trait CatalogRefresher: Send + Sync {
    /// Kick off the repair and return the service's tracking id without
    /// waiting for it to finish.
    async fn refresh(
        &self,
        database: &str,
        table: &str,
        result_location: &str,
    ) -> Result<String, CatalogError>;
}

/// The statement issued to reconcile a table's partitions with storage.
pub fn repair_statement(table: &str) -> String {
    format!("MSCK REPAIR TABLE {};", table)
}

/// Logs the repair it would have issued and hands back a synthetic id.
#[derive(Debug, Default)]
pub struct DryRunRefresher {
    issued: AtomicU64,
}

impl DryRunRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes requested so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CatalogRefresher for DryRunRefresher {
    async fn refresh(
        &self,
        database: &str,
        table: &str,
        result_location: &str,
    ) -> Result<String, CatalogError> {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let query_id = format!("dry-run-{}", n);
        info!(
            database,
            result_location,
            query = %repair_statement(table),
            query_id = %query_id,
            "dry run: catalog refresh not sent"
        );
        Ok(query_id)
    }
}
