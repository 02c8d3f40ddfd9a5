use async_trait::async_trait;
use aws_sdk_athena::{
    error::DisplayErrorContext,
    types::{QueryExecutionContext, ResultConfiguration},
    Client,
};
use tracing::info;

use super::{repair_statement, CatalogError, CatalogRefresher};

/// Athena-backed [`CatalogRefresher`] issuing `MSCK REPAIR TABLE`.
#[derive(Clone, Debug)]
pub struct AthenaRefresher {
    inner: Client,
}

impl AthenaRefresher {
    pub fn new(inner: Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CatalogRefresher for AthenaRefresher {
    #[tracing::instrument(skip(self))]
    async fn refresh(
        &self,
        database: &str,
        table: &str,
        result_location: &str,
    ) -> Result<String, CatalogError> {
        let resp = self
            .inner
            .start_query_execution()
            .query_string(repair_statement(table))
            .query_execution_context(QueryExecutionContext::builder().database(database).build())
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(result_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        let query_id = resp
            .query_execution_id()
            .ok_or_else(|| {
                CatalogError::Unavailable("start_query_execution returned no query id".to_string())
            })?
            .to_string();

        info!(query_id = %query_id, "Athena table refresh initiated");
        Ok(query_id)
    }
}
