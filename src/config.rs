use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be provided")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// What to do with the rest of a batch once one record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed record; later records are not attempted.
    #[default]
    FailFast,
    /// Record the failure and keep going.
    ContinueOnError,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_fast" | "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "continue" | "continue_on_error" | "continue-on-error" => {
                Ok(FailurePolicy::ContinueOnError)
            }
            other => Err(format!("expected fail_fast or continue, got {:?}", other)),
        }
    }
}

/// Invocation settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bucket that receives `processed/...` objects.
    pub processed_bucket: String,

    /// Catalog table repaired after each processed file.
    pub athena_table: String,

    /// Database the table lives in.
    pub athena_database: String,

    /// Where the query service writes repair query results.
    pub athena_output_location: String,

    pub failure_policy: FailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let processed_bucket = require("PROCESSED_BUCKET")?;
        let athena_table = require("ATHENA_TABLE")?;
        let athena_database = require("ATHENA_DATABASE")?;

        let athena_output_location = get("ATHENA_OUTPUT_LOCATION")
            .unwrap_or_else(|| format!("s3://{}/athena_results/", processed_bucket));

        let failure_policy = match get("FAILURE_POLICY") {
            None => FailurePolicy::default(),
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                name: "FAILURE_POLICY",
                value,
                reason,
            })?,
        };

        Ok(Config {
            processed_bucket,
            athena_table,
            athena_database,
            athena_output_location,
            failure_policy,
        })
    }
}
