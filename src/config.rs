//! Configuration management for the loading pipeline.
//!
//! Configuration can be set via environment variables:
//! - `SEQR_DATASETS_ROOT` - Optional. Root of all stage outputs. Defaults to `./seqr-datasets`.
//! - `SEQR_REFERENCE_ROOT` - Optional. Root of reference tables. Defaults to `./seqr-reference-data`.
//! - `MIN_VCF_PARTITIONS` - Optional. Minimum partitions of a callset import. Defaults to `500`.
//! - `PIPELINE_WORKERS` - Optional. Tasks run concurrently. Defaults to `4`.
//! - `GCS_OAUTH_TOKEN` - Optional. Bearer token enabling `gs://` paths.
//! - `ES_HOST` - Optional. Search cluster host. Defaults to `localhost`.
//! - `ES_PORT` - Optional. Search cluster port. Defaults to `9200`.
//! - `ES_USERNAME` - Optional. Defaults to `pipeline`.
//! - `ES_PASSWORD` - Optional.
//! - `ES_USE_TLS` - Optional. Defaults to `false`.
//! - `VALIDATION_VARIANT_THRESHOLD` - Optional. Minimum rows per contig. Defaults to `100`.
//! - `VALIDATION_MATCH_THRESHOLD` - Optional. Minimum reference overlap ratio. Defaults to `0.3`.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use crate::paths::PathLayout;
use crate::search::SearchConnection;
use crate::storage::{GcsStorage, LocalStorage, StorageBackend, StorageRouter};
use crate::util::env_var_bool;
use crate::validation::ValidationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid index name [{name}], {reason}")]
    InvalidIndexName { name: String, reason: String },
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub datasets_root: String,

    pub reference_root: String,

    /// Passed to every callset import
    pub min_vcf_partitions: usize,

    /// Upper bound on concurrently running tasks
    pub workers: usize,

    /// Enables the GCS backend when set
    pub gcs_oauth_token: Option<String>,

    pub search: SearchConnection,

    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datasets_root: "./seqr-datasets".to_string(),
            reference_root: "./seqr-reference-data".to_string(),
            min_vcf_partitions: 500,
            workers: 4,
            gcs_oauth_token: None,
            search: SearchConnection {
                username: Some("pipeline".to_string()),
                ..SearchConnection::default()
            },
            validation: ValidationConfig::default(),
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let workers: usize = parse_var("PIPELINE_WORKERS", "4")?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue(
                "PIPELINE_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let match_threshold: f64 = parse_var("VALIDATION_MATCH_THRESHOLD", "0.3")?;
        if !(0.0..=1.0).contains(&match_threshold) {
            return Err(ConfigError::InvalidValue(
                "VALIDATION_MATCH_THRESHOLD".to_string(),
                "must be between 0 and 1".to_string(),
            ));
        }

        let search = SearchConnection {
            host: std::env::var("ES_HOST").unwrap_or(defaults.search.host),
            port: parse_var("ES_PORT", "9200")?,
            username: std::env::var("ES_USERNAME").ok().or(defaults.search.username),
            password: std::env::var("ES_PASSWORD").ok(),
            use_tls: env_var_bool("ES_USE_TLS", false),
        };

        let validation = ValidationConfig {
            variant_threshold: parse_var("VALIDATION_VARIANT_THRESHOLD", "100")?,
            match_threshold,
            ..ValidationConfig::default()
        };

        Ok(Self {
            datasets_root: std::env::var("SEQR_DATASETS_ROOT").unwrap_or(defaults.datasets_root),
            reference_root: std::env::var("SEQR_REFERENCE_ROOT")
                .unwrap_or(defaults.reference_root),
            min_vcf_partitions: parse_var("MIN_VCF_PARTITIONS", "500")?,
            workers,
            gcs_oauth_token: std::env::var("GCS_OAUTH_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            search,
            validation,
        })
    }

    /// Create a config rooted at local directories (useful for testing).
    pub fn local(datasets_root: impl Into<String>, reference_root: impl Into<String>) -> Self {
        Self {
            datasets_root: datasets_root.into(),
            reference_root: reference_root.into(),
            ..Self::default()
        }
    }

    pub fn layout(&self) -> PathLayout {
        PathLayout::new(self.datasets_root.clone(), self.reference_root.clone())
    }

    /// Storage router with GCS enabled when a token is configured.
    pub fn storage(&self) -> StorageRouter {
        let gcs = self
            .gcs_oauth_token
            .as_deref()
            .map(|token| Arc::new(GcsStorage::new(token)) as Arc<dyn StorageBackend>);
        StorageRouter::new(Arc::new(LocalStorage::new()), gcs)
    }
}

static INDEX_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._+-]*$").expect("valid index name regex"));

/// Search index names must be lowercase and otherwise legal for the cluster.
pub fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidIndexName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name != name.to_lowercase() {
        return Err(invalid("must be lowercase"));
    }
    if name.is_empty() || name.len() > 255 {
        return Err(invalid("must be between 1 and 255 bytes"));
    }
    if !INDEX_NAME_RE.is_match(name) {
        return Err(invalid(
            "must start with a letter or digit and contain only letters, digits, '.', '_', '+' or '-'",
        ));
    }
    Ok(())
}
