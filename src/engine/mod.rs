//! Interface to the distributed dataframe engine.
//!
//! The engine owns every row-level computation: imports, joins, aggregation, splitting
//! and writes. The pipeline only holds opaque [`TableHandle`]s and issues aggregate
//! queries through them.
//!
//! [`LocalEngine`] is a single-process implementation over JSON folders, used by the
//! test suite and for small local runs.

mod local;
mod table;

pub use local::LocalEngine;
pub use table::{Locus, VariantRow, VariantTable};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::GenomeVersion;
use crate::search::{ExportRequest, IndexCreatedHook, SearchCluster, SearchError};

/// Opaque reference to a table living inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableHandle(Uuid);

impl TableHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TableHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for importing variant call files.
#[derive(Debug, Clone, PartialEq)]
pub struct VcfImportRequest {
    pub paths: Vec<String>,
    pub genome_version: GenomeVersion,
    /// Source contig name -> target contig name
    pub contig_recoding: BTreeMap<String, String>,
    /// Drop rows with invalid loci instead of failing
    pub skip_invalid_loci: bool,
    pub min_partitions: usize,
    /// Treat `.gz` inputs as block-gzipped
    pub force_bgz: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to import {path}: {message}")]
    Import { path: String, message: String },

    #[error("No table found at {0}")]
    TableNotFound(String),

    #[error("Table already exists at {0} and overwrite is disabled")]
    AlreadyExists(String),

    #[error("Unknown table handle {0}")]
    UnknownHandle(TableHandle),

    #[error("Column {column} missing from {path}")]
    MissingColumn { path: String, column: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt table data at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported by this engine: {0}")]
    Unsupported(String),

    #[error("Index export failed: {0}")]
    Export(#[from] SearchError),
}

/// Dataframe engine trait - the operations the pipeline issues.
#[async_trait]
pub trait DataFrameEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn import_vcf(&self, request: &VcfImportRequest) -> Result<TableHandle, EngineError>;

    /// Import tab-separated per-sample call tables (one row per variant and sample).
    async fn import_call_table(&self, paths: &[String]) -> Result<TableHandle, EngineError>;

    async fn read_table(&self, path: &str) -> Result<TableHandle, EngineError>;

    /// Read selected columns of a small tab-separated identifier table.
    async fn read_id_table(
        &self,
        path: &str,
        columns: &[&str],
    ) -> Result<Vec<Vec<String>>, EngineError>;

    /// Left join the `filters` field of `filters` onto `table` by row key.
    async fn annotate_filters(
        &self,
        table: &TableHandle,
        filters: &TableHandle,
    ) -> Result<TableHandle, EngineError>;

    /// One row per alternate allele, keeping the pre-split locus and alleles.
    async fn split_multi(&self, table: &TableHandle) -> Result<TableHandle, EngineError>;

    async fn key_rows_by(
        &self,
        table: &TableHandle,
        fields: &[&str],
    ) -> Result<TableHandle, EngineError>;

    async fn count_rows(&self, table: &TableHandle) -> Result<u64, EngineError>;

    async fn count_cols(&self, table: &TableHandle) -> Result<u64, EngineError>;

    async fn contig_counts(
        &self,
        table: &TableHandle,
    ) -> Result<BTreeMap<String, u64>, EngineError>;

    /// Number of rows of `table` whose key appears in `other`.
    async fn semi_join_count(
        &self,
        table: &TableHandle,
        other: &TableHandle,
    ) -> Result<u64, EngineError>;

    async fn sample_ids(&self, table: &TableHandle) -> Result<Vec<String>, EngineError>;

    /// Rename sample columns; ids without a mapping are kept.
    async fn remap_samples(
        &self,
        table: &TableHandle,
        mapping: &BTreeMap<String, String>,
    ) -> Result<TableHandle, EngineError>;

    async fn subset_samples(
        &self,
        table: &TableHandle,
        sample_ids: &[String],
    ) -> Result<TableHandle, EngineError>;

    /// Drop rows without any non-reference call among the table's samples.
    async fn filter_rows_with_non_ref_calls(
        &self,
        table: &TableHandle,
    ) -> Result<TableHandle, EngineError>;

    /// Join a reference annotation dataset onto `table` by row key.
    async fn annotate_with_reference(
        &self,
        table: &TableHandle,
        reference: &TableHandle,
    ) -> Result<TableHandle, EngineError>;

    async fn annotate_globals(
        &self,
        table: &TableHandle,
        globals: serde_json::Map<String, serde_json::Value>,
    ) -> Result<TableHandle, EngineError>;

    /// Write to a fresh temporary location, then publish at `path` with its
    /// completion marker. Readers never observe a partial table at `path`.
    async fn write(
        &self,
        table: &TableHandle,
        path: &str,
        overwrite: bool,
    ) -> Result<(), EngineError>;

    /// Bulk-export rows as documents. Creates the index, runs `hook` once it exists,
    /// then streams documents.
    async fn export_to_index(
        &self,
        table: &TableHandle,
        request: &ExportRequest,
        cluster: &dyn SearchCluster,
        hook: Option<&dyn IndexCreatedHook>,
    ) -> Result<(), EngineError>;
}
