//! Callset validation.
//!
//! Two checks run before annotation for dataset types that support validation:
//! - `contigs`: per-contig row counts against the build's standard contig set
//! - `sample_type`: overlap with curated common coding / non-coding variants, which
//!   catches both wrong genome builds and wrong WGS/WES declarations

pub mod contigs;
pub mod sample_type;

pub use contigs::{check_contigs, ContigCheckReport};
pub use sample_type::{classify, MatchStats, SampleTypeStats};

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::info;

use crate::engine::{DataFrameEngine, EngineError, TableHandle};
use crate::model::{GenomeVersion, SampleType};

/// Thresholds for both checks. Passed explicitly into every validation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Minimum rows a non-optional standard contig must carry
    pub variant_threshold: u64,
    /// Minimum matched/total ratio for a reference set to count as present
    pub match_threshold: f64,
    /// Contigs never reported as missing or underrepresented
    pub optional_contigs: BTreeSet<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            variant_threshold: 100,
            match_threshold: 0.3,
            optional_contigs: ["MT", "chrM", "Y", "chrY"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0}")]
    Contigs(ContigCheckReport),

    #[error(
        "Genome version validation error: dataset specified as {genome} but doesn't contain \
         the expected number of common {genome} variants"
    )]
    GenomeVersionMismatch { genome: GenomeVersion },

    #[error(
        "Sample type validation error: Dataset contains noncoding variants but is missing common \
         coding variants for {genome}. Please verify that the dataset contains coding variants."
    )]
    MissingCodingVariants { genome: GenomeVersion },

    #[error(
        "Sample type validation error: dataset sample-type is specified as {declared} but appears \
         to be {inferred} because it contains many common {evidence} variants"
    )]
    SampleTypeMismatch {
        declared: SampleType,
        inferred: SampleType,
        evidence: &'static str,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Curated reference tables for the sample-type check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReferences {
    pub coding_path: String,
    pub noncoding_path: String,
}

/// Run the contig check, then the sample-type check.
pub async fn validate_callset(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    genome: GenomeVersion,
    declared: SampleType,
    references: &ValidationReferences,
    config: &ValidationConfig,
) -> Result<(), ValidationError> {
    let report = contigs::check_table_contigs(engine, table, genome, config).await?;
    if !report.is_empty() {
        return Err(ValidationError::Contigs(report));
    }

    let stats =
        sample_type::sample_type_stats(engine, table, references, config.match_threshold).await?;
    info!("Sample type check for {}: {}", genome, stats);
    classify(&stats, genome, declared)
}
