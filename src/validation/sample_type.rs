//! Sample-type and genome-build classifier.

use std::fmt;

use tracing::info;

use super::{ValidationError, ValidationReferences};
use crate::engine::{DataFrameEngine, EngineError, TableHandle};
use crate::model::{GenomeVersion, SampleType};

/// Overlap of a callset with one reference variant set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchStats {
    pub matched: u64,
    pub total: u64,
    pub threshold: f64,
}

impl MatchStats {
    /// An empty reference set never matches.
    pub fn is_match(&self) -> bool {
        self.total > 0 && (self.matched as f64 / self.total as f64) >= self.threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTypeStats {
    pub coding: MatchStats,
    pub noncoding: MatchStats,
}

impl fmt::Display for SampleTypeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} common coding, {} of {} common noncoding",
            self.coding.matched, self.coding.total, self.noncoding.matched, self.noncoding.total
        )
    }
}

/// Decide whether the evidence agrees with the declared sample type.
///
/// Priority: neither set matches, only noncoding, only coding, both.
pub fn classify(
    stats: &SampleTypeStats,
    genome: GenomeVersion,
    declared: SampleType,
) -> Result<(), ValidationError> {
    match (stats.coding.is_match(), stats.noncoding.is_match()) {
        (false, false) => Err(ValidationError::GenomeVersionMismatch { genome }),
        (false, true) => Err(ValidationError::MissingCodingVariants { genome }),
        (true, false) if declared != SampleType::WES => Err(ValidationError::SampleTypeMismatch {
            declared,
            inferred: SampleType::WES,
            evidence: "coding",
        }),
        (true, true) if declared != SampleType::WGS => Err(ValidationError::SampleTypeMismatch {
            declared,
            inferred: SampleType::WGS,
            evidence: "non-coding",
        }),
        _ => Ok(()),
    }
}

pub async fn sample_type_stats(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    references: &ValidationReferences,
    threshold: f64,
) -> Result<SampleTypeStats, EngineError> {
    let (coding, noncoding) = futures::try_join!(
        match_stats(engine, table, &references.coding_path, threshold),
        match_stats(engine, table, &references.noncoding_path, threshold),
    )?;
    for (name, stat) in [("coding", coding), ("noncoding", noncoding)] {
        info!(
            "Table contains {} out of {} common {} variants.",
            stat.matched, stat.total, name
        );
    }
    Ok(SampleTypeStats { coding, noncoding })
}

async fn match_stats(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    reference_path: &str,
    threshold: f64,
) -> Result<MatchStats, EngineError> {
    let reference = engine.read_table(reference_path).await?;
    let (matched, total) = futures::try_join!(
        engine.semi_join_count(table, &reference),
        engine.count_rows(&reference),
    )?;
    Ok(MatchStats {
        matched,
        total,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(coding: f64, noncoding: f64) -> SampleTypeStats {
        let ratio = |r: f64| MatchStats {
            matched: (r * 1000.0) as u64,
            total: 1000,
            threshold: 0.3,
        };
        SampleTypeStats {
            coding: ratio(coding),
            noncoding: ratio(noncoding),
        }
    }

    #[test]
    fn coding_only_evidence_means_exome() {
        let evidence = stats(0.5, 0.1);
        assert!(classify(&evidence, GenomeVersion::GRCh38, SampleType::WES).is_ok());

        let err = classify(&evidence, GenomeVersion::GRCh38, SampleType::WGS).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SampleTypeMismatch {
                declared: SampleType::WGS,
                inferred: SampleType::WES,
                ..
            }
        ));
        assert!(err.to_string().contains("appears to be WES"));
    }

    #[test]
    fn both_sets_mean_genome() {
        let evidence = stats(0.9, 0.8);
        assert!(classify(&evidence, GenomeVersion::GRCh37, SampleType::WGS).is_ok());
        assert!(matches!(
            classify(&evidence, GenomeVersion::GRCh37, SampleType::WES),
            Err(ValidationError::SampleTypeMismatch {
                inferred: SampleType::WGS,
                ..
            })
        ));
    }

    #[test]
    fn no_overlap_is_a_build_mismatch() {
        let err = classify(&stats(0.01, 0.0), GenomeVersion::GRCh38, SampleType::WGS).unwrap_err();
        assert!(matches!(err, ValidationError::GenomeVersionMismatch { .. }));
        assert!(err.to_string().contains("common GRCh38 variants"));
    }

    #[test]
    fn noncoding_only_is_missing_coding() {
        let err = classify(&stats(0.1, 0.6), GenomeVersion::GRCh37, SampleType::WGS).unwrap_err();
        assert!(matches!(err, ValidationError::MissingCodingVariants { .. }));
    }

    #[test]
    fn empty_reference_never_matches() {
        let empty = MatchStats {
            matched: 0,
            total: 0,
            threshold: 0.0,
        };
        assert!(!empty.is_match());
    }
}
