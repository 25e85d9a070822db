//! Contig presence and frequency check.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::warn;

use super::ValidationConfig;
use crate::engine::{DataFrameEngine, EngineError, TableHandle};
use crate::model::GenomeVersion;

/// Offending contigs, by category. Empty when the callset passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContigCheckReport {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub underrepresented: Vec<String>,
    pub threshold: u64,
}

impl ContigCheckReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.underrepresented.is_empty()
    }
}

impl fmt::Display for ContigCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.missing.is_empty() {
            write!(f, "Missing contig(s): {}. ", self.missing.join(", "))?;
        }
        if !self.unexpected.is_empty() {
            write!(f, "Unexpected chromosome(s): {}. ", self.unexpected.join(", "))?;
        }
        if !self.underrepresented.is_empty() {
            write!(
                f,
                "Chromosome(s) whose variants count under threshold {}: {}. ",
                self.threshold,
                self.underrepresented.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Compare observed per-contig row counts with the standard set.
///
/// Contigs outside the standard set are unexpected whatever their count. Optional
/// contigs are never missing or underrepresented.
pub fn check_contigs(
    counts: &BTreeMap<String, u64>,
    standard: &BTreeSet<String>,
    config: &ValidationConfig,
) -> ContigCheckReport {
    let mut report = ContigCheckReport {
        threshold: config.variant_threshold,
        ..ContigCheckReport::default()
    };

    report.missing = standard
        .iter()
        .filter(|contig| !counts.contains_key(*contig))
        .filter(|contig| !config.optional_contigs.contains(*contig))
        .cloned()
        .collect();
    if !report.missing.is_empty() {
        warn!(
            "Missing the following chromosome(s): {}",
            report.missing.join(", ")
        );
    }

    for (contig, &count) in counts {
        if !standard.contains(contig) {
            warn!("Chromosome {} is unexpected.", contig);
            report.unexpected.push(contig.clone());
        } else if !config.optional_contigs.contains(contig) && count < config.variant_threshold {
            warn!(
                "Chromosome {} has {} rows, which is lower than threshold {}.",
                contig, count, config.variant_threshold
            );
            report.underrepresented.push(contig.clone());
        }
    }
    report
}

pub async fn check_table_contigs(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    genome: GenomeVersion,
    config: &ValidationConfig,
) -> Result<ContigCheckReport, EngineError> {
    let counts = engine.contig_counts(table).await?;
    Ok(check_contigs(&counts, &genome.standard_contigs(), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(c, n)| (c.to_string(), *n)).collect()
    }

    #[test]
    fn reports_every_absent_standard_contig() {
        let config = ValidationConfig {
            optional_contigs: ["MT".to_string()].into_iter().collect(),
            ..ValidationConfig::default()
        };
        let standard = GenomeVersion::GRCh37.standard_contigs();
        let report = check_contigs(
            &counts(&[("1", 500), ("2", 500), ("3", 500)]),
            &standard,
            &config,
        );

        assert_eq!(report.missing.len(), 21);
        assert!(!report.missing.contains(&"MT".to_string()));
        for present in ["1", "2", "3"] {
            assert!(!report.missing.contains(&present.to_string()));
        }
        assert!(report.missing.contains(&"Y".to_string()));
        assert!(report.unexpected.is_empty());
        assert!(report.underrepresented.is_empty());
    }

    #[test]
    fn unknown_contig_is_unexpected_regardless_of_count() {
        let config = ValidationConfig::default();
        let standard = GenomeVersion::GRCh38.standard_contigs();
        for rows in [1, 1_000_000] {
            let report = check_contigs(&counts(&[("chr99", rows)]), &standard, &config);
            assert_eq!(report.unexpected, vec!["chr99"]);
        }
    }

    #[test]
    fn sparse_contigs_are_underrepresented_unless_optional() {
        let config = ValidationConfig::default();
        let standard = GenomeVersion::GRCh38.standard_contigs();
        let mut observed: BTreeMap<String, u64> =
            standard.iter().map(|c| (c.clone(), 1000)).collect();
        observed.insert("chr21".to_string(), 12);
        observed.insert("chrY".to_string(), 3);

        let report = check_contigs(&observed, &standard, &config);
        assert_eq!(report.underrepresented, vec!["chr21"]);
        assert!(report.missing.is_empty());
        assert_eq!(
            report.to_string(),
            "Chromosome(s) whose variants count under threshold 100: chr21. "
        );
    }

    #[test]
    fn wrong_naming_convention_misses_everything() {
        let config = ValidationConfig::default();
        let standard = GenomeVersion::GRCh38.standard_contigs();
        let report = check_contigs(&counts(&[("1", 5000), ("X", 900)]), &standard, &config);
        assert_eq!(report.missing.len(), 23);
        assert_eq!(report.unexpected, vec!["1", "X"]);
        let message = report.to_string();
        assert!(message.starts_with("Missing contig(s): chr1, chr10"));
        assert!(message.contains("Unexpected chromosome(s): 1, X. "));
    }
}
