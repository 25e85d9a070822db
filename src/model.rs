//! Identifying parameters shared by every pipeline stage.
//!
//! All three enums are immutable once a task is constructed and take part in task
//! identity, so they are `Copy + Eq + Hash`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reference coordinate system of a callset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum GenomeVersion {
    #[value(name = "GRCh37")]
    GRCh37,
    #[value(name = "GRCh38")]
    GRCh38,
}

const AUTOSOMES_AND_SEX: [&str; 24] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y",
];

impl GenomeVersion {
    /// Whether contigs are named `chr1` rather than `1`.
    pub fn uses_chr_prefix(&self) -> bool {
        matches!(self, Self::GRCh38)
    }

    /// The 25 contigs a complete callset is expected to cover.
    pub fn standard_contigs(&self) -> BTreeSet<String> {
        let mut contigs: BTreeSet<String> = AUTOSOMES_AND_SEX
            .iter()
            .map(|name| self.contig_name(name))
            .collect();
        contigs.insert(self.mitochondrial_contig().to_string());
        contigs
    }

    /// Name of the mitochondrial contig in this build's convention.
    pub fn mitochondrial_contig(&self) -> &'static str {
        match self {
            Self::GRCh37 => "MT",
            Self::GRCh38 => "chrM",
        }
    }

    /// Bare chromosome names (`1..22`, `X`, `Y`) subject to prefix recoding.
    pub fn recodable_chromosomes() -> &'static [&'static str] {
        &AUTOSOMES_AND_SEX
    }

    /// Render a bare chromosome name (`"7"`, `"X"`) in this build's convention.
    pub fn contig_name(&self, bare: &str) -> String {
        if self.uses_chr_prefix() {
            format!("chr{}", bare)
        } else {
            bare.to_string()
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GRCh37 => "GRCh37",
            Self::GRCh38 => "GRCh38",
        }
    }
}

impl fmt::Display for GenomeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenomeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "GRCh37" | "37" => Ok(Self::GRCh37),
            "GRCh38" | "38" => Ok(Self::GRCh38),
            other => Err(format!("unknown genome version: {}", other)),
        }
    }
}

/// Category of callset. Determines row keys, validation and multi-allelic splitting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetType {
    #[value(name = "SNV_INDEL")]
    SnvIndel,
    #[value(name = "MITO")]
    Mito,
    #[value(name = "SV")]
    Sv,
    #[value(name = "GCNV")]
    Gcnv,
}

impl DatasetType {
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            Self::SnvIndel | Self::Mito => &["locus", "alleles"],
            Self::Sv | Self::Gcnv => &["variant_id"],
        }
    }

    pub fn can_run_validation(&self) -> bool {
        matches!(self, Self::SnvIndel)
    }

    pub fn supports_multiallelic_split(&self) -> bool {
        matches!(self, Self::SnvIndel | Self::Mito)
    }

    /// GCNV callsets arrive as tab-separated call tables rather than VCFs.
    pub fn imports_from_vcf(&self) -> bool {
        !matches!(self, Self::Gcnv)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SnvIndel => "SNV_INDEL",
            Self::Mito => "MITO",
            Self::Sv => "SV",
            Self::Gcnv => "GCNV",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SNV_INDEL" => Ok(Self::SnvIndel),
            "MITO" => Ok(Self::Mito),
            "SV" => Ok(Self::Sv),
            "GCNV" => Ok(Self::Gcnv),
            other => Err(format!("unknown dataset type: {}", other)),
        }
    }
}

/// Sequencing strategy declared by the caller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum SampleType {
    #[value(name = "WGS")]
    WGS,
    #[value(name = "WES")]
    WES,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WGS => "WGS",
            Self::WES => "WES",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "WGS" => Ok(Self::WGS),
            "WES" => Ok(Self::WES),
            other => Err(format!("unknown sample type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_contigs_follow_build_convention() {
        let grch37 = GenomeVersion::GRCh37.standard_contigs();
        assert_eq!(grch37.len(), 25);
        assert!(grch37.contains("1"));
        assert!(grch37.contains("MT"));
        assert!(!grch37.contains("chr1"));

        let grch38 = GenomeVersion::GRCh38.standard_contigs();
        assert_eq!(grch38.len(), 25);
        assert!(grch38.contains("chrX"));
        assert!(grch38.contains("chrM"));
    }

    #[test]
    fn dataset_type_properties() {
        assert_eq!(DatasetType::SnvIndel.key_fields(), &["locus", "alleles"]);
        assert_eq!(DatasetType::Gcnv.key_fields(), &["variant_id"]);
        assert!(DatasetType::SnvIndel.can_run_validation());
        assert!(!DatasetType::Mito.can_run_validation());
        assert!(DatasetType::Mito.supports_multiallelic_split());
        assert!(!DatasetType::Sv.supports_multiallelic_split());
        assert!(!DatasetType::Gcnv.imports_from_vcf());
    }

    #[test]
    fn parses_from_strings() {
        assert_eq!("38".parse::<GenomeVersion>().unwrap(), GenomeVersion::GRCh38);
        assert_eq!("snv_indel".parse::<DatasetType>().unwrap(), DatasetType::SnvIndel);
        assert_eq!("wes".parse::<SampleType>().unwrap(), SampleType::WES);
        assert!("GRCh39".parse::<GenomeVersion>().is_err());
    }
}
