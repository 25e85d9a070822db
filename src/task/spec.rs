//! Task variants and their identifying parameters.
//!
//! # Invariants
//! - Two specs that compare equal are the same task and run at most once per invocation
//! - Export parameters always carry a valid index name (checked in `ExportParams::new`)

use std::fmt;

use crate::config::{validate_index_name, ConfigError};
use crate::model::{DatasetType, GenomeVersion, SampleType};

/// Registry tag of a task variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    SourceFile,
    ReferenceTable,
    ImportCallset,
    ReconcileSamples,
    AnnotateVariants,
    ExportToIndex,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceFile => "SourceFile",
            Self::ReferenceTable => "ReferenceTable",
            Self::ImportCallset => "ImportCallset",
            Self::ReconcileSamples => "ReconcileSamples",
            Self::AnnotateVariants => "AnnotateVariants",
            Self::ExportToIndex => "ExportToIndex",
        };
        f.write_str(name)
    }
}

/// Identifies one callset import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallsetParams {
    pub genome_version: GenomeVersion,
    pub dataset_type: DatasetType,
    pub sample_type: SampleType,
    pub callset_paths: Vec<String>,
    pub filters_paths: Vec<String>,
    pub validate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SampleParams {
    pub remap_path: Option<String>,
    pub subset_path: Option<String>,
    pub ignore_missing_samples: bool,
}

impl SampleParams {
    /// Whether any reconciliation step applies.
    pub fn is_active(&self) -> bool {
        self.remap_path.is_some() || self.subset_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileParams {
    pub callset: CallsetParams,
    pub samples: SampleParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotateParams {
    pub callset: CallsetParams,
    pub samples: SampleParams,
    /// Reference annotation tables joined onto the callset
    pub reference_datasets: Vec<String>,
}

impl AnnotateParams {
    /// The task producing the table to annotate.
    pub fn upstream(&self) -> TaskSpec {
        if self.samples.is_active() {
            TaskSpec::ReconcileSamples(ReconcileParams {
                callset: self.callset.clone(),
                samples: self.samples.clone(),
            })
        } else {
            TaskSpec::ImportCallset(self.callset.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportParams {
    pub annotate: AnnotateParams,
    index_name: String,
    pub min_shards: u32,
    pub use_temp_loading_nodes: bool,
    pub disabled_fields: Vec<String>,
}

impl ExportParams {
    /// # Errors
    /// Returns `ConfigError::InvalidIndexName` for names that are not lowercase or
    /// otherwise illegal, before any work is scheduled.
    pub fn new(
        annotate: AnnotateParams,
        index_name: impl Into<String>,
        min_shards: u32,
        use_temp_loading_nodes: bool,
        disabled_fields: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let index_name = index_name.into();
        validate_index_name(&index_name)?;
        Ok(Self {
            annotate,
            index_name,
            min_shards: min_shards.max(1),
            use_temp_loading_nodes,
            disabled_fields,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

/// Closed set of pipeline tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskSpec {
    /// An input file that must already exist
    SourceFile(String),
    /// A reference table folder that must already exist
    ReferenceTable(String),
    ImportCallset(CallsetParams),
    ReconcileSamples(ReconcileParams),
    AnnotateVariants(AnnotateParams),
    ExportToIndex(ExportParams),
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::SourceFile(_) => TaskKind::SourceFile,
            Self::ReferenceTable(_) => TaskKind::ReferenceTable,
            Self::ImportCallset(_) => TaskKind::ImportCallset,
            Self::ReconcileSamples(_) => TaskKind::ReconcileSamples,
            Self::AnnotateVariants(_) => TaskKind::AnnotateVariants,
            Self::ExportToIndex(_) => TaskKind::ExportToIndex,
        }
    }
}

fn paths_label(paths: &[String]) -> String {
    match paths {
        [single] => single.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first, rest.len()),
        [] => "-".to_string(),
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFile(path) | Self::ReferenceTable(path) => {
                write!(f, "{}({})", self.kind(), path)
            }
            Self::ImportCallset(p) => write!(
                f,
                "{}({}, {}, {})",
                self.kind(),
                p.genome_version,
                p.dataset_type,
                paths_label(&p.callset_paths)
            ),
            Self::ReconcileSamples(p) => write!(
                f,
                "{}({}, {}, {})",
                self.kind(),
                p.callset.genome_version,
                p.callset.dataset_type,
                paths_label(&p.callset.callset_paths)
            ),
            Self::AnnotateVariants(p) => write!(
                f,
                "{}({}, {}, {})",
                self.kind(),
                p.callset.genome_version,
                p.callset.dataset_type,
                paths_label(&p.callset.callset_paths)
            ),
            Self::ExportToIndex(p) => write!(f, "{}({})", self.kind(), p.index_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callset() -> CallsetParams {
        CallsetParams {
            genome_version: GenomeVersion::GRCh38,
            dataset_type: DatasetType::SnvIndel,
            sample_type: SampleType::WGS,
            callset_paths: vec!["a.vcf".into(), "b.vcf".into()],
            filters_paths: Vec::new(),
            validate: true,
        }
    }

    fn annotate(samples: SampleParams) -> AnnotateParams {
        AnnotateParams {
            callset: callset(),
            samples,
            reference_datasets: Vec::new(),
        }
    }

    #[test]
    fn export_params_reject_uppercase_index() {
        assert!(ExportParams::new(annotate(SampleParams::default()), "GRCh38", 1, true, vec![])
            .is_err());
        let params =
            ExportParams::new(annotate(SampleParams::default()), "grch38", 0, true, vec![])
                .unwrap();
        assert_eq!(params.min_shards, 1);
    }

    #[test]
    fn reconciliation_only_when_requested() {
        assert_eq!(
            annotate(SampleParams::default()).upstream().kind(),
            TaskKind::ImportCallset
        );
        let samples = SampleParams {
            subset_path: Some("subset.tsv".into()),
            ..SampleParams::default()
        };
        assert_eq!(annotate(samples).upstream().kind(), TaskKind::ReconcileSamples);
    }

    #[test]
    fn display_names_task_and_inputs() {
        let spec = TaskSpec::ImportCallset(callset());
        assert_eq!(spec.to_string(), "ImportCallset(GRCh38, SNV_INDEL, a.vcf (+1 more))");
    }
}
