//! Deterministic output locations for every pipeline stage.
//!
//! Each stage writes under `{datasets_root}/{genome}/{dataset_type}/{stage}/` into a
//! name derived from the stage's input paths, so identical parameters always map to
//! the same folder and different inputs never share one.

use sha2::{Digest, Sha256};

use crate::model::{DatasetType, GenomeVersion};
use crate::storage::join_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    pub datasets_root: String,
    pub reference_root: String,
}

/// Stable digest of a list of path components.
pub fn path_digest<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

impl PathLayout {
    pub fn new(datasets_root: impl Into<String>, reference_root: impl Into<String>) -> Self {
        Self {
            datasets_root: datasets_root.into(),
            reference_root: reference_root.into(),
        }
    }

    fn stage_dir(&self, genome: GenomeVersion, dataset_type: DatasetType, stage: &str) -> String {
        [genome.as_str(), dataset_type.as_str(), stage]
            .iter()
            .fold(self.datasets_root.clone(), |path, part| join_path(&path, part))
    }

    pub fn imported_callset_path(
        &self,
        genome: GenomeVersion,
        dataset_type: DatasetType,
        callset_paths: &[String],
    ) -> String {
        join_path(
            &self.stage_dir(genome, dataset_type, "imported_callsets"),
            &format!("{}.mt", path_digest(callset_paths)),
        )
    }

    pub fn reconciled_callset_path(
        &self,
        genome: GenomeVersion,
        dataset_type: DatasetType,
        callset_paths: &[String],
        remap_path: Option<&str>,
        subset_path: Option<&str>,
    ) -> String {
        let mut parts: Vec<&str> = callset_paths.iter().map(String::as_str).collect();
        parts.push(remap_path.unwrap_or(""));
        parts.push(subset_path.unwrap_or(""));
        join_path(
            &self.stage_dir(genome, dataset_type, "remapped_and_subsetted_callsets"),
            &format!("{}.mt", path_digest(&parts)),
        )
    }

    /// `upstream` is the output path of the table being annotated.
    pub fn annotations_path(
        &self,
        genome: GenomeVersion,
        dataset_type: DatasetType,
        upstream: &str,
        reference_datasets: &[String],
    ) -> String {
        let mut parts = vec![upstream];
        parts.extend(reference_datasets.iter().map(String::as_str));
        join_path(
            &self.stage_dir(genome, dataset_type, "annotations"),
            &format!("{}.ht", path_digest(&parts)),
        )
    }

    /// Marker folder recording a finished export of the table at `annotations`
    /// into `index_name`.
    pub fn export_marker_path(
        &self,
        genome: GenomeVersion,
        dataset_type: DatasetType,
        index_name: &str,
        annotations: &str,
    ) -> String {
        join_path(
            &join_path(&self.stage_dir(genome, dataset_type, "exports"), index_name),
            &path_digest(&[annotations]),
        )
    }

    fn validation_dir(&self, genome: GenomeVersion) -> String {
        join_path(&join_path(&self.reference_root, genome.as_str()), "validation")
    }

    pub fn common_coding_variants_path(&self, genome: GenomeVersion) -> String {
        join_path(&self.validation_dir(genome), "common_coding_variants.ht")
    }

    pub fn common_noncoding_variants_path(&self, genome: GenomeVersion) -> String {
        join_path(&self.validation_dir(genome), "common_noncoding_variants.ht")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PathLayout {
        PathLayout::new("gs://seqr-datasets/", "/refs")
    }

    #[test]
    fn imported_path_depends_only_on_inputs() {
        let a = vec!["gs://bucket/a.vcf".to_string()];
        let b = vec!["gs://bucket/b.vcf".to_string()];
        let path = layout().imported_callset_path(GenomeVersion::GRCh38, DatasetType::SnvIndel, &a);
        assert!(path.starts_with("gs://seqr-datasets/GRCh38/SNV_INDEL/imported_callsets/"));
        assert!(path.ends_with(".mt"));
        assert_eq!(
            path,
            layout().imported_callset_path(GenomeVersion::GRCh38, DatasetType::SnvIndel, &a)
        );
        assert_ne!(
            path,
            layout().imported_callset_path(GenomeVersion::GRCh38, DatasetType::SnvIndel, &b)
        );
        assert_ne!(
            path,
            layout().imported_callset_path(GenomeVersion::GRCh38, DatasetType::Mito, &a)
        );
    }

    #[test]
    fn digest_separates_components() {
        assert_ne!(path_digest(&["ab", "c"]), path_digest(&["a", "bc"]));
    }

    #[test]
    fn reference_paths() {
        assert_eq!(
            layout().common_coding_variants_path(GenomeVersion::GRCh37),
            "/refs/GRCh37/validation/common_coding_variants.ht"
        );
        let first = layout().export_marker_path(
            GenomeVersion::GRCh37,
            DatasetType::Sv,
            "sv_index",
            "/data/a.ht",
        );
        assert!(first.starts_with("gs://seqr-datasets/GRCh37/SV/exports/sv_index/"));
        assert_ne!(
            first,
            layout().export_marker_path(GenomeVersion::GRCh37, DatasetType::Sv, "sv_index", "/data/b.ht")
        );
    }
}
