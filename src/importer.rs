//! Callset importer.
//!
//! Produces a keyed variant table from raw callset files:
//! 1. contig recoding towards the target build's naming convention
//! 2. engine import with invalid loci skipped
//! 3. optional left join of a separate filters annotation
//! 4. multi-allelic split where the dataset type supports it
//! 5. re-key by the dataset type's key fields

use std::collections::BTreeMap;

use tracing::info;

use crate::engine::{DataFrameEngine, EngineError, TableHandle, VcfImportRequest};
use crate::model::{DatasetType, GenomeVersion};

/// Inputs of one callset import.
#[derive(Debug, Clone)]
pub struct CallsetImport {
    pub callset_paths: Vec<String>,
    pub filters_paths: Vec<String>,
    pub genome_version: GenomeVersion,
    pub dataset_type: DatasetType,
    pub min_partitions: usize,
}

/// Rename table from the other naming convention into `genome`'s.
///
/// GRCh38 callsets with bare names (`1`) are recoded to `chr1`; GRCh37 callsets with
/// prefixed names are recoded to bare ones.
pub fn contig_recoding(genome: GenomeVersion) -> BTreeMap<String, String> {
    GenomeVersion::recodable_chromosomes()
        .iter()
        .map(|bare| {
            let prefixed = format!("chr{}", bare);
            if genome.uses_chr_prefix() {
                (bare.to_string(), prefixed)
            } else {
                (prefixed, bare.to_string())
            }
        })
        .collect()
}

fn vcf_request(paths: &[String], import: &CallsetImport) -> VcfImportRequest {
    VcfImportRequest {
        paths: paths.to_vec(),
        genome_version: import.genome_version,
        contig_recoding: contig_recoding(import.genome_version),
        skip_invalid_loci: true,
        min_partitions: import.min_partitions,
        force_bgz: true,
    }
}

pub async fn import_callset(
    engine: &dyn DataFrameEngine,
    import: &CallsetImport,
) -> Result<TableHandle, EngineError> {
    let dataset_type = import.dataset_type;
    info!(
        "Importing {} {} callset from {:?}",
        import.genome_version, dataset_type, import.callset_paths
    );

    if !dataset_type.imports_from_vcf() {
        let table = engine.import_call_table(&import.callset_paths).await?;
        return engine.key_rows_by(&table, dataset_type.key_fields()).await;
    }

    let mut table = engine
        .import_vcf(&vcf_request(&import.callset_paths, import))
        .await?;

    if !import.filters_paths.is_empty() {
        let filters = engine
            .import_vcf(&vcf_request(&import.filters_paths, import))
            .await?;
        table = engine.annotate_filters(&table, &filters).await?;
    }

    if dataset_type.supports_multiallelic_split() {
        table = engine.split_multi(&table).await?;
    }

    engine.key_rows_by(&table, dataset_type.key_fields()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n";

    #[test]
    fn recoding_targets_the_build_convention() {
        let grch38 = contig_recoding(GenomeVersion::GRCh38);
        assert_eq!(grch38.get("1").map(String::as_str), Some("chr1"));
        assert_eq!(grch38.get("Y").map(String::as_str), Some("chrY"));
        assert_eq!(grch38.len(), 24);
        assert!(!grch38.contains_key("MT"));

        let grch37 = contig_recoding(GenomeVersion::GRCh37);
        assert_eq!(grch37.get("chrX").map(String::as_str), Some("X"));
    }

    #[tokio::test]
    async fn imports_splits_and_joins_filters() {
        let dir = tempfile::tempdir().unwrap();
        let callset = dir.path().join("callset.vcf");
        std::fs::write(
            &callset,
            format!(
                "{}1\t100\t.\tA\tC,G\t.\t.\t.\tGT\t1/2\n2\t50\t.\tT\tA\t.\t.\t.\tGT\t0/1\n",
                HEADER
            ),
        )
        .unwrap();
        let filters = dir.path().join("filters.vcf");
        std::fs::write(
            &filters,
            format!("{}2\t50\t.\tT\tA\t.\tVQSRTrancheSNP\t.\tGT\t0/1\n", HEADER),
        )
        .unwrap();

        let engine = LocalEngine::new();
        let handle = import_callset(
            &engine,
            &CallsetImport {
                callset_paths: vec![callset.to_string_lossy().to_string()],
                filters_paths: vec![filters.to_string_lossy().to_string()],
                genome_version: GenomeVersion::GRCh38,
                dataset_type: DatasetType::SnvIndel,
                min_partitions: 500,
            },
        )
        .await
        .unwrap();

        let table = engine.table(&handle).await.unwrap();
        assert_eq!(table.key_fields, vec!["locus", "alleles"]);
        assert_eq!(table.rows.len(), 3);
        assert!(table
            .rows
            .iter()
            .all(|row| row.locus.as_ref().unwrap().contig.starts_with("chr")));
        let filtered = table
            .rows
            .iter()
            .find(|row| row.locus.as_ref().unwrap().contig == "chr2")
            .unwrap();
        assert_eq!(filtered.filters, Some(vec!["VQSRTrancheSNP".to_string()]));
        assert!(table.rows[0].alleles_old.is_some());
    }

    #[tokio::test]
    async fn gcnv_imports_call_tables_by_variant_id() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls.tsv");
        std::fs::write(
            &calls,
            "variant_id\tchr\tstart\tsample_id\nsuffix_1_DEL\tchr1\t100\tS1\n",
        )
        .unwrap();

        let engine = LocalEngine::new();
        let handle = import_callset(
            &engine,
            &CallsetImport {
                callset_paths: vec![calls.to_string_lossy().to_string()],
                filters_paths: Vec::new(),
                genome_version: GenomeVersion::GRCh38,
                dataset_type: DatasetType::Gcnv,
                min_partitions: 500,
            },
        )
        .await
        .unwrap();
        let table = engine.table(&handle).await.unwrap();
        assert_eq!(table.key_fields, vec!["variant_id"]);
        assert!(table.rows[0].a_index.is_none());
    }

    #[tokio::test]
    async fn malformed_callset_is_an_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let callset = dir.path().join("broken.vcf");
        std::fs::write(&callset, "1\t100\t.\tA\tC\n").unwrap();

        let engine = LocalEngine::new();
        let err = import_callset(
            &engine,
            &CallsetImport {
                callset_paths: vec![callset.to_string_lossy().to_string()],
                filters_paths: Vec::new(),
                genome_version: GenomeVersion::GRCh37,
                dataset_type: DatasetType::SnvIndel,
                min_partitions: 500,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Import { .. }));
    }
}
