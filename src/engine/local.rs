//! Single-process engine over JSON table folders.
//!
//! A table folder holds `table.json` and the `_SUCCESS` marker. Folders are assembled
//! under a hidden sibling and renamed into place, so a folder at the final path is
//! always whole.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::table::{parse_call_table, parse_vcf, VariantTable};
use super::{DataFrameEngine, EngineError, TableHandle, VcfImportRequest};
use crate::search::{ExportRequest, IndexCreatedHook, SearchCluster};
use crate::storage::{local_path, SUCCESS_MARKER};

const TABLE_FILE: &str = "table.json";
const EXPORT_BATCH_SIZE: usize = 500;

#[derive(Default)]
pub struct LocalEngine {
    tables: RwLock<HashMap<TableHandle, Arc<VariantTable>>>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand an in-memory table to the engine.
    pub async fn register(&self, table: VariantTable) -> TableHandle {
        let handle = TableHandle::new();
        self.tables.write().await.insert(handle, Arc::new(table));
        handle
    }

    /// Snapshot of a table's rows, for inspection.
    pub async fn table(&self, handle: &TableHandle) -> Result<Arc<VariantTable>, EngineError> {
        self.tables
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or(EngineError::UnknownHandle(*handle))
    }

    async fn derive<F>(&self, handle: &TableHandle, f: F) -> Result<TableHandle, EngineError>
    where
        F: FnOnce(&VariantTable) -> VariantTable,
    {
        let table = self.table(handle).await?;
        Ok(self.register(f(&table)).await)
    }
}

fn ensure_local(path: &str) -> Result<PathBuf, EngineError> {
    if path.contains("://") && !path.starts_with("file://") {
        return Err(EngineError::Unsupported(format!(
            "{} (local engine reads local paths only)",
            path
        )));
    }
    Ok(local_path(path))
}

/// Expand a `*` in the final path component against the directory listing.
async fn expand_paths(paths: &[String]) -> Result<Vec<PathBuf>, EngineError> {
    let mut expanded = Vec::new();
    for path in paths {
        let local = ensure_local(path)?;
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !name.contains('*') {
            expanded.push(local);
            continue;
        }
        let pattern = format!("^{}$", regex::escape(&name).replace(r"\*", ".*"));
        let matcher = Regex::new(&pattern).map_err(|e| EngineError::Import {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let dir = local
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut entries = fs::read_dir(&dir).await.map_err(|e| EngineError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let mut matched = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| EngineError::Io {
            path: dir.display().to_string(),
            source: e,
        })? {
            if matcher.is_match(&entry.file_name().to_string_lossy()) {
                matched.push(entry.path());
            }
        }
        if matched.is_empty() {
            return Err(EngineError::Import {
                path: path.clone(),
                message: "pattern matched no files".to_string(),
            });
        }
        matched.sort();
        expanded.extend(matched);
    }
    Ok(expanded)
}

async fn read_text(path: &Path) -> Result<String, EngineError> {
    if path.extension().map(|ext| ext == "gz" || ext == "bgz").unwrap_or(false) {
        return Err(EngineError::Unsupported(format!(
            "compressed input {}",
            path.display()
        )));
    }
    fs::read_to_string(path).await.map_err(|e| EngineError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Concatenate per-file tables; every file must carry the same samples.
fn concat(
    parts: Vec<(PathBuf, Vec<String>, Vec<super::VariantRow>)>,
    key_fields: &[&str],
) -> Result<VariantTable, EngineError> {
    let mut table = VariantTable {
        key_fields: key_fields.iter().map(|f| f.to_string()).collect(),
        ..VariantTable::default()
    };
    for (index, (path, samples, rows)) in parts.into_iter().enumerate() {
        if index == 0 {
            table.samples = samples;
        } else if samples != table.samples {
            return Err(EngineError::Import {
                path: path.display().to_string(),
                message: "sample columns differ from the first input".to_string(),
            });
        }
        table.rows.extend(rows);
    }
    Ok(table)
}

#[async_trait]
impl DataFrameEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn import_vcf(&self, request: &VcfImportRequest) -> Result<TableHandle, EngineError> {
        let mut parts = Vec::new();
        for path in expand_paths(&request.paths).await? {
            let text = read_text(&path).await?;
            let (samples, rows) =
                parse_vcf(&text, &request.contig_recoding, request.skip_invalid_loci).map_err(
                    |message| EngineError::Import {
                        path: path.display().to_string(),
                        message,
                    },
                )?;
            parts.push((path, samples, rows));
        }
        let table = concat(parts, &["locus", "alleles"])?;
        tracing::debug!(
            "Imported {} rows x {} samples ({} genome, {} min partitions)",
            table.rows.len(),
            table.samples.len(),
            request.genome_version,
            request.min_partitions
        );
        Ok(self.register(table).await)
    }

    async fn import_call_table(&self, paths: &[String]) -> Result<TableHandle, EngineError> {
        let mut parts = Vec::new();
        for path in expand_paths(paths).await? {
            let text = read_text(&path).await?;
            let (samples, rows) = parse_call_table(&text).map_err(|message| EngineError::Import {
                path: path.display().to_string(),
                message,
            })?;
            parts.push((path, samples, rows));
        }
        let table = concat(parts, &["variant_id"])?;
        Ok(self.register(table).await)
    }

    async fn read_table(&self, path: &str) -> Result<TableHandle, EngineError> {
        let dir = ensure_local(path)?;
        if fs::metadata(dir.join(SUCCESS_MARKER)).await.is_err() {
            return Err(EngineError::TableNotFound(path.to_string()));
        }
        let data_path = dir.join(TABLE_FILE);
        let bytes = fs::read(&data_path).await.map_err(|e| EngineError::Io {
            path: data_path.display().to_string(),
            source: e,
        })?;
        let table: VariantTable =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::Corrupt {
                path: path.to_string(),
                source: e,
            })?;
        Ok(self.register(table).await)
    }

    async fn read_id_table(
        &self,
        path: &str,
        columns: &[&str],
    ) -> Result<Vec<Vec<String>>, EngineError> {
        let text = read_text(&ensure_local(path)?).await?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header: Vec<&str> = lines.next().unwrap_or_default().split('\t').collect();
        let indices = columns
            .iter()
            .map(|column| {
                header
                    .iter()
                    .position(|h| h.trim() == *column)
                    .ok_or_else(|| EngineError::MissingColumn {
                        path: path.to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines
            .map(|line| {
                let fields: Vec<&str> = line.split('\t').collect();
                indices
                    .iter()
                    .map(|&i| fields.get(i).map(|f| f.trim().to_string()).unwrap_or_default())
                    .collect()
            })
            .collect())
    }

    async fn annotate_filters(
        &self,
        table: &TableHandle,
        filters: &TableHandle,
    ) -> Result<TableHandle, EngineError> {
        let filters = self.table(filters).await?;
        self.derive(table, |t| {
            let mut out = t.clone();
            let by_key: HashMap<String, Option<Vec<String>>> = filters
                .rows
                .iter()
                .map(|row| (row.key(&t.key_fields), row.filters.clone()))
                .collect();
            for row in &mut out.rows {
                row.filters = by_key.get(&row.key(&t.key_fields)).cloned().flatten();
            }
            out
        })
        .await
    }

    async fn split_multi(&self, table: &TableHandle) -> Result<TableHandle, EngineError> {
        self.derive(table, VariantTable::split_multi).await
    }

    async fn key_rows_by(
        &self,
        table: &TableHandle,
        fields: &[&str],
    ) -> Result<TableHandle, EngineError> {
        self.derive(table, |t| VariantTable {
            key_fields: fields.iter().map(|f| f.to_string()).collect(),
            ..t.clone()
        })
        .await
    }

    async fn count_rows(&self, table: &TableHandle) -> Result<u64, EngineError> {
        Ok(self.table(table).await?.rows.len() as u64)
    }

    async fn count_cols(&self, table: &TableHandle) -> Result<u64, EngineError> {
        Ok(self.table(table).await?.samples.len() as u64)
    }

    async fn contig_counts(
        &self,
        table: &TableHandle,
    ) -> Result<BTreeMap<String, u64>, EngineError> {
        Ok(self.table(table).await?.contig_counts())
    }

    async fn semi_join_count(
        &self,
        table: &TableHandle,
        other: &TableHandle,
    ) -> Result<u64, EngineError> {
        let table = self.table(table).await?;
        let other = self.table(other).await?;
        let keys: BTreeSet<String> = other
            .rows
            .iter()
            .map(|row| row.key(&table.key_fields))
            .collect();
        Ok(table
            .rows
            .iter()
            .filter(|row| keys.contains(&row.key(&table.key_fields)))
            .count() as u64)
    }

    async fn sample_ids(&self, table: &TableHandle) -> Result<Vec<String>, EngineError> {
        Ok(self.table(table).await?.samples.clone())
    }

    async fn remap_samples(
        &self,
        table: &TableHandle,
        mapping: &BTreeMap<String, String>,
    ) -> Result<TableHandle, EngineError> {
        self.derive(table, |t| VariantTable {
            samples: t
                .samples
                .iter()
                .map(|s| mapping.get(s).cloned().unwrap_or_else(|| s.clone()))
                .collect(),
            ..t.clone()
        })
        .await
    }

    async fn subset_samples(
        &self,
        table: &TableHandle,
        sample_ids: &[String],
    ) -> Result<TableHandle, EngineError> {
        self.derive(table, |t| t.subset_samples(sample_ids)).await
    }

    async fn filter_rows_with_non_ref_calls(
        &self,
        table: &TableHandle,
    ) -> Result<TableHandle, EngineError> {
        self.derive(table, |t| VariantTable {
            rows: t
                .rows
                .iter()
                .filter(|row| row.has_non_ref_call())
                .cloned()
                .collect(),
            ..t.clone()
        })
        .await
    }

    async fn annotate_with_reference(
        &self,
        table: &TableHandle,
        reference: &TableHandle,
    ) -> Result<TableHandle, EngineError> {
        let reference = self.table(reference).await?;
        self.derive(table, |t| {
            let by_key: HashMap<String, &Map<String, Value>> = reference
                .rows
                .iter()
                .map(|row| (row.key(&t.key_fields), &row.annotations))
                .collect();
            let mut out = t.clone();
            for row in &mut out.rows {
                if let Some(annotations) = by_key.get(&row.key(&t.key_fields)) {
                    row.annotations
                        .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            out
        })
        .await
    }

    async fn annotate_globals(
        &self,
        table: &TableHandle,
        globals: Map<String, Value>,
    ) -> Result<TableHandle, EngineError> {
        self.derive(table, |t| {
            let mut out = t.clone();
            out.globals.extend(globals);
            out
        })
        .await
    }

    async fn write(
        &self,
        table: &TableHandle,
        path: &str,
        overwrite: bool,
    ) -> Result<(), EngineError> {
        let table = self.table(table).await?;
        let target = ensure_local(path)?;
        let io_err = |e: std::io::Error| EngineError::Io {
            path: path.to_string(),
            source: e,
        };

        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).await.map_err(io_err)?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "table".to_string());
        let staging = parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));
        fs::create_dir_all(&staging).await.map_err(io_err)?;

        let data = serde_json::to_vec(table.as_ref()).map_err(|e| EngineError::Corrupt {
            path: path.to_string(),
            source: e,
        })?;
        fs::write(staging.join(TABLE_FILE), data).await.map_err(io_err)?;
        fs::write(staging.join(SUCCESS_MARKER), b"").await.map_err(io_err)?;

        if fs::metadata(&target).await.is_ok() {
            if !overwrite {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(EngineError::AlreadyExists(path.to_string()));
            }
            fs::remove_dir_all(&target).await.map_err(io_err)?;
        }
        fs::rename(&staging, &target).await.map_err(io_err)?;
        tracing::info!("Wrote {} rows to {}", table.rows.len(), path);
        Ok(())
    }

    async fn export_to_index(
        &self,
        table: &TableHandle,
        request: &ExportRequest,
        cluster: &dyn SearchCluster,
        hook: Option<&dyn IndexCreatedHook>,
    ) -> Result<(), EngineError> {
        let table = self.table(table).await?;
        cluster
            .create_index(&request.index_name, &request.index_settings())
            .await?;
        if let Some(hook) = hook {
            hook.on_index_created(cluster, &request.index_name).await?;
        }

        for chunk in table.rows.chunks(EXPORT_BATCH_SIZE) {
            let documents = chunk
                .iter()
                .map(|row| {
                    let doc =
                        table.document(row, &request.mapping_id_field, request.write_null_values);
                    (row.document_id(), doc)
                })
                .collect();
            cluster.bulk_index(&request.index_name, documents).await?;
        }
        tracing::info!(
            "Exported {} documents to {}",
            table.rows.len(),
            request.index_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Locus, VariantRow};
    use crate::model::GenomeVersion;
    use crate::search::{ClusterEvent, InMemorySearchCluster};

    fn row(contig: &str, pos: u64, alleles: &[&str], gts: &[&str]) -> VariantRow {
        VariantRow {
            locus: Some(Locus {
                contig: contig.to_string(),
                position: pos,
            }),
            alleles: alleles.iter().map(|a| a.to_string()).collect(),
            genotypes: gts.iter().map(|g| Some(g.to_string())).collect(),
            ..VariantRow::default()
        }
    }

    fn table(samples: &[&str], rows: Vec<VariantRow>) -> VariantTable {
        VariantTable {
            key_fields: vec!["locus".into(), "alleles".into()],
            samples: samples.iter().map(|s| s.to_string()).collect(),
            rows,
            globals: Map::new(),
        }
    }

    #[tokio::test]
    async fn write_publishes_folder_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalEngine::new();
        let handle = engine
            .register(table(&["A"], vec![row("chr1", 1, &["A", "T"], &["0/1"])]))
            .await;
        let path = dir.path().join("out.mt").to_string_lossy().to_string();

        engine.write(&handle, &path, false).await.unwrap();
        assert!(dir.path().join("out.mt").join(SUCCESS_MARKER).exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());

        let err = engine.write(&handle, &path, false).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
        engine.write(&handle, &path, true).await.unwrap();

        let reread = engine.read_table(&path).await.unwrap();
        assert_eq!(engine.count_rows(&reread).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn folder_without_marker_is_not_a_table() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("partial.mt");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join(TABLE_FILE), "{}").unwrap();

        let engine = LocalEngine::new();
        let err = engine
            .read_table(&folder.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn imports_globbed_vcfs() {
        let dir = tempfile::tempdir().unwrap();
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n";
        std::fs::write(
            dir.path().join("part1.vcf"),
            format!("{}1\t10\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\n", header),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("part2.vcf"),
            format!("{}2\t20\t.\tG\tT\t.\tPASS\t.\tGT\t1/1\n", header),
        )
        .unwrap();

        let engine = LocalEngine::new();
        let request = VcfImportRequest {
            paths: vec![dir.path().join("part*.vcf").to_string_lossy().to_string()],
            genome_version: GenomeVersion::GRCh37,
            contig_recoding: BTreeMap::new(),
            skip_invalid_loci: true,
            min_partitions: 500,
            force_bgz: true,
        };
        let handle = engine.import_vcf(&request).await.unwrap();
        let counts = engine.contig_counts(&handle).await.unwrap();
        assert_eq!(counts.get("1"), Some(&1));
        assert_eq!(counts.get("2"), Some(&1));
    }

    #[tokio::test]
    async fn remote_paths_are_unsupported() {
        let engine = LocalEngine::new();
        let err = engine.read_table("gs://bucket/table.mt").await.unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[tokio::test]
    async fn semi_join_and_subset() {
        let engine = LocalEngine::new();
        let callset = engine
            .register(table(
                &["A", "B"],
                vec![
                    row("1", 1, &["A", "T"], &["0/1", "0/0"]),
                    row("1", 2, &["C", "G"], &["0/0", "0/1"]),
                ],
            ))
            .await;
        let reference = engine
            .register(table(&[], vec![row("1", 2, &["C", "G"], &[])]))
            .await;
        assert_eq!(engine.semi_join_count(&callset, &reference).await.unwrap(), 1);

        let subset = engine
            .subset_samples(&callset, &["A".to_string()])
            .await
            .unwrap();
        let filtered = engine.filter_rows_with_non_ref_calls(&subset).await.unwrap();
        assert_eq!(engine.sample_ids(&filtered).await.unwrap(), vec!["A"]);
        assert_eq!(engine.count_rows(&filtered).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn export_runs_hook_before_documents() {
        struct Marker;

        #[async_trait]
        impl IndexCreatedHook for Marker {
            async fn on_index_created(
                &self,
                cluster: &dyn SearchCluster,
                index: &str,
            ) -> Result<(), crate::search::SearchError> {
                cluster.route_index_to_temp_nodes(index).await
            }
        }

        let engine = LocalEngine::new();
        let handle = engine
            .register(table(&["A"], vec![row("1", 5, &["A", "T"], &["0/1"])]))
            .await;
        let cluster = InMemorySearchCluster::new();
        let request = ExportRequest::new("grch37_snv", 2, Vec::new());
        engine
            .export_to_index(&handle, &request, &cluster, Some(&Marker))
            .await
            .unwrap();

        let events = cluster.events().await;
        assert!(matches!(events[0], ClusterEvent::IndexCreated { num_shards: 2, .. }));
        assert!(matches!(events[1], ClusterEvent::RoutedToLoadingNodes { .. }));
        assert!(matches!(events[2], ClusterEvent::DocumentsIndexed { count: 1, .. }));
        assert!(cluster.documents("grch37_snv").await.contains_key("1-5-A-T"));
    }
}
