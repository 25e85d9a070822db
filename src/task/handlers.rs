//! Built-in handlers, one per task variant.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use super::graph::GraphError;
use super::registry::{TaskContext, TaskHandler};
use super::spec::{
    AnnotateParams, CallsetParams, ExportParams, ReconcileParams, TaskKind, TaskSpec,
};
use crate::config::ConfigError;
use crate::error::PipelineError;
use crate::export::IndexExporter;
use crate::importer::{import_callset, CallsetImport};
use crate::samples::{remap_sample_ids, subset_samples};
use crate::storage::{join_path, Target};
use crate::util::is_glob;
use crate::validation::{validate_callset, ValidationReferences};

fn mismatch(expected: TaskKind, spec: &TaskSpec) -> PipelineError {
    GraphError::KindMismatch {
        expected,
        found: spec.kind(),
    }
    .into()
}

/// Source inputs as dependencies. Globs cannot be checked for existence up front.
fn source_files(paths: &[String]) -> impl Iterator<Item = TaskSpec> + '_ {
    paths
        .iter()
        .filter(|path| !is_glob(path))
        .map(|path| TaskSpec::SourceFile(path.clone()))
}

fn imported_path(ctx: &TaskContext, p: &CallsetParams) -> String {
    ctx.layout
        .imported_callset_path(p.genome_version, p.dataset_type, &p.callset_paths)
}

fn reconciled_path(ctx: &TaskContext, p: &ReconcileParams) -> String {
    ctx.layout.reconciled_callset_path(
        p.callset.genome_version,
        p.callset.dataset_type,
        &p.callset.callset_paths,
        p.samples.remap_path.as_deref(),
        p.samples.subset_path.as_deref(),
    )
}

fn upstream_path(ctx: &TaskContext, p: &AnnotateParams) -> String {
    match p.upstream() {
        TaskSpec::ReconcileSamples(reconcile) => reconciled_path(ctx, &reconcile),
        _ => imported_path(ctx, &p.callset),
    }
}

fn annotations_path(ctx: &TaskContext, p: &AnnotateParams) -> String {
    ctx.layout.annotations_path(
        p.callset.genome_version,
        p.callset.dataset_type,
        &upstream_path(ctx, p),
        &p.reference_datasets,
    )
}

fn validation_references(ctx: &TaskContext, p: &CallsetParams) -> ValidationReferences {
    ValidationReferences {
        coding_path: ctx.layout.common_coding_variants_path(p.genome_version),
        noncoding_path: ctx.layout.common_noncoding_variants_path(p.genome_version),
    }
}

fn runs_validation(p: &CallsetParams) -> bool {
    p.validate && p.dataset_type.can_run_validation()
}

/// An input file. Never produced by the pipeline.
pub struct SourceFileHandler;

#[async_trait]
impl TaskHandler for SourceFileHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::SourceFile
    }

    fn requires(&self, _: &TaskSpec, _: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        Ok(Vec::new())
    }

    fn output(&self, spec: &TaskSpec, _: &TaskContext) -> Result<Target, PipelineError> {
        match spec {
            TaskSpec::SourceFile(path) => Ok(Target::File(path.clone())),
            other => Err(mismatch(TaskKind::SourceFile, other)),
        }
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        Err(PipelineError::MissingInput(self.output(spec, ctx)?.to_string()))
    }
}

/// A reference table folder. Never produced by the pipeline.
pub struct ReferenceTableHandler;

#[async_trait]
impl TaskHandler for ReferenceTableHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::ReferenceTable
    }

    fn requires(&self, _: &TaskSpec, _: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        Ok(Vec::new())
    }

    fn output(&self, spec: &TaskSpec, _: &TaskContext) -> Result<Target, PipelineError> {
        match spec {
            TaskSpec::ReferenceTable(path) => Ok(Target::Folder(path.clone())),
            other => Err(mismatch(TaskKind::ReferenceTable, other)),
        }
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        Err(PipelineError::MissingInput(self.output(spec, ctx)?.to_string()))
    }
}

pub struct ImportCallsetHandler;

impl ImportCallsetHandler {
    fn params<'a>(&self, spec: &'a TaskSpec) -> Result<&'a CallsetParams, PipelineError> {
        match spec {
            TaskSpec::ImportCallset(p) => Ok(p),
            other => Err(mismatch(TaskKind::ImportCallset, other)),
        }
    }
}

#[async_trait]
impl TaskHandler for ImportCallsetHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::ImportCallset
    }

    fn requires(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        let p = self.params(spec)?;
        let mut requires: Vec<TaskSpec> = source_files(&p.callset_paths)
            .chain(source_files(&p.filters_paths))
            .collect();
        if runs_validation(p) {
            let references = validation_references(ctx, p);
            requires.push(TaskSpec::ReferenceTable(references.coding_path));
            requires.push(TaskSpec::ReferenceTable(references.noncoding_path));
        }
        Ok(requires)
    }

    fn output(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Target, PipelineError> {
        Ok(Target::Folder(imported_path(ctx, self.params(spec)?)))
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        let p = self.params(spec)?;
        let engine = ctx.engine.as_ref();
        let table = import_callset(
            engine,
            &CallsetImport {
                callset_paths: p.callset_paths.clone(),
                filters_paths: p.filters_paths.clone(),
                genome_version: p.genome_version,
                dataset_type: p.dataset_type,
                min_partitions: ctx.config.min_vcf_partitions,
            },
        )
        .await?;

        if runs_validation(p) {
            validate_callset(
                engine,
                &table,
                p.genome_version,
                p.sample_type,
                &validation_references(ctx, p),
                &ctx.config.validation,
            )
            .await?;
            info!("Validation passed for {}", spec);
        }

        engine
            .write(&table, self.output(spec, ctx)?.path(), true)
            .await?;
        Ok(())
    }
}

pub struct ReconcileSamplesHandler;

impl ReconcileSamplesHandler {
    fn params<'a>(&self, spec: &'a TaskSpec) -> Result<&'a ReconcileParams, PipelineError> {
        match spec {
            TaskSpec::ReconcileSamples(p) => Ok(p),
            other => Err(mismatch(TaskKind::ReconcileSamples, other)),
        }
    }
}

#[async_trait]
impl TaskHandler for ReconcileSamplesHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::ReconcileSamples
    }

    fn requires(&self, spec: &TaskSpec, _: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        let p = self.params(spec)?;
        let mut requires = vec![TaskSpec::ImportCallset(p.callset.clone())];
        requires.extend(
            [&p.samples.remap_path, &p.samples.subset_path]
                .into_iter()
                .flatten()
                .map(|path| TaskSpec::SourceFile(path.clone())),
        );
        Ok(requires)
    }

    fn output(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Target, PipelineError> {
        Ok(Target::Folder(reconciled_path(ctx, self.params(spec)?)))
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        let p = self.params(spec)?;
        let engine = ctx.engine.as_ref();
        let mut table = engine.read_table(&imported_path(ctx, &p.callset)).await?;

        if let Some(remap_path) = &p.samples.remap_path {
            table = remap_sample_ids(engine, &table, remap_path).await?;
        }
        if let Some(subset_path) = &p.samples.subset_path {
            table = subset_samples(
                engine,
                &table,
                subset_path,
                p.samples.ignore_missing_samples,
            )
            .await?;
        }

        engine
            .write(&table, self.output(spec, ctx)?.path(), true)
            .await?;
        Ok(())
    }
}

pub struct AnnotateVariantsHandler;

impl AnnotateVariantsHandler {
    fn params<'a>(&self, spec: &'a TaskSpec) -> Result<&'a AnnotateParams, PipelineError> {
        match spec {
            TaskSpec::AnnotateVariants(p) => Ok(p),
            other => Err(mismatch(TaskKind::AnnotateVariants, other)),
        }
    }
}

#[async_trait]
impl TaskHandler for AnnotateVariantsHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::AnnotateVariants
    }

    fn requires(&self, spec: &TaskSpec, _: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        let p = self.params(spec)?;
        let mut requires = vec![p.upstream()];
        requires.extend(
            p.reference_datasets
                .iter()
                .map(|path| TaskSpec::ReferenceTable(path.clone())),
        );
        Ok(requires)
    }

    fn output(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Target, PipelineError> {
        Ok(Target::Folder(annotations_path(ctx, self.params(spec)?)))
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        let p = self.params(spec)?;
        let engine = ctx.engine.as_ref();
        let mut table = engine.read_table(&upstream_path(ctx, p)).await?;

        for path in &p.reference_datasets {
            let reference = engine.read_table(path).await?;
            table = engine.annotate_with_reference(&table, &reference).await?;
            info!("Joined reference dataset {}", path);
        }

        let mut globals = Map::new();
        globals.insert(
            "sourceFilePath".to_string(),
            json!(p.callset.callset_paths.join(",")),
        );
        globals.insert("genomeVersion".to_string(), json!(p.callset.genome_version));
        globals.insert("sampleType".to_string(), json!(p.callset.sample_type));
        globals.insert("datasetType".to_string(), json!(p.callset.dataset_type));
        table = engine.annotate_globals(&table, globals).await?;

        engine
            .write(&table, self.output(spec, ctx)?.path(), true)
            .await?;
        Ok(())
    }
}

pub struct ExportToIndexHandler;

impl ExportToIndexHandler {
    fn params<'a>(&self, spec: &'a TaskSpec) -> Result<&'a ExportParams, PipelineError> {
        match spec {
            TaskSpec::ExportToIndex(p) => Ok(p),
            other => Err(mismatch(TaskKind::ExportToIndex, other)),
        }
    }
}

#[async_trait]
impl TaskHandler for ExportToIndexHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::ExportToIndex
    }

    fn requires(&self, spec: &TaskSpec, _: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError> {
        let p = self.params(spec)?;
        Ok(vec![TaskSpec::AnnotateVariants(p.annotate.clone())])
    }

    fn output(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Target, PipelineError> {
        let p = self.params(spec)?;
        Ok(Target::Folder(ctx.layout.export_marker_path(
            p.annotate.callset.genome_version,
            p.annotate.callset.dataset_type,
            p.index_name(),
            &annotations_path(ctx, &p.annotate),
        )))
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError> {
        let p = self.params(spec)?;
        let cluster = ctx.cluster.clone().ok_or_else(|| {
            ConfigError::InvalidValue(
                "ES_HOST".to_string(),
                "no search cluster configured for export".to_string(),
            )
        })?;

        let engine = ctx.engine.as_ref();
        let table = engine
            .read_table(&annotations_path(ctx, &p.annotate))
            .await?;
        let num_shards = IndexExporter::new(Arc::clone(&cluster), p.use_temp_loading_nodes)
            .export(
                engine,
                &table,
                p.index_name(),
                p.min_shards,
                &p.disabled_fields,
            )
            .await?;

        let output = self.output(spec, ctx)?;
        let summary: Value = json!({
            "index": p.index_name(),
            "numShards": num_shards,
            "useTempLoadingNodes": p.use_temp_loading_nodes,
        });
        ctx.storage
            .write(
                &join_path(output.path(), "export.json"),
                summary.to_string().as_bytes(),
            )
            .await?;
        output.mark_complete(&ctx.storage).await?;
        Ok(())
    }
}
