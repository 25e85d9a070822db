//! seqr-loading - pipeline entry point
//!
//! Builds the requested task from command-line flags and runs it with every
//! incomplete dependency.

use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use seqr_loading::engine::{DataFrameEngine, LocalEngine};
use seqr_loading::search::{ElasticsearchClient, SearchCluster};
use seqr_loading::task::{
    AnnotateParams, CallsetParams, ExportParams, ReconcileParams, SampleParams, TaskContext,
};
use seqr_loading::util::parse_source_paths;
use seqr_loading::{Config, DatasetType, GenomeVersion, SampleType, Scheduler, TaskRegistry, TaskSpec};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One path or a JSON-encoded list of paths.
#[derive(Debug, Clone)]
struct SourcePaths(Vec<String>);

fn source_paths(raw: &str) -> Result<SourcePaths, String> {
    parse_source_paths(raw).map(SourcePaths)
}

/// Last stage to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    Import,
    Reconcile,
    Annotate,
    Export,
}

#[derive(Parser)]
#[command(
    name = "seqr-loading",
    version,
    about = "Load a genomic callset into a search index"
)]
struct Cli {
    /// Callset path, or a JSON list of paths
    #[arg(long, value_parser = source_paths)]
    callset_path: SourcePaths,

    /// Filters VCF path, or a JSON list of paths
    #[arg(long, value_parser = source_paths)]
    filters_path: Option<SourcePaths>,

    #[arg(long)]
    genome_version: GenomeVersion,

    #[arg(long)]
    dataset_type: DatasetType,

    #[arg(long)]
    sample_type: SampleType,

    /// Tab-separated table with `s` and `seqr_id` columns
    #[arg(long)]
    remap_path: Option<String>,

    /// Tab-separated table with an `s` column
    #[arg(long)]
    subset_path: Option<String>,

    /// Check contigs and sample type before writing the imported callset
    #[arg(long)]
    validate: bool,

    /// Keep going when subset samples are absent from the callset
    #[arg(long)]
    ignore_missing_samples: bool,

    /// Reference table joined onto the callset (repeatable)
    #[arg(long = "reference-dataset")]
    reference_datasets: Vec<String>,

    /// Destination search index, lowercase
    #[arg(long)]
    index_name: Option<String>,

    #[arg(long, default_value_t = 1)]
    min_shards: u32,

    /// Route the new index to loading nodes while documents stream in
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    use_temp_loading_nodes: bool,

    /// Field whose indexing is disabled in the mapping (repeatable)
    #[arg(long = "disabled-field")]
    disabled_fields: Vec<String>,

    #[arg(long, value_enum, default_value = "export")]
    until: Stage,
}

impl Cli {
    fn callset(&self) -> CallsetParams {
        CallsetParams {
            genome_version: self.genome_version,
            dataset_type: self.dataset_type,
            sample_type: self.sample_type,
            callset_paths: self.callset_path.0.clone(),
            filters_paths: self
                .filters_path
                .as_ref()
                .map(|paths| paths.0.clone())
                .unwrap_or_default(),
            validate: self.validate,
        }
    }

    fn samples(&self) -> SampleParams {
        SampleParams {
            remap_path: self.remap_path.clone(),
            subset_path: self.subset_path.clone(),
            ignore_missing_samples: self.ignore_missing_samples,
        }
    }

    fn annotate(&self) -> AnnotateParams {
        AnnotateParams {
            callset: self.callset(),
            samples: self.samples(),
            reference_datasets: self.reference_datasets.clone(),
        }
    }

    fn root_task(&self) -> anyhow::Result<TaskSpec> {
        Ok(match self.until {
            Stage::Import => TaskSpec::ImportCallset(self.callset()),
            Stage::Reconcile => {
                let samples = self.samples();
                if !samples.is_active() {
                    bail!("--until reconcile requires --remap-path or --subset-path");
                }
                TaskSpec::ReconcileSamples(ReconcileParams {
                    callset: self.callset(),
                    samples,
                })
            }
            Stage::Annotate => TaskSpec::AnnotateVariants(self.annotate()),
            Stage::Export => {
                let Some(index_name) = self.index_name.as_deref() else {
                    bail!("--index-name is required to export");
                };
                TaskSpec::ExportToIndex(ExportParams::new(
                    self.annotate(),
                    index_name,
                    self.min_shards,
                    self.use_temp_loading_nodes,
                    self.disabled_fields.clone(),
                )?)
            }
        })
    }
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seqr_loading=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let root = cli.root_task()?;

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: datasets={}, references={}, workers={}",
        config.datasets_root, config.reference_root, config.workers
    );

    let cluster = if cli.until == Stage::Export {
        let client = ElasticsearchClient::new(&config.search)?;
        Some(Arc::new(client) as Arc<dyn SearchCluster>)
    } else {
        None
    };
    let storage = config.storage();
    let engine: Arc<dyn DataFrameEngine> = Arc::new(LocalEngine::new());
    let ctx = TaskContext::new(config, engine, storage, cluster);

    let scheduler = Scheduler::new(
        Arc::new(TaskRegistry::with_builtin_handlers()),
        Arc::new(ctx),
    );
    info!("Requested {}", root);
    let summary = scheduler.run(root).await?;

    for task in &summary.already_complete {
        info!("Already complete: {}", task);
    }
    info!("Ran {} task(s)", summary.executed.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "seqr-loading",
            "--callset-path",
            "/data/a.vcf",
            "--genome-version",
            "GRCh38",
            "--dataset-type",
            "SNV_INDEL",
            "--sample-type",
            "WES",
            "--index-name",
            "grch38_snv_indel",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    fn uses_temp_nodes(cli: &Cli) -> bool {
        match cli.root_task().unwrap() {
            TaskSpec::ExportToIndex(p) => p.use_temp_loading_nodes,
            other => panic!("unexpected root task: {}", other),
        }
    }

    #[test]
    fn temp_loading_nodes_default_on() {
        assert!(uses_temp_nodes(&parse(&[])));
        assert!(!uses_temp_nodes(&parse(&["--use-temp-loading-nodes", "false"])));
    }

    #[test]
    fn reconcile_needs_sample_tables() {
        assert!(parse(&["--until", "reconcile"]).root_task().is_err());
        assert!(parse(&["--until", "reconcile", "--subset-path", "/data/s.tsv"])
            .root_task()
            .is_ok());
    }
}
