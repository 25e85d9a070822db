//! create-snapshot - back up one search index to a snapshot repository.

use chrono::{DateTime, Local};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use seqr_loading::search::{ElasticsearchClient, SearchCluster, SearchConnection};
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "create-snapshot",
    version,
    about = "Snapshot a search index into a GCS-backed repository"
)]
struct Cli {
    /// Search cluster node host or IP
    #[arg(short = 'H', long)]
    host: String,

    #[arg(short, long, default_value_t = 9200)]
    port: u16,

    /// Bucket holding the snapshot repository
    #[arg(short, long, default_value = "seqr-database-backups")]
    bucket: String,

    /// Path within the bucket
    #[arg(short = 'd', long, default_value = "elasticsearch/snapshots")]
    base_path: String,

    /// Snapshot repository name
    #[arg(short, long, default_value = "elasticsearch-prod")]
    repo: String,

    /// Index to include in the snapshot
    #[arg(short, long)]
    index: String,

    /// Return only once the snapshot is created
    #[arg(short, long)]
    wait_for_completion: bool,
}

fn snapshot_name(index: &str, now: DateTime<Local>) -> String {
    format!(
        "snapshot_{}__{}",
        index.to_lowercase(),
        now.format("%Y-%m-%d_%H-%M-%S")
    )
}

fn print_pretty(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("{index} not found. Existing indices are: {}", existing.join(", "))]
struct UnknownIndex {
    index: String,
    existing: Vec<String>,
}

/// Snapshot `cli.index` and return the snapshot name.
async fn run(
    cli: &Cli,
    cluster: &dyn SearchCluster,
    now: DateTime<Local>,
) -> anyhow::Result<String> {
    let existing = cluster.index_names().await?;
    if !existing.contains(&cli.index) {
        return Err(UnknownIndex {
            index: cli.index.clone(),
            existing,
        }
        .into());
    }

    let snapshot = snapshot_name(&cli.index, now);

    println!("==> Check if snapshot repo exists: {}", cli.repo);
    print_pretty(&cluster.get_repository(&cli.repo).await?)?;

    println!(
        "==> Creating snapshot in gs://{}/{} for index {}",
        cli.bucket, cli.base_path, cli.index
    );
    let created = cluster
        .create_snapshot(
            &cli.repo,
            &snapshot,
            std::slice::from_ref(&cli.index),
            cli.wait_for_completion,
        )
        .await?;
    print_pretty(&created)?;

    println!("==> Getting snapshot status for: {}", snapshot);
    print_pretty(&cluster.snapshot_status(&cli.repo).await?)?;
    Ok(snapshot)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let client = ElasticsearchClient::new(&SearchConnection {
        host: cli.host.clone(),
        port: cli.port,
        ..SearchConnection::default()
    })?;

    match run(&cli, &client, Local::now()).await {
        Ok(_) => Ok(()),
        Err(e) => match e.downcast_ref::<UnknownIndex>() {
            Some(unknown) => Cli::command()
                .error(ErrorKind::InvalidValue, unknown.to_string())
                .exit(),
            None => Err(e),
        },
    }
}
