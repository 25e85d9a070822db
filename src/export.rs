//! Export sizing and loading-node routing.
//!
//! Sequence for one export:
//! 1. size the index from rows x samples
//! 2. drop any index left by an interrupted run, then create the index; with temp loading nodes enabled, route it to them before any
//!    document lands
//! 3. bulk export with explicit nulls and `docId` as document id
//! 4. route off the loading nodes; small indices block until the transfer finished

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{DataFrameEngine, EngineError, TableHandle};
use crate::search::{ExportRequest, IndexCreatedHook, SearchCluster, SearchError};

/// Documents (rows x samples) one shard is sized for.
pub const DOCUMENTS_PER_SHARD: u128 = 1_400_000_000;

/// Indices with fewer shards than this wait for the transfer off loading nodes.
pub const SHARD_TRANSFER_WAIT_THRESHOLD: u32 = 25;

pub const SHARD_TRANSFER_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const SHARD_TRANSFER_MAX_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// `max(min_shards, ceil(rows * samples / 1.4e9))`.
pub fn compute_num_shards(rows: u64, samples: u64, min_shards: u32) -> u32 {
    let volume = rows as u128 * samples as u128;
    let calculated = volume.div_ceil(DOCUMENTS_PER_SHARD);
    let calculated = u32::try_from(calculated).unwrap_or(u32::MAX);
    calculated.max(min_shards)
}

/// Routes a freshly created index onto the temporary loading nodes.
pub struct TempNodeRouting;

#[async_trait]
impl IndexCreatedHook for TempNodeRouting {
    async fn on_index_created(
        &self,
        cluster: &dyn SearchCluster,
        index: &str,
    ) -> Result<(), SearchError> {
        info!("Routing {} to temporary loading nodes", index);
        cluster.route_index_to_temp_nodes(index).await
    }
}

/// Poll shard placements until no shard of `index` sits on a loading node.
pub async fn wait_for_shard_transfer(
    cluster: &dyn SearchCluster,
    index: &str,
    poll_interval: Duration,
    max_attempts: u32,
) -> Result<(), SearchError> {
    for attempt in 1..=max_attempts {
        let placements = cluster.shard_placements(index).await?;
        let remaining = placements.iter().filter(|p| p.is_on_loading_node()).count();
        if remaining == 0 {
            info!("Shards of {} transferred off loading nodes", index);
            return Ok(());
        }
        debug!(
            "Waiting for {} shard(s) of {} to leave loading nodes (check {}/{})",
            remaining, index, attempt, max_attempts
        );
        tokio::time::sleep(poll_interval).await;
    }
    Err(SearchError::shard_transfer_timeout(
        index,
        max_attempts,
        poll_interval,
    ))
}

/// Drives one table export against a search cluster.
pub struct IndexExporter {
    cluster: Arc<dyn SearchCluster>,
    use_temp_loading_nodes: bool,
    poll_interval: Duration,
    max_attempts: u32,
}

impl IndexExporter {
    pub fn new(cluster: Arc<dyn SearchCluster>, use_temp_loading_nodes: bool) -> Self {
        Self {
            cluster,
            use_temp_loading_nodes,
            poll_interval: SHARD_TRANSFER_POLL_INTERVAL,
            max_attempts: SHARD_TRANSFER_MAX_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_attempts = max_attempts;
        self
    }

    /// Export `table` into `index_name`. Returns the shard count used.
    pub async fn export(
        &self,
        engine: &dyn DataFrameEngine,
        table: &TableHandle,
        index_name: &str,
        min_shards: u32,
        disabled_fields: &[String],
    ) -> Result<u32, ExportError> {
        let (rows, samples) =
            futures::try_join!(engine.count_rows(table), engine.count_cols(table))?;
        let num_shards = compute_num_shards(rows, samples, min_shards);
        info!(
            "Exporting {} rows x {} samples to {} with {} shards",
            rows, samples, index_name, num_shards
        );

        if self.cluster.index_exists(index_name).await? {
            warn!("Deleting existing index {} before export", index_name);
            self.cluster.delete_index(index_name).await?;
        }

        let request = ExportRequest::new(index_name, num_shards, disabled_fields.to_vec());
        let routing = TempNodeRouting;
        let hook: Option<&dyn IndexCreatedHook> = if self.use_temp_loading_nodes {
            Some(&routing)
        } else {
            None
        };
        engine
            .export_to_index(table, &request, self.cluster.as_ref(), hook)
            .await?;

        self.cleanup(index_name, num_shards).await?;
        Ok(num_shards)
    }

    /// Route off the loading nodes; wait for the transfer when the index is small.
    pub async fn cleanup(&self, index_name: &str, num_shards: u32) -> Result<(), SearchError> {
        self.cluster.route_index_off_temp_nodes(index_name).await?;
        if num_shards < SHARD_TRANSFER_WAIT_THRESHOLD {
            wait_for_shard_transfer(
                self.cluster.as_ref(),
                index_name,
                self.poll_interval,
                self.max_attempts,
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, Locus, VariantRow, VariantTable};
    use crate::search::{ClusterEvent, InMemorySearchCluster, SearchErrorKind};

    #[test]
    fn shard_count_scales_with_volume() {
        assert_eq!(compute_num_shards(2_000_000_000, 1, 1), 2);
        assert_eq!(compute_num_shards(1, 1, 5), 5);
        assert_eq!(compute_num_shards(1_400_000_000, 1, 1), 1);
        assert_eq!(compute_num_shards(1_400_000_001, 1, 1), 2);
        assert_eq!(compute_num_shards(0, 0, 1), 1);
        assert_eq!(compute_num_shards(u64::MAX, u64::MAX, 1), u32::MAX);
    }

    async fn small_table(engine: &LocalEngine) -> TableHandle {
        engine
            .register(VariantTable {
                key_fields: vec!["locus".into(), "alleles".into()],
                samples: vec!["S1".into()],
                rows: vec![VariantRow {
                    locus: Some(Locus {
                        contig: "chr1".into(),
                        position: 100,
                    }),
                    alleles: vec!["A".into(), "C".into()],
                    genotypes: vec![Some("0/1".into())],
                    ..VariantRow::default()
                }],
                ..VariantTable::default()
            })
            .await
    }

    #[tokio::test]
    async fn small_index_routes_through_loading_nodes_and_waits() {
        let engine = LocalEngine::new();
        let table = small_table(&engine).await;
        let cluster = InMemorySearchCluster::new().with_transfer_delay(2);
        let exporter = IndexExporter::new(Arc::new(cluster.clone()), true)
            .with_polling(Duration::from_millis(1), 10);

        let shards = exporter
            .export(&engine, &table, "grch38_snv_indel", 1, &[])
            .await
            .unwrap();
        assert_eq!(shards, 1);

        let events = cluster.events().await;
        let index = "grch38_snv_indel".to_string();
        assert_eq!(
            &events[..4],
            &[
                ClusterEvent::IndexCreated {
                    index: index.clone(),
                    num_shards: 1
                },
                ClusterEvent::RoutedToLoadingNodes {
                    index: index.clone()
                },
                ClusterEvent::DocumentsIndexed {
                    index: index.clone(),
                    count: 1
                },
                ClusterEvent::RoutedOffLoadingNodes {
                    index: index.clone()
                },
            ]
        );
        let polls = events
            .iter()
            .filter(|e| matches!(e, ClusterEvent::ShardsListed { .. }))
            .count();
        assert_eq!(polls, 3);

        let documents = cluster.documents("grch38_snv_indel").await;
        let doc = &documents["1-100-A-C"];
        assert!(doc["filters"].is_null());
        assert_eq!(doc["docId"], "1-100-A-C");
    }

    #[tokio::test]
    async fn large_index_transfers_in_background() {
        let engine = LocalEngine::new();
        let table = small_table(&engine).await;
        let cluster = InMemorySearchCluster::new().with_transfer_delay(100);
        let exporter = IndexExporter::new(Arc::new(cluster.clone()), true);

        let shards = exporter
            .export(&engine, &table, "large", SHARD_TRANSFER_WAIT_THRESHOLD, &[])
            .await
            .unwrap();
        assert_eq!(shards, 25);
        assert!(!cluster
            .events()
            .await
            .iter()
            .any(|e| matches!(e, ClusterEvent::ShardsListed { .. })));
    }

    #[tokio::test]
    async fn without_temp_nodes_no_route_to_loading() {
        let engine = LocalEngine::new();
        let table = small_table(&engine).await;
        let cluster = InMemorySearchCluster::new();
        let exporter = IndexExporter::new(Arc::new(cluster.clone()), false)
            .with_polling(Duration::from_millis(1), 3);

        exporter.export(&engine, &table, "plain", 1, &[]).await.unwrap();
        assert!(!cluster
            .events()
            .await
            .iter()
            .any(|e| matches!(e, ClusterEvent::RoutedToLoadingNodes { .. })));
    }

    #[tokio::test]
    async fn leftover_index_is_replaced() {
        let engine = LocalEngine::new();
        let table = small_table(&engine).await;
        let cluster = InMemorySearchCluster::new();
        cluster
            .create_index("retried", &crate::search::IndexSettings::default())
            .await
            .unwrap();
        cluster
            .bulk_index(
                "retried",
                vec![("stale".to_string(), serde_json::json!({"docId": "stale"}))],
            )
            .await
            .unwrap();
        let exporter = IndexExporter::new(Arc::new(cluster.clone()), false)
            .with_polling(Duration::from_millis(1), 3);

        exporter.export(&engine, &table, "retried", 1, &[]).await.unwrap();

        let ids: Vec<String> = cluster.documents("retried").await.into_keys().collect();
        assert_eq!(ids, vec!["1-100-A-C".to_string()]);
        assert!(cluster.events().await.contains(&ClusterEvent::IndexDeleted {
            index: "retried".to_string()
        }));
    }

    #[tokio::test]
    async fn stuck_transfer_times_out() {
        let cluster = InMemorySearchCluster::new().with_transfer_delay(50);
        cluster
            .create_index("stuck", &crate::search::IndexSettings::default())
            .await
            .unwrap();
        cluster.route_index_off_temp_nodes("stuck").await.unwrap();

        let err = wait_for_shard_transfer(&cluster, "stuck", Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert_eq!(err.kind, SearchErrorKind::ShardTransferTimeout);
    }
}
