//! In-memory search cluster (non-persistent).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{
    IndexSettings, SearchCluster, SearchError, ShardPlacement, LOADING_NODES_PATTERN,
};

/// Calls observed by the in-memory cluster, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    IndexCreated { index: String, num_shards: u32 },
    IndexDeleted { index: String },
    RoutedToLoadingNodes { index: String },
    RoutedOffLoadingNodes { index: String },
    SettingsUpdated { index: String },
    DocumentsIndexed { index: String, count: usize },
    ShardsListed { index: String },
    SnapshotCreated { repository: String, snapshot: String },
}

#[derive(Debug, Default)]
struct StoredIndex {
    settings: IndexSettings,
    routing_require: String,
    documents: BTreeMap<String, Value>,
    /// Shard listings left before data reports as off the loading nodes
    pending_transfer_polls: u32,
}

#[derive(Clone, Default)]
pub struct InMemorySearchCluster {
    indices: Arc<RwLock<HashMap<String, StoredIndex>>>,
    events: Arc<RwLock<Vec<ClusterEvent>>>,
    repositories: Arc<RwLock<HashMap<String, Vec<String>>>>,
    transfer_polls: u32,
}

impl InMemorySearchCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report shards on loading nodes for `polls` listings after routing off them.
    pub fn with_transfer_delay(mut self, polls: u32) -> Self {
        self.transfer_polls = polls;
        self
    }

    pub async fn add_repository(&self, repository: &str) {
        self.repositories
            .write()
            .await
            .entry(repository.to_string())
            .or_default();
    }

    pub async fn events(&self) -> Vec<ClusterEvent> {
        self.events.read().await.clone()
    }

    pub async fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|stored| stored.documents.clone())
            .unwrap_or_default()
    }

    async fn record(&self, event: ClusterEvent) {
        self.events.write().await.push(event);
    }
}

#[async_trait]
impl SearchCluster for InMemorySearchCluster {
    async fn index_names(&self) -> Result<Vec<String>, SearchError> {
        let mut names: Vec<String> = self.indices.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_repository(&self, repository: &str) -> Result<Value, SearchError> {
        match self.repositories.read().await.get(repository) {
            Some(_) => Ok(json!({ repository: { "type": "memory", "settings": {} } })),
            None => Err(SearchError::http(
                404,
                format!("[{}] missing", repository),
            )),
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), SearchError> {
        {
            let mut indices = self.indices.write().await;
            if indices.contains_key(index) {
                return Err(SearchError::http(
                    400,
                    format!("resource_already_exists_exception: index [{}]", index),
                ));
            }
            indices.insert(
                index.to_string(),
                StoredIndex {
                    settings: settings.clone(),
                    ..StoredIndex::default()
                },
            );
        }
        self.record(ClusterEvent::IndexCreated {
            index: index.to_string(),
            num_shards: settings.num_shards,
        })
        .await;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        if self.indices.write().await.remove(index).is_none() {
            return Err(SearchError::index_not_found(index));
        }
        self.record(ClusterEvent::IndexDeleted {
            index: index.to_string(),
        })
        .await;
        Ok(())
    }

    async fn update_index_settings(&self, index: &str, settings: Value) -> Result<(), SearchError> {
        let event = {
            let mut indices = self.indices.write().await;
            let stored = indices
                .get_mut(index)
                .ok_or_else(|| SearchError::index_not_found(index))?;
            match settings["index.routing.allocation.require._name"].as_str() {
                Some(LOADING_NODES_PATTERN) => {
                    stored.routing_require = LOADING_NODES_PATTERN.to_string();
                    ClusterEvent::RoutedToLoadingNodes {
                        index: index.to_string(),
                    }
                }
                Some("") if settings["index.routing.allocation.exclude._name"]
                    == LOADING_NODES_PATTERN =>
                {
                    stored.routing_require.clear();
                    stored.pending_transfer_polls = self.transfer_polls;
                    ClusterEvent::RoutedOffLoadingNodes {
                        index: index.to_string(),
                    }
                }
                _ => ClusterEvent::SettingsUpdated {
                    index: index.to_string(),
                },
            }
        };
        self.record(event).await;
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: Vec<(String, Value)>,
    ) -> Result<(), SearchError> {
        let count = documents.len();
        {
            let mut indices = self.indices.write().await;
            let stored = indices
                .get_mut(index)
                .ok_or_else(|| SearchError::index_not_found(index))?;
            stored.documents.extend(documents);
        }
        self.record(ClusterEvent::DocumentsIndexed {
            index: index.to_string(),
            count,
        })
        .await;
        Ok(())
    }

    async fn shard_placements(&self, index: &str) -> Result<Vec<ShardPlacement>, SearchError> {
        let placements = {
            let mut indices = self.indices.write().await;
            let stored = indices
                .get_mut(index)
                .ok_or_else(|| SearchError::index_not_found(index))?;
            let on_loading = !stored.routing_require.is_empty() || stored.pending_transfer_polls > 0;
            stored.pending_transfer_polls = stored.pending_transfer_polls.saturating_sub(1);
            (0..stored.settings.num_shards)
                .map(|shard| ShardPlacement {
                    index: index.to_string(),
                    shard: shard.to_string(),
                    prirep: "p".to_string(),
                    state: "STARTED".to_string(),
                    node: Some(if on_loading {
                        format!("elasticsearch-es-data-loading-{}", shard)
                    } else {
                        format!("elasticsearch-es-data-{}", shard)
                    }),
                })
                .collect()
        };
        self.record(ClusterEvent::ShardsListed {
            index: index.to_string(),
        })
        .await;
        Ok(placements)
    }

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        indices: &[String],
        wait_for_completion: bool,
    ) -> Result<Value, SearchError> {
        {
            let mut repositories = self.repositories.write().await;
            let snapshots = repositories
                .get_mut(repository)
                .ok_or_else(|| SearchError::http(404, format!("[{}] missing", repository)))?;
            snapshots.push(snapshot.to_string());
        }
        self.record(ClusterEvent::SnapshotCreated {
            repository: repository.to_string(),
            snapshot: snapshot.to_string(),
        })
        .await;
        let state = if wait_for_completion { "SUCCESS" } else { "IN_PROGRESS" };
        Ok(json!({
            "snapshot": { "snapshot": snapshot, "indices": indices, "state": state }
        }))
    }

    async fn snapshot_status(&self, repository: &str) -> Result<Value, SearchError> {
        let repositories = self.repositories.read().await;
        let snapshots = repositories
            .get(repository)
            .ok_or_else(|| SearchError::http(404, format!("[{}] missing", repository)))?;
        Ok(json!({ "snapshots": snapshots }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routing_moves_shards_between_node_pools() {
        let cluster = InMemorySearchCluster::new().with_transfer_delay(1);
        cluster
            .create_index("grch38", &IndexSettings { num_shards: 2, ..IndexSettings::default() })
            .await
            .unwrap();

        cluster.route_index_to_temp_nodes("grch38").await.unwrap();
        let placements = cluster.shard_placements("grch38").await.unwrap();
        assert!(placements.iter().all(|p| p.is_on_loading_node()));

        cluster.route_index_off_temp_nodes("grch38").await.unwrap();
        let still_moving = cluster.shard_placements("grch38").await.unwrap();
        assert!(still_moving.iter().all(|p| p.is_on_loading_node()));
        let moved = cluster.shard_placements("grch38").await.unwrap();
        assert!(moved.iter().all(|p| !p.is_on_loading_node()));
    }

    #[tokio::test]
    async fn duplicate_index_is_rejected() {
        let cluster = InMemorySearchCluster::new();
        let settings = IndexSettings::default();
        cluster.create_index("data", &settings).await.unwrap();
        let err = cluster.create_index("data", &settings).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn deleted_index_can_be_recreated() {
        let cluster = InMemorySearchCluster::new();
        let settings = IndexSettings::default();
        cluster.create_index("data", &settings).await.unwrap();
        cluster
            .bulk_index("data", vec![("1".to_string(), json!({"docId": "1"}))])
            .await
            .unwrap();

        cluster.delete_index("data").await.unwrap();
        assert!(!cluster.index_exists("data").await.unwrap());
        assert!(cluster.delete_index("data").await.is_err());

        cluster.create_index("data", &settings).await.unwrap();
        assert!(cluster.documents("data").await.is_empty());
    }
}
