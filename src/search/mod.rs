//! Search index cluster interface.
//!
//! The cluster is an external collaborator: shard allocation, node roles and data
//! transfer happen inside it. This module only names the calls the pipeline makes.
//!
//! Implementations:
//! - `ElasticsearchClient`: HTTP client for a real cluster
//! - `InMemorySearchCluster`: non-persistent, for testing

mod client;
mod error;
mod memory;

pub use client::{ElasticsearchClient, SearchConnection};
pub use error::{classify_http_status, SearchError, SearchErrorKind};
pub use memory::{ClusterEvent, InMemorySearchCluster};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Node-name pattern of the temporary high-throughput loading nodes.
pub const LOADING_NODES_PATTERN: &str = "elasticsearch-es-data-loading*";

/// Per-document identifier field used for every export.
pub const DOCUMENT_ID_FIELD: &str = "docId";

/// Settings an index is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    pub num_shards: u32,
    pub num_replicas: u32,
    /// Field whose value becomes the document `_id`
    pub mapping_id_field: String,
    /// Fields stored but not indexed
    pub disabled_fields: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            num_shards: 1,
            num_replicas: 0,
            mapping_id_field: DOCUMENT_ID_FIELD.to_string(),
            disabled_fields: Vec::new(),
        }
    }
}

impl IndexSettings {
    /// Request body for index creation.
    pub fn to_body(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .disabled_fields
            .iter()
            .map(|field| (field.clone(), json!({ "type": "keyword", "index": false })))
            .collect();
        json!({
            "settings": {
                "index": {
                    "number_of_shards": self.num_shards,
                    "number_of_replicas": self.num_replicas,
                }
            },
            "mappings": {
                "_meta": { "mapping_id": self.mapping_id_field },
                "properties": properties,
            }
        })
    }
}

/// Parameters of a bulk table export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub index_name: String,
    pub num_shards: u32,
    pub mapping_id_field: String,
    /// Write null-valued fields explicitly instead of omitting them
    pub write_null_values: bool,
    pub disabled_fields: Vec<String>,
}

impl ExportRequest {
    pub fn new(index_name: &str, num_shards: u32, disabled_fields: Vec<String>) -> Self {
        Self {
            index_name: index_name.to_string(),
            num_shards,
            mapping_id_field: DOCUMENT_ID_FIELD.to_string(),
            write_null_values: true,
            disabled_fields,
        }
    }

    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            num_shards: self.num_shards,
            num_replicas: 0,
            mapping_id_field: self.mapping_id_field.clone(),
            disabled_fields: self.disabled_fields.clone(),
        }
    }
}

/// One row of `_cat/shards`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShardPlacement {
    pub index: String,
    pub shard: String,
    pub prirep: String,
    pub state: String,
    /// Node name; `"a -> b"` while relocating, absent while unassigned
    #[serde(default)]
    pub node: Option<String>,
}

impl ShardPlacement {
    pub fn is_on_loading_node(&self) -> bool {
        let prefix = LOADING_NODES_PATTERN.trim_end_matches('*');
        self.node
            .as_deref()
            .map(|node| node.contains(prefix))
            .unwrap_or(false)
    }
}

/// Search cluster trait - implemented by the HTTP client and the in-memory cluster.
#[async_trait]
pub trait SearchCluster: Send + Sync {
    async fn index_names(&self) -> Result<Vec<String>, SearchError>;

    async fn get_repository(&self, repository: &str) -> Result<Value, SearchError>;

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), SearchError>;

    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    async fn update_index_settings(&self, index: &str, settings: Value) -> Result<(), SearchError>;

    /// Index `(id, document)` pairs into an existing index.
    async fn bulk_index(
        &self,
        index: &str,
        documents: Vec<(String, Value)>,
    ) -> Result<(), SearchError>;

    async fn shard_placements(&self, index: &str) -> Result<Vec<ShardPlacement>, SearchError>;

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        indices: &[String],
        wait_for_completion: bool,
    ) -> Result<Value, SearchError>;

    async fn snapshot_status(&self, repository: &str) -> Result<Value, SearchError>;

    async fn route_index_to_temp_nodes(&self, index: &str) -> Result<(), SearchError> {
        self.update_index_settings(
            index,
            json!({
                "index.routing.allocation.require._name": LOADING_NODES_PATTERN,
                "index.routing.allocation.exclude._name": "",
            }),
        )
        .await
    }

    async fn route_index_off_temp_nodes(&self, index: &str) -> Result<(), SearchError> {
        self.update_index_settings(
            index,
            json!({
                "index.routing.allocation.require._name": "",
                "index.routing.allocation.exclude._name": LOADING_NODES_PATTERN,
            }),
        )
        .await
    }
}

/// Callback run by the exporter once the index exists and before any document lands.
#[async_trait]
pub trait IndexCreatedHook: Send + Sync {
    async fn on_index_created(
        &self,
        cluster: &dyn SearchCluster,
        index: &str,
    ) -> Result<(), SearchError>;
}
