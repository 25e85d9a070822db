//! Elasticsearch REST client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{IndexSettings, SearchCluster, SearchError, ShardPlacement};

/// Where and how to reach the cluster.
#[derive(Debug, Clone)]
pub struct SearchConnection {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

impl Default for SearchConnection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            username: None,
            password: None,
            use_tls: false,
        }
    }
}

/// Elasticsearch client for index, shard and snapshot operations.
pub struct ElasticsearchClient {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticsearchClient {
    pub fn new(connection: &SearchConnection) -> Result<Self, SearchError> {
        let scheme = if connection.use_tls { "https" } else { "http" };
        let raw = format!("{}://{}:{}", scheme, connection.host, connection.port);
        let base_url = Url::parse(&raw)
            .map_err(|e| SearchError::parse_error(format!("invalid cluster address {}: {}", raw, e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            username: connection.username.clone(),
            password: connection.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => request.basic_auth(user, Some(password)),
            _ => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, SearchError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SearchError::network_error(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SearchError::network_error(e.to_string()))?;

        if !status.is_success() {
            return Err(SearchError::http(status.as_u16(), text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SearchError::parse_error(e.to_string()))
    }
}

#[async_trait]
impl SearchCluster for ElasticsearchClient {
    async fn index_names(&self) -> Result<Vec<String>, SearchError> {
        let value = self
            .send(self.client.get(self.url("_cat/indices?format=json&h=index")))
            .await?;
        let rows: Vec<CatIndex> =
            serde_json::from_value(value).map_err(|e| SearchError::parse_error(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.index).collect())
    }

    async fn get_repository(&self, repository: &str) -> Result<Value, SearchError> {
        self.send(self.client.get(self.url(&format!("_snapshot/{}", repository))))
            .await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let resp = self
            .authorize(self.client.head(self.url(index)))
            .send()
            .await
            .map_err(|e| SearchError::network_error(e.to_string()))?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchError::http(status, format!("HEAD {}", index))),
        }
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<(), SearchError> {
        tracing::info!(
            "Creating index {} with {} shards",
            index,
            settings.num_shards
        );
        self.send(self.client.put(self.url(index)).json(&settings.to_body()))
            .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        tracing::info!("Deleting index {}", index);
        self.send(self.client.delete(self.url(index))).await?;
        Ok(())
    }

    async fn update_index_settings(&self, index: &str, settings: Value) -> Result<(), SearchError> {
        self.send(
            self.client
                .put(self.url(&format!("{}/_settings", index)))
                .json(&settings),
        )
        .await?;
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: Vec<(String, Value)>,
    ) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for (id, document) in &documents {
            body.push_str(&json!({ "index": { "_index": index, "_id": id } }).to_string());
            body.push('\n');
            body.push_str(&document.to_string());
            body.push('\n');
        }

        let value = self
            .send(
                self.client
                    .post(self.url("_bulk"))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        let response: BulkResponse =
            serde_json::from_value(value).map_err(|e| SearchError::parse_error(e.to_string()))?;
        if response.errors {
            let failed = response
                .items
                .iter()
                .filter(|item| !item["index"]["error"].is_null())
                .count();
            return Err(SearchError::bulk_rejected(index, failed));
        }
        Ok(())
    }

    async fn shard_placements(&self, index: &str) -> Result<Vec<ShardPlacement>, SearchError> {
        let value = self
            .send(self.client.get(self.url(&format!("_cat/shards/{}?format=json", index))))
            .await?;
        serde_json::from_value(value).map_err(|e| SearchError::parse_error(e.to_string()))
    }

    async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        indices: &[String],
        wait_for_completion: bool,
    ) -> Result<Value, SearchError> {
        self.send(
            self.client
                .put(self.url(&format!(
                    "_snapshot/{}/{}?wait_for_completion={}",
                    repository, snapshot, wait_for_completion
                )))
                .json(&json!({ "indices": indices.join(",") })),
        )
        .await
    }

    async fn snapshot_status(&self, repository: &str) -> Result<Value, SearchError> {
        self.send(
            self.client
                .get(self.url(&format!("_snapshot/{}/_status", repository))),
        )
        .await
    }
}
