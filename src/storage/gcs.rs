//! Google Cloud Storage backend (JSON API).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{StorageBackend, StorageError};

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Split `gs://bucket/object/name` into `("bucket", "object/name")`.
pub fn parse_gcs_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("gs://")?;
    let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return None;
    }
    Some((bucket, object.trim_end_matches('/')))
}

/// GCS client authenticated with an OAuth bearer token.
pub struct GcsStorage {
    client: Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl GcsStorage {
    pub fn new(token: &str) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, token)
    }

    pub fn with_endpoint(endpoint: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn split<'a>(&self, path: &'a str) -> Result<(&'a str, &'a str), StorageError> {
        parse_gcs_path(path).ok_or_else(|| StorageError::unsupported_scheme(path))
    }

    async fn get(&self, path: &str, url: String) -> Result<reqwest::Response, StorageError> {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|e| StorageError::network(path, e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for GcsStorage {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (bucket, object) = self.split(path)?;
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            bucket,
            urlencoding::encode(object)
        );
        let resp = self.get(path, url).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let text = resp.text().await.unwrap_or_default();
                Err(StorageError::http(path, status.as_u16(), text))
            }
        }
    }

    async fn dir_exists(&self, path: &str) -> Result<bool, StorageError> {
        let (bucket, object) = self.split(path)?;
        let url = format!(
            "{}/storage/v1/b/{}/o?prefix={}&maxResults=1",
            self.endpoint,
            bucket,
            urlencoding::encode(&format!("{}/", object))
        );
        let resp = self.get(path, url).await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StorageError::http(path, status.as_u16(), text));
        }
        let listing: ObjectList = resp
            .json()
            .await
            .map_err(|e| StorageError::network(path, e.to_string()))?;
        Ok(!listing.items.is_empty())
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let (bucket, object) = self.split(path)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            bucket,
            urlencoding::encode(object)
        );
        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::network(path, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StorageError::http(path, status.as_u16(), text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_object() {
        assert_eq!(
            parse_gcs_path("gs://seqr-datasets/v03/GRCh38/annotations.ht/_SUCCESS"),
            Some(("seqr-datasets", "v03/GRCh38/annotations.ht/_SUCCESS"))
        );
        assert_eq!(parse_gcs_path("gs://bucket"), Some(("bucket", "")));
        assert_eq!(parse_gcs_path("gs://bucket/dir/"), Some(("bucket", "dir")));
        assert_eq!(parse_gcs_path("gs:///object"), None);
        assert_eq!(parse_gcs_path("/local/path"), None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let storage = GcsStorage::with_endpoint("http://127.0.0.1:9", "token");
        let err = storage
            .exists("gs://bucket/object")
            .await
            .expect_err("nothing listens on the discard port");
        assert!(err.is_transient());
    }
}
