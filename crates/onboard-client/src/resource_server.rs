//! Ingestion adapter registration on resource servers.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::entity::Document;
use crate::error::Result;
use crate::http::{build_client, classify, read_document};

const INGESTION_PATH: &str = "/ngsi-ld/v1/ingestion";

/// Register and deregister ingestion adapters for catalogue items.
#[async_trait]
pub trait ResourceServerClient: Send + Sync {
    /// Start ingestion for item `id` on the resource server at `url`.
    async fn register(&self, url: &str, id: &str, token: &str) -> Result<Document>;

    /// Stop ingestion for item `id` on the resource server at `url`.
    async fn deregister(&self, url: &str, id: &str, token: &str) -> Result<Document>;
}

/// Normalise a `resourceServerRegURL` value into a base URL.
///
/// Catalogue entries usually carry a bare host name.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// REST implementation of [`ResourceServerClient`].
#[derive(Debug, Clone)]
pub struct HttpResourceServerClient {
    client: reqwest::Client,
}

impl HttpResourceServerClient {
    /// Create a client shared by every resource server.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(connect_timeout, request_timeout)?,
        })
    }
}

#[async_trait]
impl ResourceServerClient for HttpResourceServerClient {
    async fn register(&self, url: &str, id: &str, token: &str) -> Result<Document> {
        let endpoint = format!("{}{}", normalize_base_url(url), INGESTION_PATH);
        tracing::debug!(%endpoint, id, "registering adapter");
        let response = self
            .client
            .post(&endpoint)
            .header("token", token)
            .json(&json!({ "entities": [{ "id": id }] }))
            .send()
            .await
            .map_err(|e| classify(&endpoint, e))?;
        read_document(&endpoint, response).await
    }

    async fn deregister(&self, url: &str, id: &str, token: &str) -> Result<Document> {
        let endpoint = format!("{}{}", normalize_base_url(url), INGESTION_PATH);
        tracing::debug!(%endpoint, id, "deregistering adapter");
        let response = self
            .client
            .delete(&endpoint)
            .header("token", token)
            .query(&[("id", id)])
            .send()
            .await
            .map_err(|e| classify(&endpoint, e))?;
        read_document(&endpoint, response).await
    }
}
