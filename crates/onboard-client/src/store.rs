//! Catalogue store client.
//!
//! One [`StoreClient`] talks to exactly one physical catalogue (local or central).
//! The dispatcher holds one instance per side, built once at startup and shared.

use async_trait::async_trait;
use std::time::Duration;

use crate::entity::{Document, EntityKind};
use crate::error::Result;
use crate::http::{build_client, classify, read_document};

/// Typed create/read/update/delete capability against one catalogue.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Insert `doc` as a new entity of `kind`.
    async fn create(&self, kind: EntityKind, doc: &Document, token: &str) -> Result<Document>;

    /// Overwrite the entity described by `doc`.
    async fn update(&self, kind: EntityKind, doc: &Document, token: &str) -> Result<Document>;

    /// Remove entity `id`, addressed under `path` when the kind uses one.
    async fn delete(
        &self,
        kind: EntityKind,
        id: &str,
        path: Option<&str>,
        token: &str,
    ) -> Result<Document>;

    /// Fetch entity `id`.
    async fn get(&self, kind: EntityKind, id: &str, token: &str) -> Result<Document>;

    /// Fetch the entity related to `id` through `relation`, projected onto `filters`.
    async fn get_related(
        &self,
        id: &str,
        relation: &str,
        filters: &[&str],
        token: &str,
    ) -> Result<Document>;
}

/// REST implementation of [`StoreClient`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStoreClient {
    /// Create a client for the catalogue rooted at `base_url`.
    pub fn new(base_url: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(connect_timeout, request_timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Root URL of the catalogue.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.segment())
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn create(&self, kind: EntityKind, doc: &Document, token: &str) -> Result<Document> {
        let url = self.collection_url(kind);
        tracing::debug!(%url, %kind, "catalogue create");
        let response = self
            .client
            .post(&url)
            .header("token", token)
            .json(doc)
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        read_document(&url, response).await
    }

    async fn update(&self, kind: EntityKind, doc: &Document, token: &str) -> Result<Document> {
        let url = self.collection_url(kind);
        tracing::debug!(%url, %kind, "catalogue update");
        let response = self
            .client
            .put(&url)
            .header("token", token)
            .json(doc)
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        read_document(&url, response).await
    }

    async fn delete(
        &self,
        kind: EntityKind,
        id: &str,
        path: Option<&str>,
        token: &str,
    ) -> Result<Document> {
        let url = match path {
            Some(p) => format!("{}/{}", self.collection_url(kind), p.trim_matches('/')),
            None => self.collection_url(kind),
        };
        tracing::debug!(%url, %kind, id, "catalogue delete");
        let response = self
            .client
            .delete(&url)
            .header("token", token)
            .query(&[("id", id)])
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        read_document(&url, response).await
    }

    async fn get(&self, kind: EntityKind, id: &str, token: &str) -> Result<Document> {
        let url = self.collection_url(kind);
        tracing::debug!(%url, %kind, id, "catalogue get");
        let response = self
            .client
            .get(&url)
            .header("token", token)
            .query(&[("id", id)])
            .send()
            .await
            .map_err(|e| classify(&url, e))?;
        read_document(&url, response).await
    }

    async fn get_related(
        &self,
        id: &str,
        relation: &str,
        filters: &[&str],
        token: &str,
    ) -> Result<Document> {
        let url = format!("{}/relationship", self.base_url);
        tracing::debug!(%url, id, relation, "catalogue relationship lookup");
        let mut request = self
            .client
            .get(&url)
            .header("token", token)
            .query(&[("id", id), ("rel", relation)]);
        if !filters.is_empty() {
            let filter = format!("[{}]", filters.join(","));
            request = request.query(&[("filter", filter.as_str())]);
        }
        let response = request.send().await.map_err(|e| classify(&url, e))?;
        read_document(&url, response).await
    }
}
