//! Ingestion adapter orchestration.
//!
//! The resource server that owns an item is found through a relationship lookup
//! on the local catalogue. The lookup is not retried; the register/deregister
//! call that follows is.

use onboard_client::{Document, StoreClient, StoreError};
use serde_json::Value;
use std::sync::Arc;

use crate::backends::Backends;
use crate::compensation::{CompensationEngine, CompensationTask};
use crate::error::OnboardError;
use crate::metrics::RepairMetrics;
use crate::retry::RetryPolicy;

/// Relation linking an item to the resource server that serves it.
pub const RESOURCE_SERVER_RELATION: &str = "resourceServer";
/// Field of the related resource server holding its registration URL.
pub const REGISTRATION_URL_FIELD: &str = "resourceServerRegURL";

/// Resolve the registration URL of the resource server owning `item_id`.
///
/// A failed lookup is fatal for the calling operation.
pub async fn resolve_resource_server(
    local: &dyn StoreClient,
    item_id: &str,
    token: &str,
) -> Result<String, OnboardError> {
    let related = local
        .get_related(item_id, RESOURCE_SERVER_RELATION, &[REGISTRATION_URL_FIELD], token)
        .await
        .map_err(OnboardError::from_terminal)?;

    registration_url(&related).ok_or_else(|| {
        OnboardError::Internal(format!(
            "no {REGISTRATION_URL_FIELD} related to item {item_id}"
        ))
    })
}

fn registration_url(related: &Document) -> Option<String> {
    related
        .get(REGISTRATION_URL_FIELD)
        .or_else(|| {
            related
                .get("results")
                .and_then(|r| r.get(0))
                .and_then(|r| r.get(REGISTRATION_URL_FIELD))
        })
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}

/// Connect timeouts pass through, everything else is an internal error.
fn adapter_error(error: StoreError) -> OnboardError {
    match error {
        StoreError::Timeout { url } => OnboardError::ConnectTimeout { url },
        other => OnboardError::Internal(other.to_string()),
    }
}

/// Registers and deregisters ingestion adapters on resource servers.
#[derive(Clone)]
pub struct AdapterOrchestrator {
    backends: Backends,
    policy: Arc<RetryPolicy>,
    metrics: Arc<RepairMetrics>,
    compensations: CompensationEngine,
}

impl AdapterOrchestrator {
    /// Create an orchestrator sharing the given collaborators and compensation engine.
    pub fn new(
        backends: Backends,
        policy: Arc<RetryPolicy>,
        compensations: CompensationEngine,
    ) -> Self {
        let metrics = compensations.metrics().clone();
        Self {
            backends,
            policy,
            metrics,
            compensations,
        }
    }

    /// Start ingestion for `item_id`.
    ///
    /// If registration gives up, the item is rolled back from both catalogues
    /// on a detached task.
    pub async fn create_adapter(&self, item_id: &str, token: &str) -> Result<Document, OnboardError> {
        let url = resolve_resource_server(self.backends.local.as_ref(), item_id, token).await?;
        tracing::info!(item_id, resource_server = %url, "registering adapter");

        let rs = self.backends.resource_server.as_ref();
        let url = url.as_str();
        let outcome = self
            .policy
            .execute_with_metrics(&self.metrics, move || rs.register(url, item_id, token))
            .await;

        let error = match outcome.into_result() {
            Ok(doc) => return Ok(doc),
            Err(e) => e,
        };
        self.metrics.record_primary_failure();
        tracing::error!(item_id, resource_server = %url, error = %error, "adapter registration failed");
        self.compensations
            .dispatch(CompensationTask::rollback_item(item_id, token));
        Err(adapter_error(error))
    }

    /// Stop ingestion for `item_id`. Failures are not compensated.
    pub async fn delete_adapter(&self, item_id: &str, token: &str) -> Result<Document, OnboardError> {
        let url = resolve_resource_server(self.backends.local.as_ref(), item_id, token).await?;
        tracing::info!(item_id, resource_server = %url, "deregistering adapter");

        let rs = self.backends.resource_server.as_ref();
        let url = url.as_str();
        self.policy
            .execute_with_metrics(&self.metrics, move || rs.deregister(url, item_id, token))
            .await
            .into_result()
            .map_err(|error| {
                self.metrics.record_primary_failure();
                tracing::error!(item_id, resource_server = %url, error = %error, "adapter deregistration failed");
                adapter_error(error)
            })
    }
}
