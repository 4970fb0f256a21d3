//! Compensation engine.
//!
//! When a write on one store exhausts its retries, the other side (or the
//! resource server) is pushed back toward agreement by exactly one corrective
//! action chosen from a fixed table keyed on entity kind, operation and the
//! side that failed.
//!
//! Every action runs on a detached task under its own retry-policy execution.
//! The outcome is terminal either way:
//!
//! - success is logged at `info` and counted as repaired;
//! - failure is logged at `error` with an `INCONSISTENCY DETECTED` marker and
//!   counted as irreparable. There is no further automatic repair.

use onboard_client::{AdminToken, Document, EntityKind, Operation, StoreError, StoreTarget};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::adapter::resolve_resource_server;
use crate::backends::Backends;
use crate::error::OnboardError;
use crate::metrics::RepairMetrics;
use crate::request::MutationRequest;
use crate::retry::RetryPolicy;

/// Corrective action against the side that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// A central create failed: delete the entity from local.
    DeleteLocal,
    /// A central update failed: overwrite local with the central version.
    RestoreLocalFromCentral,
    /// A central delete failed: re-create the entity on local from central.
    RecreateLocalFromCentral,
    /// A local delete failed after the adapter was deregistered: register it again.
    RecreateAdapter,
    /// Adapter registration failed: delete the item from local, then from central.
    RollbackItem,
}

impl Compensation {
    /// Short human readable description for logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Compensation::DeleteLocal => "delete from local catalogue",
            Compensation::RestoreLocalFromCentral => "restore local copy from central catalogue",
            Compensation::RecreateLocalFromCentral => "re-create local copy from central catalogue",
            Compensation::RecreateAdapter => "re-register ingestion adapter",
            Compensation::RollbackItem => "delete item from local and central catalogues",
        }
    }
}

/// The operation-to-compensation table.
///
/// `failed` is the side whose write gave up. Kinds share the same recipes; the
/// kind only changes the endpoint and the identifier field.
pub fn recipe(kind: EntityKind, operation: Operation, failed: StoreTarget) -> Option<Compensation> {
    match (failed, operation) {
        (StoreTarget::Central, Operation::Create) => Some(Compensation::DeleteLocal),
        (StoreTarget::Central, Operation::Update) => Some(Compensation::RestoreLocalFromCentral),
        (StoreTarget::Central, Operation::Delete) => Some(Compensation::RecreateLocalFromCentral),
        (StoreTarget::Local, Operation::Delete) if kind == EntityKind::Item => {
            Some(Compensation::RecreateAdapter)
        }
        _ => None,
    }
}

/// A planned corrective action, closed over everything it needs to run.
#[derive(Clone)]
pub struct CompensationTask {
    /// Entity kind of the failed write.
    pub kind: EntityKind,
    /// Operation of the failed write.
    pub operation: Operation,
    /// Side whose write gave up.
    pub failed: StoreTarget,
    /// Action to take.
    pub action: Compensation,
    /// Identifier of the affected entity.
    pub id: Option<String>,
    /// Path segment the entity lives under.
    pub path: Option<String>,
    /// Caller's token, for local and resource server calls.
    pub token: String,
    /// Admin token already minted by the failed central call.
    pub admin_token: Option<AdminToken>,
}

impl CompensationTask {
    /// Plan the compensation for a failed write, if the table has one.
    pub fn plan(
        kind: EntityKind,
        operation: Operation,
        failed: StoreTarget,
        request: &MutationRequest,
        admin_token: Option<AdminToken>,
    ) -> Option<Self> {
        let action = recipe(kind, operation, failed)?;
        Some(Self {
            kind,
            operation,
            failed,
            action,
            id: request.identifier(kind),
            path: request.path.clone(),
            token: request.token.clone(),
            admin_token,
        })
    }

    /// Full rollback of an item whose adapter could not be registered.
    pub fn rollback_item(id: &str, token: &str) -> Self {
        Self {
            kind: EntityKind::Item,
            operation: Operation::Create,
            failed: StoreTarget::Local,
            action: Compensation::RollbackItem,
            id: Some(id.to_string()),
            path: None,
            token: token.to_string(),
            admin_token: None,
        }
    }
}

impl fmt::Debug for CompensationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensationTask")
            .field("kind", &self.kind)
            .field("operation", &self.operation)
            .field("failed", &self.failed)
            .field("action", &self.action)
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Runs compensations, detached from the caller that triggered them.
#[derive(Clone)]
pub struct CompensationEngine {
    backends: Backends,
    policy: Arc<RetryPolicy>,
    metrics: Arc<RepairMetrics>,
}

impl CompensationEngine {
    /// Create an engine sharing the given collaborators, policy and counters.
    pub fn new(backends: Backends, policy: Arc<RetryPolicy>, metrics: Arc<RepairMetrics>) -> Self {
        Self {
            backends,
            policy,
            metrics,
        }
    }

    /// Repair counters.
    pub fn metrics(&self) -> &Arc<RepairMetrics> {
        &self.metrics
    }

    /// Fire and forget: run `task` on its own task and return at once.
    pub fn dispatch(&self, task: CompensationTask) {
        self.metrics.record_dispatched();
        tracing::warn!(
            kind = %task.kind,
            operation = %task.operation,
            failed = %task.failed,
            id = ?task.id,
            action = task.action.describe(),
            "dispatching compensation"
        );
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(task).await;
        });
    }

    /// Run `task` to its terminal outcome. Returns whether the stores were repaired.
    pub async fn run(&self, task: CompensationTask) -> bool {
        match self.apply(&task).await {
            Ok(()) => {
                tracing::info!(
                    kind = %task.kind,
                    operation = %task.operation,
                    id = ?task.id,
                    action = task.action.describe(),
                    "compensation applied, stores reconciled"
                );
                self.metrics.record_repaired();
                true
            }
            Err(error) => {
                tracing::error!(
                    kind = %task.kind,
                    operation = %task.operation,
                    failed = %task.failed,
                    id = ?task.id,
                    action = task.action.describe(),
                    error = %error,
                    "INCONSISTENCY DETECTED: compensation failed, manual intervention required"
                );
                self.metrics.record_irreparable();
                false
            }
        }
    }

    async fn apply(&self, task: &CompensationTask) -> Result<(), OnboardError> {
        let id = task
            .id
            .as_deref()
            .ok_or(OnboardError::MissingIdentifier { kind: task.kind })?;

        match task.action {
            Compensation::DeleteLocal => {
                self.delete_local(task.kind, id, task.path.as_deref(), &task.token)
                    .await
            }
            Compensation::RestoreLocalFromCentral => {
                self.copy_from_central(task, id, Operation::Update).await
            }
            Compensation::RecreateLocalFromCentral => {
                self.copy_from_central(task, id, Operation::Create).await
            }
            Compensation::RecreateAdapter => self.recreate_adapter(id, &task.token).await,
            Compensation::RollbackItem => self.rollback_item(id, &task.token).await,
        }
    }

    async fn delete_local(
        &self,
        kind: EntityKind,
        id: &str,
        path: Option<&str>,
        token: &str,
    ) -> Result<(), OnboardError> {
        let local = self.backends.local.as_ref();
        self.policy
            .execute_with_metrics(&self.metrics, move || local.delete(kind, id, path, token))
            .await
            .into_result()?;
        Ok(())
    }

    async fn copy_from_central(
        &self,
        task: &CompensationTask,
        id: &str,
        write: Operation,
    ) -> Result<(), OnboardError> {
        let admin_token = match &task.admin_token {
            Some(token) => token.clone(),
            None => self.backends.tokens.mint().await?,
        };
        let admin = admin_token.as_str();
        let token = task.token.as_str();
        let kind = task.kind;
        let central = self.backends.central.as_ref();
        let local = self.backends.local.as_ref();

        self.policy
            .execute_with_metrics(&self.metrics, move || async move {
                let fetched = central.get(kind, id, admin).await?;
                let entity = restorable_entity(kind, id, &fetched).ok_or_else(|| StoreError::Decode {
                    url: format!("central/{kind}?id={id}"),
                    msg: "response carries no entity".to_string(),
                })?;
                match write {
                    Operation::Create => local.create(kind, &entity, token).await,
                    _ => local.update(kind, &entity, token).await,
                }
            })
            .await
            .into_result()?;
        Ok(())
    }

    async fn recreate_adapter(&self, id: &str, token: &str) -> Result<(), OnboardError> {
        let url = resolve_resource_server(self.backends.local.as_ref(), id, token).await?;
        let url = url.as_str();
        let rs = self.backends.resource_server.as_ref();
        self.policy
            .execute_with_metrics(&self.metrics, move || rs.register(url, id, token))
            .await
            .into_result()?;
        Ok(())
    }

    async fn rollback_item(&self, id: &str, token: &str) -> Result<(), OnboardError> {
        self.delete_local(EntityKind::Item, id, None, token).await?;

        let admin_token = self.backends.tokens.mint().await?;
        let admin = admin_token.as_str();
        let central = self.backends.central.as_ref();
        self.policy
            .execute_with_metrics(&self.metrics, move || {
                central.delete(EntityKind::Item, id, None, admin)
            })
            .await
            .into_result()?;
        Ok(())
    }
}

/// First entity of a catalogue read response.
///
/// Accepts the `{"results": [entity]}` envelope, a bare `results` object, or the
/// entity itself.
pub(crate) fn first_result(response: &Document) -> Option<Document> {
    match response.get("results") {
        Some(Value::Array(items)) => items.first().and_then(Value::as_object).cloned(),
        Some(Value::Object(entity)) => Some(entity.clone()),
        Some(_) => None,
        None if response.contains_key("id") => Some(response.clone()),
        None => None,
    }
}

/// Entity fetched from central, ready to be written back to local.
fn restorable_entity(kind: EntityKind, id: &str, response: &Document) -> Option<Document> {
    let mut entity = first_result(response)?;
    entity
        .entry(kind.id_key().to_string())
        .or_insert_with(|| Value::String(id.to_string()));
    Some(entity)
}
