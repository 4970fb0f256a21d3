//! Onboarding and offboarding sequences.
//!
//! An entity is written to the local catalogue first and mirrored to central
//! second. Items additionally get an ingestion adapter once both catalogues
//! hold them, and lose it before they are removed.

use onboard_client::{Document, EntityKind, Operation, StoreTarget};
use serde_json::Value;

use crate::compensation::{first_result, CompensationTask};
use crate::error::OnboardError;
use crate::request::MutationRequest;
use crate::service::CatalogueService;

/// Multi-step lifecycle built on the catalogue service.
#[derive(Clone)]
pub struct OnboardingWorkflow {
    service: CatalogueService,
}

impl OnboardingWorkflow {
    /// Workflow over `service`.
    pub fn new(service: CatalogueService) -> Self {
        Self { service }
    }

    /// The underlying catalogue service.
    pub fn service(&self) -> &CatalogueService {
        &self.service
    }

    /// Create `body` on local then central.
    ///
    /// When the body carries no identifier, the one assigned by the local
    /// catalogue is copied into the central write.
    pub async fn onboard(
        &self,
        kind: EntityKind,
        body: Document,
        path: Option<String>,
        token: &str,
    ) -> Result<Document, OnboardError> {
        let (created, _id) = self.create_both(kind, body, path, token).await?;
        Ok(created)
    }

    /// Same as `onboard`, also returning the identifier written to central.
    async fn create_both(
        &self,
        kind: EntityKind,
        body: Document,
        path: Option<String>,
        token: &str,
    ) -> Result<(Document, String), OnboardError> {
        let dispatcher = self.service.dispatcher();
        let mut request = MutationRequest::new(body, token);
        request.path = path;

        let created = dispatcher
            .execute_on(kind, Operation::Create, &request, StoreTarget::Local)
            .await?;

        let id = match request.identifier(kind) {
            Some(id) => id,
            None => {
                let id = first_result(&created)
                    .and_then(|entity| kind.identifier_of(&entity))
                    .ok_or(OnboardError::MissingIdentifier { kind })?;
                request.body.insert(kind.id_key().to_string(), Value::String(id.clone()));
                id
            }
        };

        tracing::info!(%kind, %id, "created on local, mirroring to central");
        let created = dispatcher
            .execute_on(kind, Operation::Create, &request, StoreTarget::Central)
            .await?;
        Ok((created, id))
    }

    /// Delete `id` from local then central.
    ///
    /// Items go through `offboard_item` so their adapter is removed first.
    pub async fn offboard(
        &self,
        kind: EntityKind,
        id: &str,
        path: Option<String>,
        token: &str,
    ) -> Result<Document, OnboardError> {
        if kind == EntityKind::Item {
            return self.offboard_item(id, token).await;
        }
        let mut request = MutationRequest::for_id(kind, id, token);
        request.path = path;
        self.delete_both(kind, &request, false).await
    }

    /// Create an item on both catalogues and register its adapter.
    ///
    /// A failed registration rolls the item back from both catalogues.
    pub async fn onboard_item(&self, body: Document, token: &str) -> Result<Document, OnboardError> {
        let (created, id) = self.create_both(EntityKind::Item, body, None, token).await?;
        self.service.create_adapter(&id, token).await?;
        Ok(created)
    }

    /// Deregister an item's adapter, then delete it from both catalogues.
    ///
    /// If the local delete fails after the adapter is gone, the adapter is
    /// registered again on a detached task.
    pub async fn offboard_item(&self, id: &str, token: &str) -> Result<Document, OnboardError> {
        self.service.delete_adapter(id, token).await?;
        let request = MutationRequest::for_id(EntityKind::Item, id, token);
        self.delete_both(EntityKind::Item, &request, true).await
    }

    /// Create an instance on both catalogues.
    pub async fn onboard_instance(&self, body: Document, path: Option<String>, token: &str) -> Result<Document, OnboardError> {
        self.onboard(EntityKind::Instance, body, path, token).await
    }

    /// Delete an instance from both catalogues.
    pub async fn offboard_instance(&self, id: &str, path: Option<String>, token: &str) -> Result<Document, OnboardError> {
        self.offboard(EntityKind::Instance, id, path, token).await
    }

    /// Create a domain on both catalogues.
    pub async fn onboard_domain(&self, body: Document, token: &str) -> Result<Document, OnboardError> {
        self.onboard(EntityKind::Domain, body, None, token).await
    }

    /// Delete a domain from both catalogues.
    pub async fn offboard_domain(&self, id: &str, token: &str) -> Result<Document, OnboardError> {
        self.offboard(EntityKind::Domain, id, None, token).await
    }

    /// Delete on local then central. `adapter_removed` marks an item whose
    /// adapter was deregistered earlier in the same workflow.
    async fn delete_both(
        &self,
        kind: EntityKind,
        request: &MutationRequest,
        adapter_removed: bool,
    ) -> Result<Document, OnboardError> {
        let dispatcher = self.service.dispatcher();
        if let Err(error) = dispatcher
            .execute_on(kind, Operation::Delete, request, StoreTarget::Local)
            .await
        {
            let task = adapter_removed
                .then(|| CompensationTask::plan(kind, Operation::Delete, StoreTarget::Local, request, None))
                .flatten();
            if let Some(task) = task {
                dispatcher.metrics().record_primary_failure();
                dispatcher.compensations().dispatch(task);
            }
            return Err(error);
        }

        dispatcher
            .execute_on(kind, Operation::Delete, request, StoreTarget::Central)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{doc, resource_server_relation, status, Harness, ADMIN_TOKEN, CALLER_TOKEN, RS_URL};
    use serde_json::json;

    fn workflow(h: &Harness) -> OnboardingWorkflow {
        OnboardingWorkflow::new(CatalogueService::new(
            h.backends.clone(),
            h.policy.clone(),
            h.metrics.clone(),
        ))
    }

    #[tokio::test]
    async fn test_onboard_item_writes_both_then_registers() {
        let h = Harness::new();
        h.local.push("get_related", Ok(resource_server_relation()));

        workflow(&h)
            .onboard_item(doc(json!({"id": "i1", "name": "aqm"})), CALLER_TOKEN)
            .await
            .unwrap();

        assert_eq!(h.local.calls_to("create")[0].token, CALLER_TOKEN);
        assert_eq!(h.central.calls_to("create")[0].token, ADMIN_TOKEN);
        let registers = h.rs.calls_to("register");
        assert_eq!(registers.len(), 1);
        assert_eq!(registers[0].id.as_deref(), Some("i1"));
        assert_eq!(registers[0].url.as_deref(), Some(RS_URL));
    }

    #[tokio::test]
    async fn test_onboard_takes_identifier_assigned_by_local() {
        let h = Harness::new();
        h.local.push("create", Ok(doc(json!({"results": [{"id": "generated-7"}]}))));

        workflow(&h)
            .onboard_domain(doc(json!({"name": "env"})), CALLER_TOKEN)
            .await
            .unwrap();

        let central = h.central.calls_to("create");
        assert_eq!(central[0].doc.as_ref().unwrap()["domainId"], "generated-7");
    }

    #[tokio::test]
    async fn test_onboard_without_any_identifier_stops_before_central() {
        let h = Harness::new();

        let err = workflow(&h)
            .onboard_domain(doc(json!({"name": "env"})), CALLER_TOKEN)
            .await
            .unwrap_err();

        assert_eq!(err, OnboardError::MissingIdentifier { kind: EntityKind::Domain });
        assert!(h.central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_onboard_local_failure_stops_everything() {
        let h = Harness::new();
        h.local.always("create", Err(status(400)));

        let err = workflow(&h)
            .onboard_item(doc(json!({"id": "i1"})), CALLER_TOKEN)
            .await
            .unwrap_err();

        assert_eq!(err, OnboardError::Store(status(400)));
        assert!(h.central.calls().is_empty());
        assert!(h.rs.calls().is_empty());
        assert_eq!(h.metrics.snapshot().compensations_dispatched, 0);
    }

    #[tokio::test]
    async fn test_onboard_central_failure_removes_local_copy() {
        let h = Harness::new();
        h.central.always("create", Err(status(500)));

        workflow(&h)
            .onboard_instance(doc(json!({"instanceId": "pune"})), Some("smartcity".to_string()), CALLER_TOKEN)
            .await
            .unwrap_err();

        h.settle().await;
        let deletes = h.local.calls_to("delete");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].id.as_deref(), Some("pune"));
        assert_eq!(deletes[0].path.as_deref(), Some("smartcity"));
        assert!(h.rs.calls().is_empty());
    }

    #[tokio::test]
    async fn test_offboard_item_deregisters_then_deletes_both() {
        let h = Harness::new();
        h.local.push("get_related", Ok(resource_server_relation()));

        workflow(&h).offboard_item("i1", CALLER_TOKEN).await.unwrap();

        assert_eq!(h.rs.calls_to("deregister").len(), 1);
        assert_eq!(h.local.calls_to("delete")[0].id.as_deref(), Some("i1"));
        assert_eq!(h.central.calls_to("delete")[0].id.as_deref(), Some("i1"));
    }

    #[tokio::test]
    async fn test_offboard_item_local_failure_re_registers_adapter() {
        let h = Harness::new();
        h.local.always("get_related", Ok(resource_server_relation()));
        h.local.always("delete", Err(status(500)));

        let err = workflow(&h).offboard_item("i1", CALLER_TOKEN).await.unwrap_err();

        assert_eq!(err, OnboardError::Store(status(500)));
        assert!(h.central.calls().is_empty());

        h.settle().await;
        assert_eq!(h.rs.calls_to("deregister").len(), 1);
        assert_eq!(h.rs.calls_to("register").len(), 1);
        let snap = h.metrics.snapshot();
        assert_eq!(snap.repaired, 1);
        assert_eq!(snap.primary_failures, 1);
    }

    #[tokio::test]
    async fn test_offboard_domain_local_failure_has_no_compensation() {
        let h = Harness::new();
        h.local.always("delete", Err(status(500)));

        workflow(&h).offboard_domain("env", CALLER_TOKEN).await.unwrap_err();

        assert_eq!(h.metrics.snapshot().compensations_dispatched, 0);
        assert!(h.central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_offboard_deregistration_failure_keeps_catalogues() {
        let h = Harness::new();
        h.local.push("get_related", Ok(resource_server_relation()));
        h.rs.always("deregister", Err(status(500)));

        workflow(&h).offboard_item("i1", CALLER_TOKEN).await.unwrap_err();

        assert!(h.local.calls_to("delete").is_empty());
        assert!(h.central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_onboard_item_registers_adapter_under_local_identifier() {
        let h = Harness::new();
        h.local.push("create", Ok(doc(json!({"results": [{"id": "generated-7"}]}))));
        h.local.push("get_related", Ok(resource_server_relation()));

        workflow(&h)
            .onboard_item(doc(json!({"name": "aqm"})), CALLER_TOKEN)
            .await
            .unwrap();

        let central = h.central.calls_to("create");
        assert_eq!(central[0].doc.as_ref().unwrap()["id"], "generated-7");
        assert_eq!(h.local.calls_to("get_related")[0].id.as_deref(), Some("generated-7"));
        let registers = h.rs.calls_to("register");
        assert_eq!(registers.len(), 1);
        assert_eq!(registers[0].id.as_deref(), Some("generated-7"));
        assert_eq!(h.metrics.snapshot().compensations_dispatched, 0);
    }

    #[tokio::test]
    async fn test_generic_item_offboard_removes_adapter_before_deleting() {
        let h = Harness::new();
        h.local.always("get_related", Ok(resource_server_relation()));
        h.local.always("delete", Err(status(500)));

        workflow(&h)
            .offboard(EntityKind::Item, "i1", None, CALLER_TOKEN)
            .await
            .unwrap_err();

        h.settle().await;
        assert_eq!(h.rs.calls_to("deregister").len(), 1);
        assert_eq!(h.rs.calls_to("register").len(), 1);
        assert!(h.central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_delete_without_adapter_removal_is_not_compensated() {
        let h = Harness::new();
        h.local.always("delete", Err(status(500)));
        let request = MutationRequest::for_id(EntityKind::Item, "i1", CALLER_TOKEN);

        workflow(&h)
            .delete_both(EntityKind::Item, &request, false)
            .await
            .unwrap_err();

        assert!(h.rs.calls().is_empty());
        assert_eq!(h.metrics.snapshot().compensations_dispatched, 0);
    }
}
