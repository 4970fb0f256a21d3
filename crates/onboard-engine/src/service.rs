//! Capability surface exposed to a routing or API layer.

use onboard_client::{Document, EntityKind, Operation};
use std::sync::Arc;

use crate::adapter::AdapterOrchestrator;
use crate::backends::Backends;
use crate::dispatcher::Dispatcher;
use crate::error::OnboardError;
use crate::metrics::RepairMetrics;
use crate::request::MutationRequest;
use crate::retry::RetryPolicy;

/// Per-kind catalogue verbs and adapter lifecycle, all sharing one compensation engine.
#[derive(Clone)]
pub struct CatalogueService {
    dispatcher: Dispatcher,
    adapters: AdapterOrchestrator,
}

impl CatalogueService {
    /// Wire the dispatcher and adapter orchestrator over `backends`.
    pub fn new(backends: Backends, policy: Arc<RetryPolicy>, metrics: Arc<RepairMetrics>) -> Self {
        let dispatcher = Dispatcher::new(backends.clone(), policy.clone(), metrics);
        let adapters = AdapterOrchestrator::new(backends, policy, dispatcher.compensations().clone());
        Self {
            dispatcher,
            adapters,
        }
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The underlying adapter orchestrator.
    pub fn adapters(&self) -> &AdapterOrchestrator {
        &self.adapters
    }

    /// Repair counters.
    pub fn metrics(&self) -> &Arc<RepairMetrics> {
        self.dispatcher.metrics()
    }

    async fn run(
        &self,
        kind: EntityKind,
        operation: Operation,
        request: &MutationRequest,
        target: &str,
    ) -> Result<Document, OnboardError> {
        self.dispatcher.execute(kind, operation, request, target).await
    }

    /// Create an item on the store named by `target`.
    pub async fn create_item(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Item, Operation::Create, request, target).await
    }

    /// Update an item on the store named by `target`.
    pub async fn update_item(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Item, Operation::Update, request, target).await
    }

    /// Delete an item on the store named by `target`.
    pub async fn delete_item(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Item, Operation::Delete, request, target).await
    }

    /// Read an item on the store named by `target`.
    pub async fn get_item(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Item, Operation::Get, request, target).await
    }

    /// Create an instance on the store named by `target`.
    pub async fn create_instance(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Instance, Operation::Create, request, target).await
    }

    /// Update an instance on the store named by `target`.
    pub async fn update_instance(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Instance, Operation::Update, request, target).await
    }

    /// Deletes carry the instance `path` from the request.
    pub async fn delete_instance(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Instance, Operation::Delete, request, target).await
    }

    /// Read an instance on the store named by `target`.
    pub async fn get_instance(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Instance, Operation::Get, request, target).await
    }

    /// Create a domain on the store named by `target`.
    pub async fn create_domain(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Domain, Operation::Create, request, target).await
    }

    /// Update a domain on the store named by `target`.
    pub async fn update_domain(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Domain, Operation::Update, request, target).await
    }

    /// Delete a domain on the store named by `target`.
    pub async fn delete_domain(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Domain, Operation::Delete, request, target).await
    }

    /// Read a domain on the store named by `target`.
    pub async fn get_domain(&self, request: &MutationRequest, target: &str) -> Result<Document, OnboardError> {
        self.run(EntityKind::Domain, Operation::Get, request, target).await
    }

    /// Register the ingestion adapter for `item_id`.
    pub async fn create_adapter(&self, item_id: &str, token: &str) -> Result<Document, OnboardError> {
        self.adapters.create_adapter(item_id, token).await
    }

    /// Deregister the ingestion adapter for `item_id`.
    pub async fn delete_adapter(&self, item_id: &str, token: &str) -> Result<Document, OnboardError> {
        self.adapters.delete_adapter(item_id, token).await
    }
}
