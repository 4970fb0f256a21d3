//! Operation dispatcher.
//!
//! Routes a catalogue operation to the right store:
//!
//! - local: exactly one call with the caller's token, outcome passed through;
//! - central: fresh admin token, call under the retry policy, and on terminal
//!   failure a detached compensation against local followed by a structured
//!   error for the caller.
//!
//! The caller never waits on, or observes, the compensation.

use onboard_client::{Document, EntityKind, Operation, StoreClient, StoreError, StoreTarget};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::backends::Backends;
use crate::compensation::{CompensationEngine, CompensationTask};
use crate::error::OnboardError;
use crate::metrics::RepairMetrics;
use crate::request::MutationRequest;
use crate::retry::{RetryOutcome, RetryPolicy};

/// Routes catalogue operations and triggers compensation on terminal central failures.
#[derive(Clone)]
pub struct Dispatcher {
    backends: Backends,
    policy: Arc<RetryPolicy>,
    metrics: Arc<RepairMetrics>,
    compensations: CompensationEngine,
}

impl Dispatcher {
    /// Create a dispatcher with its own compensation engine.
    pub fn new(backends: Backends, policy: Arc<RetryPolicy>, metrics: Arc<RepairMetrics>) -> Self {
        let compensations = CompensationEngine::new(backends.clone(), policy.clone(), metrics.clone());
        Self {
            backends,
            policy,
            metrics,
            compensations,
        }
    }

    /// The compensation engine used for failed central writes.
    pub fn compensations(&self) -> &CompensationEngine {
        &self.compensations
    }

    /// Repair counters.
    pub fn metrics(&self) -> &Arc<RepairMetrics> {
        &self.metrics
    }

    /// Execute `operation` on an entity of `kind` against the store named by `target`.
    ///
    /// An unknown `target` fails before any remote call.
    pub async fn execute(
        &self,
        kind: EntityKind,
        operation: Operation,
        request: &MutationRequest,
        target: &str,
    ) -> Result<Document, OnboardError> {
        let target: StoreTarget = target.parse()?;
        self.execute_on(kind, operation, request, target).await
    }

    /// Same as `execute` with an already parsed target.
    pub async fn execute_on(
        &self,
        kind: EntityKind,
        operation: Operation,
        request: &MutationRequest,
        target: StoreTarget,
    ) -> Result<Document, OnboardError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "catalogue_call",
            %request_id,
            %kind,
            %operation,
            %target
        );
        async move {
            let id = match operation {
                Operation::Delete | Operation::Get => Some(
                    request
                        .identifier(kind)
                        .ok_or(OnboardError::MissingIdentifier { kind })?,
                ),
                Operation::Create | Operation::Update => None,
            };

            match target {
                StoreTarget::Local => self.execute_local(kind, operation, request, id.as_deref()).await,
                StoreTarget::Central => self.execute_central(kind, operation, request, id.as_deref()).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_local(
        &self,
        kind: EntityKind,
        operation: Operation,
        request: &MutationRequest,
        id: Option<&str>,
    ) -> Result<Document, OnboardError> {
        let local = self.backends.store(StoreTarget::Local);
        call(local, kind, operation, request, id, &request.token)
            .await
            .map_err(|error| {
                tracing::warn!(error = %error, "local catalogue call failed");
                OnboardError::Store(error)
            })
    }

    async fn execute_central(
        &self,
        kind: EntityKind,
        operation: Operation,
        request: &MutationRequest,
        id: Option<&str>,
    ) -> Result<Document, OnboardError> {
        let admin_token = self.backends.tokens.mint().await.map_err(|error| {
            tracing::error!(error = %error, "cannot mint admin token for central catalogue");
            OnboardError::Token(error)
        })?;

        let central = self.backends.store(StoreTarget::Central);
        let admin = admin_token.as_str();
        let outcome = self
            .policy
            .execute_with_metrics(&self.metrics, move || {
                call(central, kind, operation, request, id, admin)
            })
            .await;

        let (error, attempts) = match outcome {
            RetryOutcome::Success(doc) => return Ok(doc),
            RetryOutcome::Exhausted { last_error, attempts } => (last_error, attempts),
            RetryOutcome::Aborted { error, attempts } => (error, attempts),
        };
        self.metrics.record_primary_failure();
        tracing::error!(attempts, error = %error, "central catalogue call gave up");

        if let Some(task) = CompensationTask::plan(
            kind,
            operation,
            StoreTarget::Central,
            request,
            Some(admin_token.clone()),
        ) {
            self.compensations.dispatch(task);
        }

        Err(OnboardError::from_terminal(error))
    }
}

async fn call(
    store: &dyn StoreClient,
    kind: EntityKind,
    operation: Operation,
    request: &MutationRequest,
    id: Option<&str>,
    token: &str,
) -> Result<Document, StoreError> {
    match (operation, id) {
        (Operation::Create, _) => store.create(kind, &request.body, token).await,
        (Operation::Update, _) => store.update(kind, &request.body, token).await,
        (Operation::Delete, Some(id)) => store.delete(kind, id, request.path(), token).await,
        (Operation::Get, Some(id)) => store.get(kind, id, token).await,
        (Operation::Delete | Operation::Get, None) => Err(StoreError::Decode {
            url: kind.segment().to_string(),
            msg: "identifier required".to_string(),
        }),
    }
}
