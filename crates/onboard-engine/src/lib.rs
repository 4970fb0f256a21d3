#![warn(missing_docs)]

//! Catalogue onboarding engine: store routing, bounded retries, compensation of divergent local/central writes, adapter lifecycle

pub mod adapter;
pub mod backends;
pub mod cli;
pub mod compensation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod request;
pub mod retry;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::AdapterOrchestrator;
pub use backends::Backends;
pub use compensation::{recipe, Compensation, CompensationEngine, CompensationTask};
pub use config::OnboardConfig;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, OnboardError};
pub use metrics::{MetricsSnapshot, RepairMetrics};
pub use request::MutationRequest;
pub use retry::{RetryOutcome, RetryPolicy};
pub use service::CatalogueService;
pub use workflow::OnboardingWorkflow;
