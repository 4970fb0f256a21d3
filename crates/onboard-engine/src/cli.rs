//! `onboard` command line.

use crate::config::OnboardConfig;
use crate::error::OnboardError;
use crate::metrics::RepairMetrics;
use crate::request::MutationRequest;
use crate::service::CatalogueService;
use crate::workflow::OnboardingWorkflow;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use onboard_client::{Document, EntityKind, Operation};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Command line entry point.
#[derive(Parser)]
#[command(name = "onboard")]
#[command(about = "Catalogue onboarding across the local and central catalogues", long_about = None)]
pub struct Cli {
    /// Configuration file, `.toml` or `.json`.
    #[arg(short, long, default_value = "/etc/onboard/onboard.toml")]
    pub config: PathBuf,

    /// Caller token presented to the local catalogue.
    #[arg(short, long, env = "ONBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Seconds to wait for in-flight compensations before exiting.
    #[arg(long, default_value = "30")]
    pub grace_secs: u64,

    /// Write repair counters in Prometheus text format to this file on exit.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Single-catalogue item operations.
    Item {
        /// Verb to run.
        #[command(subcommand)]
        cmd: EntityCmd,
    },
    /// Single-catalogue instance operations.
    Instance {
        /// Verb to run.
        #[command(subcommand)]
        cmd: EntityCmd,
    },
    /// Single-catalogue domain operations.
    Domain {
        /// Verb to run.
        #[command(subcommand)]
        cmd: EntityCmd,
    },
    /// Ingestion adapter registration.
    Adapter {
        /// Verb to run.
        #[command(subcommand)]
        cmd: AdapterCmd,
    },
    /// Create an item on both catalogues and register its adapter.
    OnboardItem {
        /// JSON document with the item body.
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Deregister an item's adapter and delete it from both catalogues.
    OffboardItem {
        /// Item identifier.
        #[arg(long)]
        id: String,
    },
    /// Load and validate the configuration file.
    CheckConfig,
}

/// Entity verbs routed through the dispatcher.
#[derive(Subcommand, Clone)]
pub enum EntityCmd {
    /// Create the entity.
    Create(EntityArgs),
    /// Replace the entity.
    Update(EntityArgs),
    /// Fetch the entity.
    Get(EntityArgs),
    /// Delete the entity.
    Delete(EntityArgs),
}

impl EntityCmd {
    fn split(&self) -> (Operation, &EntityArgs) {
        match self {
            EntityCmd::Create(args) => (Operation::Create, args),
            EntityCmd::Update(args) => (Operation::Update, args),
            EntityCmd::Get(args) => (Operation::Get, args),
            EntityCmd::Delete(args) => (Operation::Delete, args),
        }
    }
}

/// Arguments shared by the entity verbs.
#[derive(Args, Clone, Debug)]
pub struct EntityArgs {
    /// `local` or `central`.
    #[arg(long)]
    pub target: String,

    /// JSON document with the entity body.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Entity identifier, overriding the one in `--file`.
    #[arg(long)]
    pub id: Option<String>,

    /// Path segment the entity lives under.
    #[arg(long)]
    pub path: Option<String>,
}

/// Adapter verbs.
#[derive(Subcommand, Clone)]
pub enum AdapterCmd {
    /// Register the adapter for an item.
    Create {
        /// Item identifier.
        #[arg(long)]
        id: String,
    },
    /// Deregister the adapter for an item.
    Delete {
        /// Item identifier.
        #[arg(long)]
        id: String,
    },
}

impl Cli {
    /// Load the configuration and execute the selected command.
    pub async fn run(self) -> Result<()> {
        let config = OnboardConfig::from_file(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Command::CheckConfig = self.command {
            return check_config(&config);
        }

        let token = Zeroizing::new(
            self.token
                .clone()
                .context("caller token required (--token or ONBOARD_TOKEN)")?,
        );
        let backends = config.backends()?;
        let metrics = Arc::new(RepairMetrics::new());
        let service = CatalogueService::new(backends, Arc::new(config.retry.to_policy()), metrics.clone());
        let workflow = OnboardingWorkflow::new(service);

        let outcome = self.dispatch(&workflow, token.as_str()).await;
        self.drain(&metrics).await;
        if let Some(path) = &self.metrics_file {
            write_metrics(path, &metrics)?;
        }

        match outcome {
            Ok(doc) => {
                println!("{}", serde_json::to_string_pretty(&doc)?);
                Ok(())
            }
            Err(err) => {
                println!("{}", serde_json::to_string_pretty(&err.envelope())?);
                Err(err.into())
            }
        }
    }

    async fn dispatch(&self, workflow: &OnboardingWorkflow, token: &str) -> Result<Document, OnboardError> {
        let service = workflow.service();
        match &self.command {
            Command::Item { cmd } => self.entity(service, EntityKind::Item, cmd, token).await,
            Command::Instance { cmd } => self.entity(service, EntityKind::Instance, cmd, token).await,
            Command::Domain { cmd } => self.entity(service, EntityKind::Domain, cmd, token).await,
            Command::Adapter { cmd } => match cmd {
                AdapterCmd::Create { id } => service.create_adapter(id, token).await,
                AdapterCmd::Delete { id } => service.delete_adapter(id, token).await,
            },
            Command::OnboardItem { file } => {
                let body = read_document(file).map_err(|e| OnboardError::Internal(format!("{e:#}")))?;
                workflow.onboard_item(body, token).await
            }
            Command::OffboardItem { id } => workflow.offboard_item(id, token).await,
            Command::CheckConfig => Ok(Document::new()),
        }
    }

    async fn entity(
        &self,
        service: &CatalogueService,
        kind: EntityKind,
        cmd: &EntityCmd,
        token: &str,
    ) -> Result<Document, OnboardError> {
        let (operation, args) = cmd.split();
        let request = entity_request(kind, args, token).map_err(|e| OnboardError::Internal(format!("{e:#}")))?;
        service
            .dispatcher()
            .execute(kind, operation, &request, &args.target)
            .await
    }

    async fn drain(&self, metrics: &RepairMetrics) {
        let in_flight = metrics.snapshot().in_flight();
        if in_flight == 0 {
            return;
        }
        tracing::info!(in_flight, grace_secs = self.grace_secs, "waiting for compensations to settle");
        if !metrics.wait_idle(Duration::from_secs(self.grace_secs)).await {
            tracing::warn!(
                in_flight = metrics.snapshot().in_flight(),
                "exiting with compensations still running"
            );
        }
        let snap = metrics.snapshot();
        tracing::info!(
            repaired = snap.repaired,
            irreparable = snap.irreparable,
            retries = snap.retries_total,
            "repair summary"
        );
    }
}

fn check_config(config: &OnboardConfig) -> Result<()> {
    let summary = json!({
        "valid": true,
        "local": config.local.base_url,
        "central": config.central.base_url,
        "token": config.token.url,
        "retry": config.retry,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn write_metrics(path: &Path, metrics: &RepairMetrics) -> Result<()> {
    std::fs::write(path, metrics.render_prometheus()).with_context(|| format!("writing {}", path.display()))
}

fn read_document(path: &Path) -> Result<Document> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))? {
        Value::Object(doc) => Ok(doc),
        _ => anyhow::bail!("{} must contain a JSON object", path.display()),
    }
}

/// Request for a single-entity command. `--id` overrides the identifier in the file.
fn entity_request(kind: EntityKind, args: &EntityArgs, token: &str) -> Result<MutationRequest> {
    let mut body = match &args.file {
        Some(file) => read_document(file)?,
        None => Document::new(),
    };
    if let Some(id) = &args.id {
        body.insert(kind.id_key().to_string(), Value::String(id.clone()));
    }
    let mut request = MutationRequest::new(body, token);
    request.path = args.path.clone();
    Ok(request)
}
