//! Service configuration, loaded from TOML or JSON.

use onboard_client::{HttpResourceServerClient, HttpStoreClient, HttpTokenProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::Backends;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// One catalogue REST endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreEndpoint {
    /// Catalogue API root, e.g. `https://host/iudx/cat/v1`.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout, body read included.
    pub request_timeout_ms: u64,
}

impl Default for StoreEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8443/iudx/cat/v1"),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Admin token service.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEndpoint {
    /// Token mint URL.
    pub url: String,
    /// Client credential identifier.
    pub client_id: String,
    /// Client credential secret. Redacted from `Debug`.
    pub client_secret: String,
    /// Resource server the minted admin token is scoped to.
    pub item_id: String,
    /// Request timeout for a mint.
    pub timeout_ms: u64,
}

impl Default for TokenEndpoint {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8443/auth/v1/token"),
            client_id: String::new(),
            client_secret: String::new(),
            item_id: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("item_id", &self.item_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Resource server adapter API timeouts. Hosts come from the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceServerSettings {
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for ResourceServerSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Retry policy knobs shared by primary calls and compensations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per execution, first call included. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub backoff_floor_ms: u64,
    /// Upper bound on any single delay.
    pub backoff_ceiling_ms: u64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Add random jitter to each delay, still bounded by the ceiling.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_floor_ms: policy.backoff_floor.as_millis() as u64,
            backoff_ceiling_ms: policy.backoff_ceiling.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter: policy.jitter,
        }
    }
}

impl RetrySettings {
    /// Policy with the default recoverable/unrecoverable predicates.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_floor: Duration::from_millis(self.backoff_floor_ms),
            backoff_ceiling: Duration::from_millis(self.backoff_ceiling_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            ..RetryPolicy::default()
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardConfig {
    /// Local catalogue.
    pub local: StoreEndpoint,
    /// Central catalogue.
    pub central: StoreEndpoint,
    /// Admin token service for central calls.
    pub token: TokenEndpoint,
    /// Resource server adapter API.
    pub resource_server: ResourceServerSettings,
    /// Retry policy.
    pub retry: RetrySettings,
}

impl OnboardConfig {
    /// Parse by extension (`.toml` or `.json`) and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: OnboardConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => return Err(ConfigError::UnsupportedExtension(ext.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if retry.backoff_floor_ms > retry.backoff_ceiling_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_floor_ms ({}) exceeds retry.backoff_ceiling_ms ({})",
                retry.backoff_floor_ms, retry.backoff_ceiling_ms
            )));
        }
        if !(retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_multiplier must be >= 1, got {}",
                retry.backoff_multiplier
            )));
        }
        for (name, url) in [
            ("local.base_url", &self.local.base_url),
            ("central.base_url", &self.central.base_url),
            ("token.url", &self.token.url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{name} must be an http(s) URL, got {url:?}")));
            }
        }
        Ok(())
    }

    /// Build the HTTP collaborators. Each store gets its own client.
    pub fn backends(&self) -> Result<Backends, ConfigError> {
        let local = store_client(&self.local)?;
        let central = store_client(&self.central)?;
        let tokens = HttpTokenProvider::new(
            &self.token.url,
            &self.token.client_id,
            &self.token.client_secret,
            &self.token.item_id,
            Duration::from_millis(self.token.timeout_ms),
        )
        .map_err(|e| ConfigError::Client(e.to_string()))?;
        let resource_server = HttpResourceServerClient::new(
            Duration::from_millis(self.resource_server.connect_timeout_ms),
            Duration::from_millis(self.resource_server.request_timeout_ms),
        )
        .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Backends {
            local: Arc::new(local),
            central: Arc::new(central),
            tokens: Arc::new(tokens),
            resource_server: Arc::new(resource_server),
        })
    }
}

fn store_client(endpoint: &StoreEndpoint) -> Result<HttpStoreClient, ConfigError> {
    HttpStoreClient::new(
        &endpoint.base_url,
        Duration::from_millis(endpoint.connect_timeout_ms),
        Duration::from_millis(endpoint.request_timeout_ms),
    )
    .map_err(|e| ConfigError::Client(e.to_string()))
}
