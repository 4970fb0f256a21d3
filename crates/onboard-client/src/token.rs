//! Admin token acquisition for central catalogue calls.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::error::TokenError;
use crate::http::{build_client, error_chain};

/// Short-lived admin credential. Wiped from memory on drop.
#[derive(Clone)]
pub struct AdminToken(Zeroizing<String>);

impl AdminToken {
    /// Wrap a raw credential.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// The credential as sent on the wire.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

/// Supplies admin credentials. Resilience is the provider's own concern.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Mint a fresh admin token.
    async fn mint(&self) -> Result<AdminToken, TokenError>;
}

/// Token service client using client credentials.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    url: String,
    client_id: String,
    client_secret: Zeroizing<String>,
    item_id: String,
}

impl HttpTokenProvider {
    /// Create a provider minting tokens for `item_id` at `url`.
    pub fn new(
        url: &str,
        client_id: &str,
        client_secret: &str,
        item_id: &str,
        timeout: Duration,
    ) -> Result<Self, TokenError> {
        let client = build_client(timeout, timeout).map_err(|e| TokenError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            client_id: client_id.to_string(),
            client_secret: Zeroizing::new(client_secret.to_string()),
            item_id: item_id.to_string(),
        })
    }
}

impl fmt::Debug for HttpTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenProvider")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("item_id", &self.item_id)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn mint(&self) -> Result<AdminToken, TokenError> {
        let body = json!({
            "itemId": self.item_id,
            "itemType": "resource_server",
            "role": "admin",
        });
        let response = self
            .client
            .post(&self.url)
            .header("clientId", &self.client_id)
            .header("clientSecret", self.client_secret.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| TokenError(format!("request to {} failed: {}", self.url, error_chain(&e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError(format!("{} answered {}", self.url, status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TokenError(format!("undecodable token response: {e}")))?;

        payload
            .pointer("/results/accessToken")
            .and_then(Value::as_str)
            .map(AdminToken::new)
            .ok_or_else(|| TokenError("token response carried no accessToken".to_string()))
    }
}
