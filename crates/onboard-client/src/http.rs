//! Response decoding and transport failure classification for the reqwest clients.

use crate::entity::Document;
use crate::error::{Result, StoreError};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;

/// Build the process-wide client for one backing service.
pub(crate) fn build_client(connect_timeout: Duration, request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| StoreError::Transport {
            url: String::new(),
            msg: format!("cannot build HTTP client: {}", error_chain(&e)),
        })
}

/// Turn an upstream answer into a document.
///
/// 200 and 201 are success, every other status is a `StoreError::Status`.
pub(crate) async fn read_document(url: &str, response: Response) -> Result<Document> {
    let status = response.status();
    let body = response.text().await.map_err(|e| classify(url, e))?;

    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Err(StoreError::Status {
            status: status.as_u16(),
            message: upstream_message(status, &body),
        });
    }

    if body.trim().is_empty() {
        return Ok(Document::new());
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => {
            let mut doc = Document::new();
            doc.insert("results".to_string(), other);
            Ok(doc)
        }
        Err(e) => Err(StoreError::Decode {
            url: url.to_string(),
            msg: e.to_string(),
        }),
    }
}

/// Pick the human readable part of an error body.
fn upstream_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "title", "message"] {
            if let Some(Value::String(s)) = map.get(key) {
                return s.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Map a reqwest failure onto the store error taxonomy.
pub(crate) fn classify(url: &str, err: reqwest::Error) -> StoreError {
    let msg = error_chain(&err);
    if err.is_timeout() {
        StoreError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() && mentions_host_lookup(&msg) {
        StoreError::HostResolution {
            url: url.to_string(),
            msg,
        }
    } else if err.is_decode() {
        StoreError::Decode {
            url: url.to_string(),
            msg,
        }
    } else {
        StoreError::Transport {
            url: url.to_string(),
            msg,
        }
    }
}

/// Join an error and all of its sources with `": "`.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn mentions_host_lookup(chain: &str) -> bool {
    let chain = chain.to_ascii_lowercase();
    ["dns error", "failed to lookup address", "name or service not known", "no such host"]
        .iter()
        .any(|needle| chain.contains(needle))
}
