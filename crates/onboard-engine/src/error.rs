//! Error types for the onboarding engine.

use onboard_client::{EntityKind, InvalidTarget, StoreError, TokenError};
use serde_json::{json, Value};
use thiserror::Error;

/// Caller-facing failure of an orchestrated operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnboardError {
    /// The store selector was neither `local` nor `central`.
    #[error("invalid store target: {0:?}")]
    InvalidTarget(String),

    /// A local store failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The upstream answered with an error status after the retry policy gave up.
    #[error("upstream failure {status}: {message}")]
    Upstream {
        /// Upstream status code.
        status: u16,
        /// Upstream message.
        message: String,
    },

    /// Transport-level or otherwise unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The resource server could not be reached in time.
    #[error("connect timeout calling {url}")]
    ConnectTimeout {
        /// Request URL.
        url: String,
    },

    /// The admin token could not be minted.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The request does not carry the identifier the operation needs.
    #[error("{kind} request carries no identifier")]
    MissingIdentifier {
        /// Entity kind of the request.
        kind: EntityKind,
    },
}

impl From<InvalidTarget> for OnboardError {
    fn from(err: InvalidTarget) -> Self {
        OnboardError::InvalidTarget(err.0)
    }
}

impl OnboardError {
    /// Normalise a terminal store failure.
    ///
    /// Status failures keep their upstream status and message, everything else
    /// becomes a generic internal error.
    pub fn from_terminal(err: StoreError) -> Self {
        match err {
            StoreError::Status { status, message } => OnboardError::Upstream { status, message },
            other => OnboardError::Internal(other.to_string()),
        }
    }

    /// HTTP status an API layer would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            OnboardError::InvalidTarget(_) | OnboardError::MissingIdentifier { .. } => 400,
            OnboardError::Store(e) => e.status().unwrap_or(500),
            OnboardError::Upstream { status, .. } => *status,
            OnboardError::ConnectTimeout { .. } => 504,
            OnboardError::Internal(_) | OnboardError::Token(_) => 500,
        }
    }

    /// JSON error envelope in the catalogue's `type`/`title`/`detail` shape.
    pub fn envelope(&self) -> Value {
        let (urn, title) = match self {
            OnboardError::InvalidTarget(_) => ("urn:dx:cat:InvalidParamValue", "Invalid target"),
            OnboardError::MissingIdentifier { .. } => ("urn:dx:cat:InvalidSyntax", "Missing identifier"),
            OnboardError::Store(_) | OnboardError::Upstream { .. } => ("urn:dx:cat:UpstreamFailure", "Upstream failure"),
            OnboardError::ConnectTimeout { .. } => ("urn:dx:rs:ConnectTimeout", "Connect timeout"),
            OnboardError::Internal(_) | OnboardError::Token(_) => ("urn:dx:cat:InternalError", "Internal Server Error"),
        };
        json!({
            "type": urn,
            "status": self.status_code(),
            "title": title,
            "detail": self.to_string(),
        })
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or schema error.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `.toml` nor `.json`.
    #[error("unsupported config file extension: {0:?}")]
    UnsupportedExtension(String),

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),

    /// A client could not be constructed from the configuration.
    #[error("cannot build client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_becomes_upstream() {
        let err = OnboardError::from_terminal(StoreError::Status {
            status: 503,
            message: "unavailable".to_string(),
        });
        assert_eq!(
            err,
            OnboardError::Upstream {
                status: 503,
                message: "unavailable".to_string()
            }
        );
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_terminal_transport_becomes_internal() {
        let err = OnboardError::from_terminal(StoreError::HostResolution {
            url: "http://central".to_string(),
            msg: "dns error".to_string(),
        });
        assert!(matches!(err, OnboardError::Internal(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_invalid_target_conversion() {
        let err: OnboardError = InvalidTarget("edge".to_string()).into();
        assert_eq!(err, OnboardError::InvalidTarget("edge".to_string()));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_envelope_shape() {
        let env = OnboardError::ConnectTimeout {
            url: "https://rs/ngsi-ld/v1/ingestion".to_string(),
        }
        .envelope();
        assert_eq!(env["type"], "urn:dx:rs:ConnectTimeout");
        assert_eq!(env["status"], 504);
        assert!(env["detail"].as_str().unwrap().contains("https://rs"));
    }
}
