//! Error types shared by the catalogue, token and resource server clients.

use thiserror::Error;

/// Failure of a single remote call against a catalogue or resource server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The upstream answered with a status other than 200/201.
    #[error("upstream returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Upstream detail message, or the raw body.
        message: String,
    },

    /// Connect or request timeout.
    #[error("timed out calling {url}")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// The host name of the upstream could not be resolved.
    #[error("cannot resolve host for {url}: {msg}")]
    HostResolution {
        /// Request URL.
        url: String,
        /// Cause chain of the failure.
        msg: String,
    },

    /// Any other transport-level failure (refused, reset, TLS).
    #[error("transport error calling {url}: {msg}")]
    Transport {
        /// Request URL.
        url: String,
        /// Cause chain of the failure.
        msg: String,
    },

    /// The upstream answered successfully but the body was not a JSON document.
    #[error("undecodable response from {url}: {msg}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder message.
        msg: String,
    },
}

impl StoreError {
    /// Application-level failures and transient transport errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::Status { .. } | StoreError::Timeout { .. } | StoreError::Transport { .. }
        )
    }

    /// Failures that no amount of retrying will fix.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, StoreError::HostResolution { .. })
    }

    /// Upstream status code, if the failure came from an HTTP answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure to obtain an admin credential. Carries the message only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token service: {0}")]
pub struct TokenError(pub String);

/// Result alias for store and resource server calls.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(StoreError::Status {
            status: 500,
            message: "boom".to_string()
        }
        .is_recoverable());
        assert!(StoreError::Timeout {
            url: "http://rs".to_string()
        }
        .is_recoverable());
        assert!(StoreError::Transport {
            url: "http://rs".to_string(),
            msg: "connection reset".to_string()
        }
        .is_recoverable());

        let dns = StoreError::HostResolution {
            url: "http://nowhere".to_string(),
            msg: "dns error".to_string(),
        };
        assert!(!dns.is_recoverable());
        assert!(dns.is_unrecoverable());

        let decode = StoreError::Decode {
            url: "http://cat".to_string(),
            msg: "expected value".to_string(),
        };
        assert!(!decode.is_recoverable());
        assert!(!decode.is_unrecoverable());
    }

    #[test]
    fn test_status_accessor() {
        let err = StoreError::Status {
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            StoreError::Timeout {
                url: "x".to_string()
            }
            .status(),
            None
        );
    }

    #[test]
    fn test_display() {
        let err = StoreError::Status {
            status: 500,
            message: "internal".to_string(),
        };
        assert_eq!(err.to_string(), "upstream returned 500: internal");
        assert_eq!(
            TokenError("unreachable".to_string()).to_string(),
            "token service: unreachable"
        );
    }
}
