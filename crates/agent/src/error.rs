//! Error types for the host agent.

use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the management server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout or read failure. Retried.
    #[error("{0}")]
    Io(String),

    /// TLS handshake or certificate failure. Retrying cannot succeed.
    #[error("TLS failure: {0}")]
    Tls(String),

    /// The server answered with a non-success HTTP status.
    #[error("Request to {url} failed with HTTP status {status}")]
    Http { status: u16, url: String },

    /// The response body was not valid JSON.
    #[error("{0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the caller should stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// Failure loading agent configuration or local agent files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the controller outside its own retry loops.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Decode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_tls_is_fatal() {
        assert!(TransportError::Tls("bad certificate".into()).is_fatal());
        assert!(!TransportError::Io("connection refused".into()).is_fatal());
        assert!(!TransportError::Decode("garbage".into()).is_fatal());
        assert!(!TransportError::Http {
            status: 503,
            url: "https://server:8441/agent/v1/heartbeat/h1".into()
        }
        .is_fatal());
    }
}
