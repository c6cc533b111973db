//! Transport to the management server.

use std::error::Error as _;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client};
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, TransportError};

/// Sends one request and returns the decoded JSON response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST` `body` as JSON, or `GET` when there is no body.
    async fn send(&self, url: &str, body: Option<&Value>) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, ca_cert: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(path) = ca_cert {
            let pem = std::fs::read(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, body: Option<&Value>) -> Result<Value, TransportError> {
        let request = match body {
            Some(body) => {
                debug!(url, "POST request");
                self.client.post(url).json(body)
            }
            None => {
                debug!(url, "GET request");
                self.client.get(url)
            }
        };

        let response = request.send().await.map_err(|e| classify(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await.map_err(|e| classify(url, &e))?;
        serde_json::from_str(&text).map_err(|_| {
            let data = body.map(Value::to_string).unwrap_or_default();
            TransportError::Decode(format!(
                "Response parsing failed! Request data: {data}; Response: {text}"
            ))
        })
    }
}

/// Split certificate and handshake failures from ordinary I/O failures.
fn classify(url: &str, err: &reqwest::Error) -> TransportError {
    let mut cause = err.to_string();
    let mut tls = false;
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        tls |= is_tls_message(&text);
        cause = text;
        source = inner.source();
    }

    let message = format!("Request to {url} failed due to {cause}");
    if tls {
        TransportError::Tls(message)
    } else {
        TransportError::Io(message)
    }
}

fn is_tls_message(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|marker| text.contains(marker))
}
