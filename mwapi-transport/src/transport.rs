// Transport abstraction
// The seam between sessions and the wire: one GET or POST, raw status, headers and body

use async_trait::async_trait;
use mwapi_core::{Headers, WireParams};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("Unsupported request: {0}")]
    Unsupported(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<TransportError> for mwapi_core::Error {
    fn from(err: TransportError) -> Self {
        mwapi_core::Error::transport(err)
    }
}

/// A decoded HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Lower-case header names; `set-cookie` is never included.
    pub headers: Headers,
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body,
        }
    }

    /// A 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Performs HTTP calls against one API endpoint.
///
/// `headers` always contains a lower-case `user-agent` and may contain
/// `authorization`. POST bodies are form-encoded unless a parameter is a
/// file, in which case they are sent as multipart.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError>;

    async fn post(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError>;
}
