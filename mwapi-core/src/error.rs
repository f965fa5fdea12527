// Client errors
// One cloneable error type shared by every caller of a combined request

use crate::response::ApiMessage;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One or more errors reported in the API error envelope.
///
/// Displays as the code of the first error; the full ordered list is
/// available through [`ApiErrors::errors`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrors {
    errors: Vec<ApiMessage>,
}

impl ApiErrors {
    pub fn new(errors: Vec<ApiMessage>) -> Self {
        ApiErrors { errors }
    }

    /// Code of the first error.
    pub fn code(&self) -> &str {
        self.errors
            .first()
            .and_then(ApiMessage::code)
            .unwrap_or("unknown")
    }

    pub fn errors(&self) -> &[ApiMessage] {
        &self.errors
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|error| error.code() == Some(code))
    }

    pub fn into_errors(self) -> Vec<ApiMessage> {
        self.errors
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for ApiErrors {}

/// Error returned by every request operation.
///
/// Cloneable so that a single failure can be delivered to every caller
/// whose request was combined into the failing one.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("API error: {0}")]
    Api(#[from] ApiErrors),

    #[error("HTTP error {status}")]
    Http { status: u16, body: Value },

    #[error("Transport error: {0}")]
    Transport(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Request dispatch ended without a result")]
    Dispatch,
}

impl Error {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport(Arc::new(err))
    }

    /// The API errors, if this is an API error.
    pub fn api_errors(&self) -> Option<&ApiErrors> {
        match self {
            Error::Api(errors) => Some(errors),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
