// Error-code handlers
// Consulted when a response carries API errors; a handler may re-issue the
// request and supply a replacement body, or decline.

use crate::session::Session;
use async_trait::async_trait;
use mwapi_core::{ApiMessage, Params, RequestOptions, Result};
use mwapi_transport::RawResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Extension key marking a request that was already retried after `badtoken`.
pub const BAD_TOKEN_RETRIED: &str = "mwapi.badtoken_retried";

/// Handler for one API error code.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Return `Ok(Some(body))` to resolve the request with `body`,
    /// `Ok(None)` to decline so the next handler is tried.
    async fn handle(
        &self,
        session: &Session,
        params: &Params,
        options: &RequestOptions,
        response: &RawResponse,
        error: &ApiMessage,
    ) -> Result<Option<Value>>;
}

/// Registry of error handlers keyed by API error code.
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    handlers: HashMap<String, Vec<Arc<dyn ErrorHandler>>>,
}

impl ErrorHandlers {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `badtoken` handler.
    pub fn with_defaults() -> Self {
        let mut handlers = Self::new();
        handlers.register("badtoken", Arc::new(BadTokenHandler));
        handlers
    }

    /// Add a handler for `code`; handlers run in registration order.
    pub fn register(&mut self, code: impl Into<String>, handler: Arc<dyn ErrorHandler>) {
        self.handlers.entry(code.into()).or_default().push(handler);
    }

    pub fn handlers_for(&self, code: &str) -> &[Arc<dyn ErrorHandler>] {
        self.handlers.get(code).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlers")
            .field("codes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Refreshes a stale token and re-issues the request once.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadTokenHandler;

#[async_trait]
impl ErrorHandler for BadTokenHandler {
    async fn handle(
        &self,
        session: &Session,
        params: &Params,
        options: &RequestOptions,
        _response: &RawResponse,
        _error: &ApiMessage,
    ) -> Result<Option<Value>> {
        let resolved = session.resolve_options(options);
        let Some(token_type) = resolved.token_type.as_deref() else {
            debug!("badtoken error for a request without a token type");
            return Ok(None);
        };
        if resolved.extensions.contains_key(BAD_TOKEN_RETRIED) {
            return Ok(None);
        }

        info!(token_type, "Token rejected; refreshing and retrying");
        session.clear_token(token_type);

        let mut params = params.clone();
        params.shift_remove(&resolved.token_name);
        let options = options.clone().extension(BAD_TOKEN_RETRIED, true);
        session.request(params, options).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decline;

    #[async_trait]
    impl ErrorHandler for Decline {
        async fn handle(
            &self,
            _session: &Session,
            _params: &Params,
            _options: &RequestOptions,
            _response: &RawResponse,
            _error: &ApiMessage,
        ) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let mut handlers = ErrorHandlers::with_defaults();
        handlers.register("badtoken", Arc::new(Decline));
        handlers.register("maxlag", Arc::new(Decline));

        assert_eq!(handlers.handlers_for("badtoken").len(), 2);
        assert_eq!(handlers.handlers_for("maxlag").len(), 1);
        assert!(handlers.handlers_for("readonly").is_empty());
    }

    #[test]
    fn test_empty_registry() {
        assert!(ErrorHandlers::new().is_empty());
        assert!(!ErrorHandlers::with_defaults().is_empty());
    }
}
