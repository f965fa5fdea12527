// MediaWiki API session
// Owns the defaults, the token cache and the pending-request registry of one
// API endpoint, and drives a single request through transport, retries,
// error handlers and warning delivery.

use crate::combiner::{RawRequester, RequestCombiner};
use crate::continuation::{self, ResponseStream};
use crate::handlers::{ErrorHandler, ErrorHandlers, BAD_TOKEN_RETRIED};
use crate::tokens::{token_from_response, TokenCache};
use async_trait::async_trait;
use futures::stream::BoxStream;
use mwapi_core::{
    drop_truncation_warning, encode_params, extract_errors, extract_warnings, has_files, params,
    ApiErrors, ApiMessage, Error, Headers, Method, Options, ParamValue, Params, RequestOptions,
    Result, RetryBudget, RetryPolicy,
};
use mwapi_transport::{normalize_endpoint, HttpTransport, RawResponse, Transport};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// User agent sent when neither the call nor the session configures one.
pub const LIBRARY_USER_AGENT: &str = concat!(
    "mwapi-rs/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/currentspace/mwapi-rs)"
);

/// Session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// API endpoint URL, or a bare domain like `en.wikipedia.org`
    pub endpoint: String,
    /// Parameters sent with every request (`format=json` is always added)
    pub default_params: Params,
    /// Session default options, applied over the built-in defaults
    pub default_options: RequestOptions,
    /// Defaults registered by extensions, applied in order beneath the
    /// session defaults
    pub defaults_layers: Vec<RequestOptions>,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

struct SessionInner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    default_params: Params,
    defaults: Options,
    tokens: TokenCache,
    error_handlers: ErrorHandlers,
    combiner: RequestCombiner,
    warned_user_agent: AtomicBool,
}

/// A session against one MediaWiki API endpoint.
///
/// Cloning is cheap; clones share defaults, tokens and the pending-request
/// registry, so requests issued through different clones still combine.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint)
            .field("defaults", &self.inner.defaults)
            .field("cached_tokens", &self.inner.tokens.len())
            .field("pending", &self.inner.combiner.pending_count())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over HTTP from the given configuration
    pub fn new(config: SessionConfig) -> Result<Self> {
        SessionBuilder::from_config(config).build()
    }

    /// Create a session for `endpoint` with default configuration
    pub fn new_with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(SessionConfig::new(endpoint))
    }

    pub fn builder(endpoint: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(endpoint)
    }

    /// The normalized API endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// The session's fully resolved default options.
    pub fn defaults(&self) -> &Options {
        &self.inner.defaults
    }

    /// Options for one call: built-in < extension < session < `options`.
    pub fn resolve_options(&self, options: &RequestOptions) -> Options {
        options.resolve(&self.inner.defaults)
    }

    /// Make one API request.
    ///
    /// The request may be combined with other requests issued in the same
    /// scheduling tick. If the options name a token type, the token is
    /// fetched (or taken from the cache) and sent under the token name.
    pub async fn request(&self, params: Params, options: RequestOptions) -> Result<Value> {
        let mut params = self.with_default_params(params);
        let resolved = self.resolve_options(&options);
        if let Some(token_type) = &resolved.token_type {
            let token = self.fetch_token(token_type, &options).await?;
            params.insert(resolved.token_name.clone(), ParamValue::from(token));
        }
        self.inner.combiner.submit(self, params, options).await
    }

    /// Lazily follow API continuation, yielding one response per request.
    ///
    /// The next request is only made when the stream is polled again, and
    /// no request is made after a response without continuation.
    pub fn request_and_continue(&self, params: Params, options: RequestOptions) -> ResponseStream {
        continuation::request_and_continue(self.clone(), params, options)
    }

    /// Follow continuation, folding responses into one value per batch.
    ///
    /// `initial` creates the accumulator for each batch and `reducer` folds
    /// one response into it; the accumulator is yielded whenever a response
    /// marks the batch complete. Truncation warnings are dropped unless the
    /// options say otherwise.
    pub fn request_and_continue_reducing_batch<A, R, I>(
        &self,
        params: Params,
        options: RequestOptions,
        reducer: R,
        initial: I,
    ) -> BoxStream<'static, Result<A>>
    where
        A: Send + 'static,
        R: FnMut(A, Value) -> A + Send + 'static,
        I: Fn() -> A + Send + 'static,
    {
        continuation::request_and_continue_reducing_batch(self.clone(), params, options, reducer, initial)
    }

    /// A token of `token_type` (`csrf`, `login`, ...), cached per session.
    ///
    /// `options` apply to the token query, except for the method and token
    /// options. Concurrent fetches of different token types share one request.
    pub async fn get_token(&self, token_type: &str, options: RequestOptions) -> Result<String> {
        self.fetch_token(token_type, &options).await
    }

    /// Forget all cached tokens, e.g. after logging in or out.
    pub fn clear_tokens(&self) {
        self.inner.tokens.clear();
    }

    pub fn clear_token(&self, token_type: &str) {
        self.inner.tokens.remove(token_type);
    }

    async fn fetch_token(&self, token_type: &str, options: &RequestOptions) -> Result<String> {
        if let Some(token) = self.inner.tokens.get(token_type) {
            return Ok(token);
        }

        // The token query itself must not require a token, and is always a GET.
        let mut options = options.clone();
        options.token_type = None;
        options.token_name = None;
        options.method = None;
        options.extensions.shift_remove(BAD_TOKEN_RETRIED);

        let params = self.with_default_params(params! {
            "action" => "query",
            "meta" => ParamValue::set(["tokens"]),
            "type" => ParamValue::set([token_type]),
        });
        let body = self.inner.combiner.submit(self, params, options).await?;
        let cached = self.inner.tokens.absorb_response(&body);
        debug!(token_type, cached, "Fetched tokens");

        token_from_response(&body, token_type)
            .ok_or_else(|| Error::Token(format!("response did not contain a {token_type} token")))
    }

    fn with_default_params(&self, params: Params) -> Params {
        let mut merged = self.inner.default_params.clone();
        merged.extend(params);
        merged
    }

    fn user_agent(&self, options: &Options) -> String {
        if let Some(user_agent) = &options.user_agent {
            return user_agent.clone();
        }
        if !self.inner.warned_user_agent.swap(true, Ordering::Relaxed) {
            warn!(
                "No user agent configured; set one identifying your tool and how to contact you \
                 (https://meta.wikimedia.org/wiki/User-Agent_policy)"
            );
        }
        LIBRARY_USER_AGENT.to_string()
    }

    fn request_headers(&self, options: &Options) -> Headers {
        let mut headers = Headers::new();
        headers.insert("user-agent".to_string(), self.user_agent(options));
        if let Some(authorization) = &options.authorization {
            headers.insert("authorization".to_string(), authorization.clone());
        }
        headers
    }

    async fn handle_errors(
        &self,
        params: &Params,
        options: &RequestOptions,
        response: &RawResponse,
        errors: Vec<ApiMessage>,
    ) -> Result<Value> {
        for error in &errors {
            let Some(code) = error.code() else {
                continue;
            };
            for handler in self.inner.error_handlers.handlers_for(code) {
                if let Some(body) = handler.handle(self, params, options, response, error).await? {
                    return Ok(body);
                }
            }
        }
        Err(ApiErrors::new(errors).into())
    }
}

fn deliver_warnings(options: &Options, body: &Value) {
    let Some(mut warnings) = extract_warnings(body) else {
        return;
    };
    if options.drop_truncated_result_warning {
        warnings = drop_truncation_warning(warnings);
    }
    if !warnings.is_empty() {
        (options.warn)(&warnings);
    }
}

#[async_trait]
impl RawRequester for Session {
    fn default_options(&self) -> &Options {
        &self.inner.defaults
    }

    async fn raw_request(&self, params: Params, options: RequestOptions) -> Result<Value> {
        let resolved = self.resolve_options(&options);
        let wire = encode_params(&params);
        if resolved.method == Method::Get && has_files(&wire) {
            return Err(Error::InvalidParams(
                "file parameters can only be sent with POST".to_string(),
            ));
        }

        let headers = self.request_headers(&resolved);
        let policy = RetryPolicy::from_options(&resolved);
        let mut budget = RetryBudget::new(resolved.max_retries_seconds);

        let (response, errors) = loop {
            debug!(method = %resolved.method, params = wire.len(), "Sending request");
            let response = match resolved.method {
                Method::Get => self.inner.transport.get(&wire, &headers).await?,
                Method::Post => self.inner.transport.post(&wire, &headers).await?,
            };
            let errors = extract_errors(&response.body);

            // A successful response is kept even if a proxy added `Retry-After`.
            if response.is_ok() && errors.is_none() {
                break (response, errors);
            }
            let decision = policy.should_retry(&response.headers, errors.as_deref(), &mut budget);
            if !decision.retry {
                break (response, errors);
            }
            info!(
                status = response.status,
                delay_seconds = decision.delay.as_secs_f64(),
                remaining_seconds = budget.remaining(),
                "Retrying request"
            );
            tokio::time::sleep(decision.delay).await;
        };

        if !response.is_ok() {
            return Err(Error::Http {
                status: response.status,
                body: response.body,
            });
        }
        if let Some(errors) = errors {
            return self.handle_errors(&params, &options, &response, errors).await;
        }

        deliver_warnings(&resolved, &response.body);
        Ok(response.body)
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    error_handlers: ErrorHandlers,
}

impl SessionBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_config(SessionConfig::new(endpoint))
    }

    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            error_handlers: ErrorHandlers::with_defaults(),
        }
    }

    pub fn default_params(mut self, params: Params) -> Self {
        self.config.default_params.extend(params);
        self
    }

    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.config.default_params.insert(key.into(), value.into());
        self
    }

    pub fn default_options(mut self, options: RequestOptions) -> Self {
        self.config.default_options = self.config.default_options.merged_with(&options);
        self
    }

    /// Register a defaults layer beneath the session defaults.
    pub fn defaults_layer(mut self, layer: RequestOptions) -> Self {
        self.config.defaults_layers.push(layer);
        self
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.default_options(RequestOptions::new().user_agent(user_agent))
    }

    /// Use `transport` instead of the default HTTP transport.
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Add an error handler after the ones already registered for `code`.
    pub fn error_handler(mut self, code: impl Into<String>, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handlers.register(code, handler);
        self
    }

    pub fn build(self) -> Result<Session> {
        let endpoint = normalize_endpoint(&self.config.endpoint)
            .map_err(|err| Error::Config(format!("{}: {err}", self.config.endpoint)))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(endpoint.as_str())?),
        };

        let mut defaults = Options::default();
        for layer in &self.config.defaults_layers {
            defaults.apply(layer);
        }
        defaults.apply(&self.config.default_options);

        let mut default_params = params! {"format" => "json"};
        default_params.extend(self.config.default_params);

        debug!(endpoint = %endpoint, "Created session");
        Ok(Session {
            inner: Arc::new(SessionInner {
                endpoint: endpoint.to_string(),
                transport,
                default_params,
                defaults,
                tokens: TokenCache::new(),
                error_handlers: self.error_handlers,
                combiner: RequestCombiner::new(),
                warned_user_agent: AtomicBool::new(false),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_domain_endpoint() {
        let session = Session::new_with_endpoint("en.wikipedia.org").unwrap();
        assert_eq!(session.endpoint(), "https://en.wikipedia.org/w/api.php");
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = Session::new_with_endpoint("no scheme/here").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_layers_precedence() {
        let session = Session::builder("http://localhost/api.php")
            .defaults_layer(RequestOptions::new().max_retries_seconds(10.0).token_name("lgtoken"))
            .defaults_layer(RequestOptions::new().max_retries_seconds(20.0))
            .default_options(RequestOptions::new().max_retries_seconds(30.0))
            .build()
            .unwrap();

        assert_eq!(session.defaults().max_retries_seconds, 30.0);
        assert_eq!(session.defaults().token_name, "lgtoken");

        let resolved = session.resolve_options(&RequestOptions::new().max_retries_seconds(5.0));
        assert_eq!(resolved.max_retries_seconds, 5.0);
        assert_eq!(resolved.retry_after_readonly_seconds, 30.0);
    }

    #[test]
    fn test_user_agent_precedence() {
        let session = Session::builder("http://localhost/api.php")
            .user_agent("session-agent")
            .build()
            .unwrap();
        assert_eq!(session.user_agent(&session.resolve_options(&RequestOptions::new())), "session-agent");
        assert_eq!(
            session.user_agent(&session.resolve_options(&RequestOptions::new().user_agent("call-agent"))),
            "call-agent"
        );

        let bare = Session::new_with_endpoint("http://localhost/api.php").unwrap();
        assert_eq!(bare.user_agent(bare.defaults()), LIBRARY_USER_AGENT);
        assert!(bare.inner.warned_user_agent.load(Ordering::Relaxed));
    }

    #[test]
    fn test_default_params_include_format() {
        let session = Session::builder("http://localhost/api.php")
            .default_param("formatversion", 2)
            .build()
            .unwrap();
        let params = session.with_default_params(params! {"action" => "query"});
        let wire = encode_params(&params);
        assert_eq!(wire["format"].as_text(), Some("json"));
        assert_eq!(wire["formatversion"].as_text(), Some("2"));
        assert_eq!(wire["action"].as_text(), Some("query"));
    }
}
