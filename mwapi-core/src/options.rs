// Request options and default layering
// Built-in defaults < extension layers < session defaults < per-call options

use crate::response::ApiMessage;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Callback receiving the warnings of a successful response.
pub type WarnHandler = Arc<dyn Fn(&[ApiMessage]) + Send + Sync>;

/// HTTP method used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Default warn handler: report each warning through `tracing`.
pub fn log_warnings(warnings: &[ApiMessage]) {
    for warning in warnings {
        warn!(
            code = warning.code().unwrap_or("unknown"),
            module = warning.module().unwrap_or("main"),
            "API warning: {}",
            warning.text().unwrap_or("")
        );
    }
}

/// Fully resolved options for one request.
#[derive(Clone)]
pub struct Options {
    pub method: Method,
    /// Total seconds that may be spent sleeping between retries.
    pub max_retries_seconds: f64,
    pub retry_after_maxlag_seconds: f64,
    pub retry_after_readonly_seconds: f64,
    pub warn: WarnHandler,
    pub drop_truncated_result_warning: bool,
    pub token_type: Option<String>,
    pub token_name: String,
    pub user_agent: Option<String>,
    pub authorization: Option<String>,
    /// Options defined by collaborators; compared textually when combining.
    pub extensions: IndexMap<String, Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            method: Method::Get,
            max_retries_seconds: 65.0,
            retry_after_maxlag_seconds: 5.0,
            retry_after_readonly_seconds: 30.0,
            warn: Arc::new(log_warnings),
            drop_truncated_result_warning: false,
            token_type: None,
            token_name: "token".to_string(),
            user_agent: None,
            authorization: None,
            extensions: IndexMap::new(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("method", &self.method)
            .field("max_retries_seconds", &self.max_retries_seconds)
            .field("retry_after_maxlag_seconds", &self.retry_after_maxlag_seconds)
            .field("retry_after_readonly_seconds", &self.retry_after_readonly_seconds)
            .field("drop_truncated_result_warning", &self.drop_truncated_result_warning)
            .field("token_type", &self.token_type)
            .field("token_name", &self.token_name)
            .field("user_agent", &self.user_agent)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl Options {
    /// Apply a layer on top of these options; values set in the layer win.
    pub fn apply(&mut self, layer: &RequestOptions) {
        if let Some(method) = layer.method {
            self.method = method;
        }
        if let Some(seconds) = layer.max_retries_seconds {
            self.max_retries_seconds = seconds;
        }
        if let Some(seconds) = layer.retry_after_maxlag_seconds {
            self.retry_after_maxlag_seconds = seconds;
        }
        if let Some(seconds) = layer.retry_after_readonly_seconds {
            self.retry_after_readonly_seconds = seconds;
        }
        if let Some(warn) = &layer.warn {
            self.warn = Arc::clone(warn);
        }
        if let Some(drop) = layer.drop_truncated_result_warning {
            self.drop_truncated_result_warning = drop;
        }
        if let Some(token_type) = &layer.token_type {
            self.token_type = Some(token_type.clone());
        }
        if let Some(token_name) = &layer.token_name {
            self.token_name = token_name.clone();
        }
        if let Some(user_agent) = &layer.user_agent {
            self.user_agent = Some(user_agent.clone());
        }
        if let Some(authorization) = &layer.authorization {
            self.authorization = Some(authorization.clone());
        }
        for (key, value) in &layer.extensions {
            self.extensions.insert(key.clone(), value.clone());
        }
    }

    /// These options with `layer` applied on top.
    pub fn layered(&self, layer: &RequestOptions) -> Options {
        let mut options = self.clone();
        options.apply(layer);
        options
    }
}

/// A partial set of options; unset fields fall through to the layer below.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub max_retries_seconds: Option<f64>,
    pub retry_after_maxlag_seconds: Option<f64>,
    pub retry_after_readonly_seconds: Option<f64>,
    pub warn: Option<WarnHandler>,
    pub drop_truncated_result_warning: Option<bool>,
    pub token_type: Option<String>,
    pub token_name: Option<String>,
    pub user_agent: Option<String>,
    pub authorization: Option<String>,
    pub extensions: IndexMap<String, Value>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("max_retries_seconds", &self.max_retries_seconds)
            .field("warn", &self.warn.as_ref().map(|_| "<handler>"))
            .field("token_type", &self.token_type)
            .field("token_name", &self.token_name)
            .field("user_agent", &self.user_agent)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn post(self) -> Self {
        self.method(Method::Post)
    }

    pub fn max_retries_seconds(mut self, seconds: f64) -> Self {
        self.max_retries_seconds = Some(seconds);
        self
    }

    pub fn retry_after_maxlag_seconds(mut self, seconds: f64) -> Self {
        self.retry_after_maxlag_seconds = Some(seconds);
        self
    }

    pub fn retry_after_readonly_seconds(mut self, seconds: f64) -> Self {
        self.retry_after_readonly_seconds = Some(seconds);
        self
    }

    pub fn warn<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[ApiMessage]) + Send + Sync + 'static,
    {
        self.warn = Some(Arc::new(handler));
        self
    }

    pub fn drop_truncated_result_warning(mut self, drop: bool) -> Self {
        self.drop_truncated_result_warning = Some(drop);
        self
    }

    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn token_name(mut self, token_name: impl Into<String>) -> Self {
        self.token_name = Some(token_name.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Resolve against fully specified defaults.
    pub fn resolve(&self, defaults: &Options) -> Options {
        defaults.layered(self)
    }

    /// Merge another layer on top of this one; values set in `over` win.
    pub fn merged_with(&self, over: &RequestOptions) -> RequestOptions {
        RequestOptions {
            method: over.method.or(self.method),
            max_retries_seconds: over.max_retries_seconds.or(self.max_retries_seconds),
            retry_after_maxlag_seconds: over
                .retry_after_maxlag_seconds
                .or(self.retry_after_maxlag_seconds),
            retry_after_readonly_seconds: over
                .retry_after_readonly_seconds
                .or(self.retry_after_readonly_seconds),
            warn: over.warn.clone().or_else(|| self.warn.clone()),
            drop_truncated_result_warning: over
                .drop_truncated_result_warning
                .or(self.drop_truncated_result_warning),
            token_type: over.token_type.clone().or_else(|| self.token_type.clone()),
            token_name: over.token_name.clone().or_else(|| self.token_name.clone()),
            user_agent: over.user_agent.clone().or_else(|| self.user_agent.clone()),
            authorization: over
                .authorization
                .clone()
                .or_else(|| self.authorization.clone()),
            extensions: {
                let mut extensions = self.extensions.clone();
                extensions.extend(over.extensions.clone());
                extensions
            },
        }
    }
}
