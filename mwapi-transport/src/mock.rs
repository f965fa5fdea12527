// In-memory transport for tests and offline embedding
// Records every call and answers from a responder closure

use crate::transport::{RawResponse, Transport, TransportError};
use async_trait::async_trait;
use mwapi_core::{Headers, Method, WireParams};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// One call received by a [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub params: WireParams,
    pub headers: Headers,
}

impl RecordedCall {
    /// Text value of an encoded parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|value| value.as_text())
    }
}

type Responder = Box<dyn Fn(&RecordedCall) -> Result<RawResponse, TransportError> + Send + Sync>;

pub struct MockTransport {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls with `responses` in order; further calls fail.
    pub fn with_responses(responses: impl IntoIterator<Item = RawResponse>) -> Self {
        let queue = Mutex::new(responses.into_iter().collect::<VecDeque<_>>());
        Self::new(move |_| {
            queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| TransportError::Protocol("no more mock responses".to_string()))
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, method: Method, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError> {
        let call = RecordedCall {
            method,
            params: params.clone(),
            headers: headers.clone(),
        };
        let response = (self.responder)(&call);
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
        response
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError> {
        self.record(Method::Get, params, headers)
    }

    async fn post(&self, params: &WireParams, headers: &Headers) -> Result<RawResponse, TransportError> {
        self.record(Method::Post, params, headers)
    }
}
