// Request combining
// Requests issued within the same scheduling tick are merged into a single
// API call when their parameters and options are compatible. Every merged
// caller receives the same result.

use async_trait::async_trait;
use mwapi_core::{combine_options, combine_params, Error, Options, Params, RequestOptions, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Anything that can perform a single, uncombined API request.
#[async_trait]
pub trait RawRequester: Clone + Send + Sync + 'static {
    /// Defaults that per-call options are resolved against.
    fn default_options(&self) -> &Options;

    async fn raw_request(&self, params: Params, options: RequestOptions) -> Result<Value>;
}

type Waiter = oneshot::Sender<Result<Value>>;

struct PendingRequest {
    id: u64,
    params: Params,
    options: RequestOptions,
    waiters: Vec<Waiter>,
}

impl PendingRequest {
    /// Merge another request into this one if compatible.
    fn try_absorb(&mut self, params: &Params, options: &RequestOptions, defaults: &Options) -> bool {
        let Some(merged_params) = combine_params(&self.params, params) else {
            return false;
        };
        let Some(merged_options) = combine_options(&self.options, options, defaults) else {
            return false;
        };
        self.params = merged_params;
        self.options = merged_options;
        true
    }
}

type PendingRegistry = Arc<Mutex<Vec<PendingRequest>>>;

fn lock(pending: &PendingRegistry) -> MutexGuard<'_, Vec<PendingRequest>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take(pending: &PendingRegistry, id: u64) -> Option<PendingRequest> {
    let mut pending = lock(pending);
    let index = pending.iter().position(|request| request.id == id)?;
    Some(pending.remove(index))
}

async fn dispatch<R: RawRequester>(requester: R, request: PendingRequest) {
    debug!(
        request = request.id,
        callers = request.waiters.len(),
        params = request.params.len(),
        "Dispatching request"
    );
    trace!(params = ?request.params, "Dispatched parameters");

    let result = requester.raw_request(request.params, request.options).await;
    for waiter in request.waiters {
        // The caller may have stopped waiting; that is not an error.
        let _ = waiter.send(result.clone());
    }
}

/// Owns a pending entry while its batching window is open.
///
/// If the owning caller is dropped before the window closes, the entry is
/// still dispatched so that callers merged into it get their answer.
struct Window<R: RawRequester> {
    pending: PendingRegistry,
    id: u64,
    requester: Option<R>,
}

impl<R: RawRequester> Window<R> {
    fn close(mut self) -> Option<(R, PendingRequest)> {
        let requester = self.requester.take()?;
        take(&self.pending, self.id).map(|request| (requester, request))
    }
}

impl<R: RawRequester> Drop for Window<R> {
    fn drop(&mut self) {
        let Some(requester) = self.requester.take() else {
            return;
        };
        let Some(request) = take(&self.pending, self.id) else {
            return;
        };
        if request.waiters.iter().all(|waiter| waiter.is_closed()) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(dispatch(requester, request));
            }
            Err(_) => debug!(request = self.id, "No runtime left to dispatch abandoned request"),
        }
    }
}

/// Registry of requests waiting for the end of their batching window.
///
/// When several pending requests could absorb a new one, the oldest wins.
#[derive(Default)]
pub struct RequestCombiner {
    pending: PendingRegistry,
    next_id: AtomicU64,
}

impl RequestCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently waiting to be dispatched.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Submit a request, merging it into a compatible pending one if possible.
    ///
    /// A request that cannot be merged opens a window of one scheduling tick
    /// inside the caller's own future. Futures polled by the same task in
    /// that tick (for example the branches of `tokio::join!`) join it, on any
    /// runtime flavor. The merged request is then dispatched through
    /// `requester` on a spawned task.
    pub async fn submit<R: RawRequester>(
        &self,
        requester: &R,
        params: Params,
        options: RequestOptions,
    ) -> Result<Value> {
        let (waiter, result) = oneshot::channel();

        let window = {
            let mut pending = lock(&self.pending);
            let defaults = requester.default_options();
            match pending
                .iter_mut()
                .position(|existing| existing.try_absorb(&params, &options, defaults))
            {
                Some(index) => {
                    let existing = &mut pending[index];
                    existing.waiters.push(waiter);
                    debug!(
                        request = existing.id,
                        callers = existing.waiters.len(),
                        "Combined request with pending request"
                    );
                    None
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    pending.push(PendingRequest {
                        id,
                        params,
                        options,
                        waiters: vec![waiter],
                    });
                    Some(Window {
                        pending: Arc::clone(&self.pending),
                        id,
                        requester: Some(requester.clone()),
                    })
                }
            }
        };

        if let Some(window) = window {
            tokio::task::yield_now().await;
            if let Some((requester, request)) = window.close() {
                tokio::spawn(dispatch(requester, request));
            }
        }

        result.await.map_err(|_| Error::Dispatch)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mwapi_core::{params, ApiErrors, ApiMessage, ParamValue};
    use serde_json::json;

    #[derive(Clone, Default)]
    struct RecordingRequester {
        defaults: Arc<Options>,
        calls: Arc<Mutex<Vec<Params>>>,
        fail: bool,
    }

    impl RecordingRequester {
        fn calls(&self) -> Vec<Params> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RawRequester for RecordingRequester {
        fn default_options(&self) -> &Options {
            &self.defaults
        }

        async fn raw_request(&self, params: Params, _options: RequestOptions) -> Result<Value> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(params);
                calls.len()
            };
            if self.fail {
                let error: ApiMessage = serde_json::from_value(json!({"code": "internal_api_error"})).unwrap();
                return Err(ApiErrors::new(vec![error]).into());
            }
            Ok(json!({"call": call}))
        }
    }

    #[tokio::test]
    async fn test_same_tick_requests_combine() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        let (a, b) = tokio::join!(
            combiner.submit(&requester, params! {"meta" => ParamValue::set(["siteinfo"])}, RequestOptions::new()),
            combiner.submit(&requester, params! {"meta" => ParamValue::set(["userinfo"])}, RequestOptions::new()),
        );

        assert_eq!(a.unwrap(), json!({"call": 1}));
        assert_eq!(b.unwrap(), json!({"call": 1}));
        let calls = requester.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["meta"].encode_text().as_deref(), Some("siteinfo|userinfo"));
        assert_eq!(combiner.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_incompatible_requests_dispatch_separately() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        let (a, b) = tokio::join!(
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()),
            combiner.submit(&requester, params! {"action" => "parse"}, RequestOptions::new()),
        );

        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(requester.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_requests_do_not_combine() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()).await.unwrap();
        combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()).await.unwrap();

        assert_eq!(requester.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_first_matching_pending_request_wins() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        let (a, b, c) = tokio::join!(
            combiner.submit(&requester, params! {"action" => "query", "list" => "allpages"}, RequestOptions::new()),
            combiner.submit(&requester, params! {"action" => "query", "list" => "allusers"}, RequestOptions::new()),
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()),
        );

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a, c);
        assert_ne!(a, b);
        let calls = requester.calls();
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_combined_caller() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester {
            fail: true,
            ..Default::default()
        };

        let (a, b) = tokio::join!(
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()),
            combiner.submit(&requester, params! {"formatversion" => 2}, RequestOptions::new()),
        );

        for result in [a, b] {
            let err = result.unwrap_err();
            assert_eq!(err.api_errors().map(ApiErrors::code), Some("internal_api_error"));
        }
        assert_eq!(requester.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_option_conflict_prevents_combining() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        let (a, b) = tokio::join!(
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new().post()),
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()),
        );
        a.unwrap();
        b.unwrap();
        // explicit POST against the default GET is compatible; POST wins
        assert_eq!(requester.calls().len(), 1);

        let (c, d) = tokio::join!(
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new().user_agent("a")),
            combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new().user_agent("b")),
        );
        c.unwrap();
        d.unwrap();
        assert_eq!(requester.calls().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_tick_requests_combine_on_worker_threads() {
        for _ in 0..200 {
            let combiner = RequestCombiner::new();
            let requester = RecordingRequester::default();

            let (a, b) = tokio::join!(
                combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()),
                combiner.submit(&requester, params! {"formatversion" => 2}, RequestOptions::new()),
            );
            assert_eq!(a.unwrap(), b.unwrap());
            assert_eq!(requester.calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_abandoned_window_still_answers_merged_caller() {
        let combiner = RequestCombiner::new();
        let requester = RecordingRequester::default();

        let mut owner = Box::pin(combiner.submit(&requester, params! {"action" => "query"}, RequestOptions::new()));
        assert!(futures::poll!(owner.as_mut()).is_pending());
        assert_eq!(combiner.pending_count(), 1);

        let merged = combiner.submit(&requester, params! {"formatversion" => 2}, RequestOptions::new());
        let mut merged = Box::pin(merged);
        assert!(futures::poll!(merged.as_mut()).is_pending());
        drop(owner);

        assert_eq!(merged.await.unwrap(), json!({"call": 1}));
        assert_eq!(combiner.pending_count(), 0);
        assert_eq!(requester.calls().len(), 1);
    }
}
