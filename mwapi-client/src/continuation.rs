// API continuation
// Follows `continue` tokens lazily: each request is made only when the
// consumer pulls the next element of the stream.

use crate::session::Session;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use mwapi_core::{
    extract_continuation, is_batch_complete, ContinuationState, ParamValue, Params, RequestOptions,
    Result,
};
use serde_json::Value;
use tracing::trace;

/// Responses of a continued request, in order.
pub type ResponseStream = BoxStream<'static, Result<Value>>;

enum DriverState {
    Start,
    Continuing(ContinuationState),
    Done,
}

/// The original parameters with the continuation tokens laid over them.
fn continue_params(params: &Params, continuation: &ContinuationState) -> Params {
    let mut params = params.clone();
    for (key, value) in continuation {
        params.insert(key.clone(), ParamValue::from(value.as_str()));
    }
    params
}

async fn next_page(
    session: Session,
    request_params: Option<Params>,
    options: RequestOptions,
) -> Result<Option<(Value, DriverState)>> {
    let Some(request_params) = request_params else {
        return Ok(None);
    };
    let body = session.request(request_params, options).await?;
    let next = match extract_continuation(&body) {
        Some(continuation) => {
            trace!(?continuation, "Continuing request");
            DriverState::Continuing(continuation)
        }
        None => DriverState::Done,
    };
    Ok(Some((body, next)))
}

pub(crate) fn request_and_continue(session: Session, params: Params, options: RequestOptions) -> ResponseStream {
    stream::try_unfold(DriverState::Start, move |state| {
        let request_params = match state {
            DriverState::Start => Some(params.clone()),
            DriverState::Continuing(continuation) => Some(continue_params(&params, &continuation)),
            DriverState::Done => None,
        };
        next_page(session.clone(), request_params, options.clone())
    })
    .boxed()
}

struct BatchState<A, R, I> {
    responses: ResponseStream,
    reducer: R,
    initial: I,
    accumulator: Option<A>,
}

async fn next_batch<A, R, I>(mut state: BatchState<A, R, I>) -> Result<Option<(A, BatchState<A, R, I>)>>
where
    R: FnMut(A, Value) -> A,
    I: Fn() -> A,
{
    while let Some(body) = state.responses.try_next().await? {
        let complete = is_batch_complete(&body);
        let accumulator = match state.accumulator.take() {
            Some(accumulator) => accumulator,
            None => (state.initial)(),
        };
        let accumulator = (state.reducer)(accumulator, body);
        if complete {
            return Ok(Some((accumulator, state)));
        }
        state.accumulator = Some(accumulator);
    }
    // A batch the server never marked complete still goes to the consumer.
    Ok(state.accumulator.take().map(|accumulator| (accumulator, state)))
}

pub(crate) fn request_and_continue_reducing_batch<A, R, I>(
    session: Session,
    params: Params,
    mut options: RequestOptions,
    reducer: R,
    initial: I,
) -> BoxStream<'static, Result<A>>
where
    A: Send + 'static,
    R: FnMut(A, Value) -> A + Send + 'static,
    I: Fn() -> A + Send + 'static,
{
    if options.drop_truncated_result_warning.is_none() {
        options.drop_truncated_result_warning = Some(true);
    }

    let state = BatchState {
        responses: request_and_continue(session, params, options),
        reducer,
        initial,
        accumulator: None,
    };
    stream::try_unfold(state, next_batch).boxed()
}
