// MediaWiki Action API core
// Pure request/response logic shared by the transport and client crates:
// - Parameter values and their wire encoding
// - Option layering and the request combining rules
// - Error/warning/continuation envelope interpretation
// - Retry decisions for transient server conditions

pub mod combine;
pub mod error;
pub mod options;
pub mod params;
pub mod response;
pub mod retry;

pub use combine::{combine_options, combine_params};
pub use error::{ApiErrors, Error, Result};
pub use options::{log_warnings, Method, Options, RequestOptions, WarnHandler};
pub use params::{
    encode_params, encode_value, has_files, FileParam, ParamValue, Params, Scalar, WireParams,
    WireValue, MULTI_VALUE_SEPARATOR,
};
pub use response::{
    drop_truncation_warning, extract_continuation, extract_errors, extract_warnings,
    is_batch_complete, response_boolean, ApiMessage, ContinuationState,
};
pub use retry::{Headers, RetryBudget, RetryDecision, RetryPolicy, RETRY_AFTER_HEADER};
