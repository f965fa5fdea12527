// MediaWiki Action API client
// Sessions combine compatible concurrent requests into one API call,
// follow continuation lazily, retry transient failures and manage tokens.

pub mod combiner;
pub mod continuation;
pub mod handlers;
pub mod logging;
pub mod session;
pub mod tokens;

pub use combiner::{RawRequester, RequestCombiner};
pub use continuation::ResponseStream;
pub use handlers::{BadTokenHandler, ErrorHandler, ErrorHandlers};
pub use session::{Session, SessionBuilder, SessionConfig, LIBRARY_USER_AGENT};
pub use tokens::TokenCache;

pub use mwapi_core::{
    params, response_boolean, ApiErrors, ApiMessage, Error, FileParam, Method, Options, ParamValue,
    Params, RequestOptions, Result,
};
pub use mwapi_transport::{HttpTransport, MockTransport, RawResponse, Transport};
