pub mod http;
pub mod mock;
pub mod transport;

pub use http::{normalize_endpoint, HttpTransport, DEFAULT_API_PATH};
pub use mock::{MockTransport, RecordedCall};
pub use transport::{RawResponse, Transport, TransportError};
