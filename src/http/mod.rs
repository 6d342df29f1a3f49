pub mod body;
pub mod chunked;
pub mod date;
pub mod headers;
pub mod request;
pub mod response;
pub mod retry;

// Re-exports for convenience
pub use body::{Body, BodyReader, Spool};
pub use chunked::ChunkedDecoder;
pub use date::{format_time, parse_time};
pub use headers::HeaderList;
pub use request::{HttpVersion, RequestMessage};
pub use response::ResponseMessage;
pub use retry::{RetryPolicy, RetryReason, MAX_RETRY_COUNT};
