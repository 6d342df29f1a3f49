//! Requests: the caller-facing API.
//!
//! - [`request`]: the `Request` object and its ready states
//! - `job`: scheme dispatch and local (`file:`, `about:`, `data:`) loads
//! - [`data`]: `data:` URL decoding
//! - [`context`]: client configuration

pub mod context;
pub mod data;
pub(crate) mod job;
pub mod request;

pub use context::ClientConfig;
pub use data::DataUrl;
pub use request::Request;
