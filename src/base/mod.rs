//! Base types and error handling.
//!
//! Provides foundational types mirroring Chromium's `net/base/`:
//! - [`NetError`](neterror::NetError): Network error codes matching `net_error_list.h`
//! - [`ReadyState`](readystate::ReadyState): Request progress states

pub mod context;
pub mod neterror;
pub mod readystate;
