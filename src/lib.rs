//! # fetchnet
//!
//! The HTTP transport and response cache of a browser engine.
//!
//! `fetchnet` speaks HTTP/0.9, 1.0 and 1.1 over plain TCP, keeps one
//! connection per `(host, port)` driven by a dedicated I/O thread, and puts
//! a validating response cache in front of it that collapses concurrent
//! loads of the same URL into a single upstream fetch.
//!
//! ## Features
//!
//! - **Connections**: explicit per-connection state machine, keep-alive,
//!   chunked transfer decoding, bounded retry of transport failures
//! - **Cache**: `max-age`/`Expires`/heuristic freshness, `If-None-Match` and
//!   `If-Modified-Since` revalidation, request coalescing
//! - **Local schemes**: `file:`, `about:` (mapped into a directory) and `data:`
//! - **Spooled bodies**: response bodies live in unlinked temporary files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fetchnet::Client;
//! use std::time::Duration;
//!
//! let client = Client::new()?;
//! let request = client.request();
//! request.open("GET", "http://example.com/")?;
//! request.send()?;
//! client.wait(&request, Duration::from_secs(10));
//! println!("Status: {}", request.status());
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and ready states
//! - [`http`] - Messages, headers, dates, chunked framing and bodies
//! - [`dns`] - Pluggable host resolution
//! - [`socket`] - Connections and the I/O loop
//! - [`cache`] - Response cache
//! - [`urlrequest`] - The request API and configuration
//!
//! ## Threading
//!
//! All socket work happens on the I/O thread. `Request::send` and
//! `Request::abort` may be called from any thread; completion callbacks run
//! inside [`Client::poll`] on the calling thread.

pub mod base;
pub mod cache;
pub mod client;
pub mod dns;
pub mod http;
pub mod socket;
pub mod urlrequest;

pub use base::neterror::NetError;
pub use base::readystate::ReadyState;
pub use client::{Client, ClientBuilder};
pub use urlrequest::{ClientConfig, Request};
