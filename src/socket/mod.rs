//! Connections and the I/O loop that drives them.
//!
//! - [`pool`]: `ConnectionManager`, one connection per `(host, port)`
//! - [`connection`]: the per-connection HTTP/1.x state machine
//! - [`exchange`]: a request in flight and the `Notifiable` callback seam
//! - [`runtime`]: the dedicated I/O thread

pub mod connection;
pub mod exchange;
pub mod pool;
pub mod runtime;

pub use connection::{ConnectionSettings, State};
pub use exchange::{Exchange, Notifiable};
pub use pool::ConnectionManager;
