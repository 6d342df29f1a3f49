//! DNS Resolution Module
//!
//! Pluggable host resolution for connections:
//! - System resolver (getaddrinfo via the blocking pool)
//! - Async hickory-dns resolver
//! - Hostname-to-IP override mechanism
//!
//! # Example
//!
//! ```rust,ignore
//! use fetchnet::dns::{resolve_host, HickoryResolver};
//!
//! let resolver = HickoryResolver::new();
//! let addrs = resolve_host(&resolver, "example.com", 80).await?;
//! ```

mod gai;
mod hickory;
mod resolve;

pub use gai::{GaiResolver, SocketAddrs};
pub use hickory::HickoryResolver;
pub use resolve::{resolve_host, Addrs, DnsResolverWithOverrides, Name, Resolve, Resolving};
