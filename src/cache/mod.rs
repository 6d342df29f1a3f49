//! Response cache.
//!
//! [`CacheManager`] maps URLs to [`CacheEntry`] values. An entry keeps the
//! last response for its URL with a spooled body, decides freshness, adds
//! validators when revalidating, and coalesces concurrent GET/HEAD requests
//! into a single upstream fetch.

pub mod entry;
pub mod manager;

pub use entry::CacheEntry;
pub use manager::CacheManager;
