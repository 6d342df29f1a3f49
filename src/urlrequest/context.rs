//! Client configuration.
//!
//! Everything here is plain data and can be loaded from JSON. The parts
//! that cannot (a custom resolver, DNS overrides) are set on
//! [`ClientBuilder`](crate::client::ClientBuilder).

use crate::base::neterror::NetError;
use crate::http::request::HttpVersion;
use crate::http::retry::{RetryPolicy, MAX_RETRY_COUNT};
use crate::socket::connection::{ConnectionSettings, DEFAULT_MAX_HEADER_LINE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_AGENT: &str = concat!("fetchnet/", env!("CARGO_PKG_VERSION"));

/// Configuration options for a [`Client`](crate::client::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default `User-Agent` for every request.
    pub user_agent: String,

    /// Version used for outgoing requests (9, 10 or 11).
    pub http_version: HttpVersion,

    /// Directory `about:` URLs are mapped into. `about:` loads fail when unset.
    pub about_path: Option<PathBuf>,

    /// Where response bodies are spooled. Defaults to the system temp dir.
    pub spool_dir: Option<PathBuf>,

    /// Resends after a transport failure.
    pub max_retries: usize,

    /// Maximum number of cache entries; unbounded when `None`.
    pub cache_capacity: Option<usize>,

    /// Longest accepted status, header or chunk-size line.
    pub max_header_line: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_version: HttpVersion::Http11,
            about_path: None,
            spool_dir: None,
            max_retries: MAX_RETRY_COUNT,
            cache_capacity: None,
            max_header_line: DEFAULT_MAX_HEADER_LINE,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(|e| {
            tracing::warn!(error = %e, "invalid client configuration");
            NetError::InvalidArgument
        })
    }

    pub fn to_json(&self) -> Result<String, NetError> {
        serde_json::to_string_pretty(self).map_err(|_| NetError::InvalidArgument)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn about_path(&self) -> Option<&Path> {
        self.about_path.as_deref()
    }

    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            retry: RetryPolicy {
                max_retries: self.max_retries,
            },
            max_header_line: self.max_header_line,
        }
    }
}
