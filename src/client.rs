//! The client context.
//!
//! A [`Client`] owns the connection manager (and its I/O thread), the
//! response cache and the completion queue. Requests are created from it and
//! report back through it; their callbacks run when the embedder calls
//! [`Client::poll`].
//!
//! # Example
//!
//! ```rust,ignore
//! use fetchnet::Client;
//! use std::time::Duration;
//!
//! let client = Client::builder().about_path("/usr/share/browser/about").build()?;
//! let request = client.request();
//! request.on_complete(|r| println!("{} {}", r.status(), r.text().unwrap_or_default()));
//! request.open("GET", "http://example.com/")?;
//! request.send()?;
//! client.wait(&request, Duration::from_secs(10));
//! ```

use crate::base::neterror::NetError;
use crate::base::readystate::ReadyState;
use crate::cache::CacheManager;
use crate::dns::{DnsResolverWithOverrides, HickoryResolver, Resolve};
use crate::http::request::HttpVersion;
use crate::socket::pool::ConnectionManager;
use crate::urlrequest::context::ClientConfig;
use crate::urlrequest::request::{Request, RequestInner};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A load that finished on the I/O loop and awaits its callback.
pub(crate) struct Completion {
    pub(crate) request: Weak<RequestInner>,
    pub(crate) generation: u64,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) connections: ConnectionManager,
    pub(crate) cache: CacheManager,
    completions: UnboundedSender<Completion>,
    completed: Mutex<UnboundedReceiver<Completion>>,
    next_request_id: AtomicU64,
}

impl ClientInner {
    pub(crate) fn post(&self, completion: Completion) {
        if self.completions.send(completion).is_err() {
            tracing::trace!("completion queue closed");
        }
    }
}

/// Handle to a client context. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// A client with the default configuration and resolver.
    pub fn new() -> Result<Self, NetError> {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    /// A new, unopened request.
    pub fn request(&self) -> Request {
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        Request::new(Arc::clone(&self.inner), id)
    }

    /// Run the callbacks of every load that has completed so far. Returns
    /// how many loads reached `Done`.
    ///
    /// Never blocks.
    pub fn poll(&self) -> usize {
        let ready: Vec<Completion> = {
            let mut completed = self.inner.completed.lock().unwrap_or_else(PoisonError::into_inner);
            std::iter::from_fn(|| completed.try_recv().ok()).collect()
        };
        ready.into_iter().filter(|c| deliver(c)).count()
    }

    /// Poll until `done` returns true or `timeout` elapses. Returns the last
    /// value of `done`.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.inner.connections.runtime().is_io_thread() {
                return false;
            }

            let next = {
                let mut completed = self.inner.completed.lock().unwrap_or_else(PoisonError::into_inner);
                self.inner
                    .connections
                    .runtime()
                    .handle()
                    .block_on(async { tokio::time::timeout(remaining, completed.recv()).await })
            };
            match next {
                Ok(Some(completion)) => {
                    deliver(&completion);
                }
                Ok(None) => return done(),
                Err(_elapsed) => {}
            }
        }
    }

    /// Poll until `request` is `Done`. Returns `false` on timeout.
    pub fn wait(&self, request: &Request, timeout: Duration) -> bool {
        self.run_until(timeout, || request.ready_state() == ReadyState::Done)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("connections", &self.inner.connections)
            .field("cache_entries", &self.inner.cache.len())
            .finish()
    }
}

fn deliver(completion: &Completion) -> bool {
    match completion.request.upgrade() {
        Some(inner) => Request::from_inner(inner).deliver(completion.generation),
        None => false,
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    resolver: Option<Arc<dyn Resolve>>,
    dns_overrides: HashMap<String, Vec<SocketAddr>>,
}

impl ClientBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.config.http_version = version;
        self
    }

    pub fn about_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.about_path = Some(path.into());
        self
    }

    pub fn spool_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.spool_dir = Some(path.into());
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = Some(capacity);
        self
    }

    pub fn max_header_line(mut self, max: usize) -> Self {
        self.config.max_header_line = max;
        self
    }

    /// Use a custom resolver instead of hickory-dns.
    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Pin `host` to fixed addresses, bypassing the resolver.
    pub fn dns_override(mut self, host: impl Into<String>, addrs: Vec<SocketAddr>) -> Self {
        self.dns_overrides.insert(host.into(), addrs);
        self
    }

    pub fn build(self) -> Result<Client, NetError> {
        let base: Arc<dyn Resolve> = self
            .resolver
            .unwrap_or_else(|| Arc::new(HickoryResolver::new()));
        let resolver: Arc<dyn Resolve> = if self.dns_overrides.is_empty() {
            base
        } else {
            Arc::new(DnsResolverWithOverrides::new(base, self.dns_overrides))
        };

        let connections = ConnectionManager::new(resolver, self.config.connection_settings())?;
        let cache = CacheManager::new(self.config.cache_capacity);
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(
            user_agent = %self.config.user_agent,
            version = self.config.http_version.number(),
            "client created"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                connections,
                cache,
                completions: tx,
                completed: Mutex::new(rx),
                next_request_id: AtomicU64::new(1),
            }),
        })
    }
}
