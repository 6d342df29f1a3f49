//! The caller-facing request object.
//!
//! A [`Request`] is opened with a method and URL, optionally given headers,
//! a body and a completion callback, and then sent. Local schemes finish
//! inside `send`. Network loads finish on the I/O loop; their callback runs
//! later, on whichever thread calls [`Client::poll`](crate::client::Client::poll).
//!
//! Every send carries a generation number. `open` and `abort` bump it, so
//! late results from a superseded attempt are recognized and dropped.

use crate::base::neterror::NetError;
use crate::base::readystate::ReadyState;
use crate::cache::CacheEntry;
use crate::client::{ClientInner, Completion};
use crate::http::body::{Body, Spool};
use crate::http::headers::is_token;
use crate::http::request::RequestMessage;
use crate::http::response::ResponseMessage;
use crate::socket::exchange::{Exchange, Notifiable};
use crate::urlrequest::job::{self, Scheme};
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use url::Url;

/// What a finished load hands back: headers and, unless there is none, the
/// body.
pub(crate) type Outcome = Result<(ResponseMessage, Option<Body>), NetError>;

type Callback = Box<dyn FnOnce(&Request) + Send>;

/// Where the current attempt is waiting.
enum Pending {
    None,
    Network { host: String, port: u16, exchange: u64 },
    Cache(Arc<CacheEntry>),
}

struct RequestState {
    ready_state: ReadyState,
    sent: bool,
    generation: u64,
    base_url: Option<Url>,
    message: RequestMessage,
    response: ResponseMessage,
    body: Option<Body>,
    error: Option<NetError>,
    callback: Option<Callback>,
    pending: Pending,
}

impl RequestState {
    /// Forget the current attempt; returns what has to be cancelled.
    fn reset(&mut self) -> (Pending, u64) {
        let generation = self.generation;
        self.generation += 1;
        self.sent = false;
        self.response = ResponseMessage::new();
        self.body = None;
        self.error = None;
        (std::mem::replace(&mut self.pending, Pending::None), generation)
    }

    fn apply(&mut self, outcome: Outcome) {
        self.pending = Pending::None;
        match outcome {
            Ok((response, body)) => {
                self.response = response;
                self.body = body;
                self.error = None;
            }
            Err(error) => {
                self.body = None;
                self.error = Some(error);
            }
        }
    }
}

pub(crate) struct RequestInner {
    me: Weak<RequestInner>,
    id: u64,
    client: Arc<ClientInner>,
    state: Mutex<RequestState>,
}

impl RequestInner {
    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Route a network load through the cache or straight to a connection.
    ///
    /// On `Err` nothing was queued and no completion will follow.
    fn dispatch(&self, generation: u64, message: &RequestMessage) -> Result<(), NetError> {
        let me = self.me.upgrade().ok_or(NetError::Aborted)?;
        let client = &self.client;
        let spool_dir = client.config.spool_dir();

        if message.is_cacheable_method() {
            let url = message.url.as_ref().ok_or(NetError::InvalidUrl)?;
            let entry = client.cache.get_cache(url);
            self.set_pending(generation, Pending::Cache(Arc::clone(&entry)));
            return entry.send(&me, generation, message, &client.connections, &spool_dir);
        }

        let (host, port) = message.host_port().ok_or(NetError::InvalidUrl)?;
        let id = client.connections.next_id();
        let owner: Weak<dyn Notifiable> = self.me.clone();
        let exchange = Exchange::new(id, generation, message.clone(), Spool::new(&spool_dir)?, owner);
        tracing::debug!(id = self.id, exchange = id, method = %message.method, "bypassing cache");
        self.set_pending(generation, Pending::Network { host, port, exchange: id });
        client.connections.send(exchange)
    }

    fn set_pending(&self, generation: u64, pending: Pending) {
        let mut state = self.lock();
        if state.generation == generation {
            state.pending = pending;
        }
    }

    /// Record a finished load and queue its callback for `Client::poll`.
    pub(crate) fn complete(&self, generation: u64, outcome: Outcome) {
        {
            let mut state = self.lock();
            if state.generation != generation
                || !state.sent
                || state.ready_state >= ReadyState::Complete
            {
                return;
            }
            state.apply(outcome);
            state.ready_state = ReadyState::Complete;
            tracing::debug!(
                id = self.id,
                status = state.response.status,
                error = ?state.error,
                "request complete"
            );
        }
        self.client.post(Completion {
            request: self.me.clone(),
            generation,
        });
    }

    pub(crate) fn progress(&self, generation: u64, ready_state: ReadyState) {
        let mut state = self.lock();
        if state.generation == generation
            && state.sent
            && state.ready_state < ready_state
            && ready_state <= ReadyState::Loading
        {
            state.ready_state = ready_state;
        }
    }

    /// Move to `HeadersReceived`, exposing `response` when given.
    pub(crate) fn headers_received(&self, generation: u64, response: Option<&ResponseMessage>) {
        let mut state = self.lock();
        if state.generation == generation
            && state.sent
            && state.ready_state < ReadyState::HeadersReceived
        {
            if let Some(response) = response {
                state.response = response.clone();
            }
            state.ready_state = ReadyState::HeadersReceived;
        }
    }

    /// Send the current attempt again, after a coalesced fetch could not
    /// satisfy it.
    pub(crate) fn redispatch(&self, generation: u64) {
        let message = {
            let state = self.lock();
            if state.generation != generation || state.ready_state >= ReadyState::Complete {
                return;
            }
            state.message.clone()
        };
        tracing::debug!(id = self.id, "redispatching");
        if let Err(error) = self.dispatch(generation, &message) {
            self.complete(generation, Err(error));
        }
    }

    fn cancel(&self, pending: Pending, generation: u64) {
        match pending {
            Pending::None => {}
            Pending::Network { host, port, exchange } => {
                self.client.connections.abort(&host, port, exchange);
            }
            Pending::Cache(entry) => entry.remove_waiter(self.id, generation),
        }
    }
}

impl Notifiable for RequestInner {
    fn on_headers(&self, exchange: &Exchange) {
        self.headers_received(exchange.generation, Some(&exchange.response));
    }

    fn on_data(&self, exchange: &Exchange) {
        self.progress(exchange.generation, ReadyState::Loading);
    }

    fn notify(&self, exchange: Exchange, result: Result<(), NetError>) {
        let generation = exchange.generation;
        let outcome = result.map(|()| (exchange.response, Some(exchange.body.into_body())));
        self.complete(generation, outcome);
    }
}

impl Drop for RequestInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.pending, Pending::None) {
            return;
        }
        let (pending, generation) = state.reset();
        tracing::debug!(id = self.id, "request dropped while pending");
        self.cancel(pending, generation);
    }
}

/// A single load, reusable through `open`.
///
/// Cloning yields another handle to the same request. Dropping the last
/// handle aborts a pending load.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub(crate) fn new(client: Arc<ClientInner>, id: u64) -> Self {
        let message = RequestMessage::new(client.config.http_version);
        let inner = Arc::new_cyclic(|me| RequestInner {
            me: me.clone(),
            id,
            client,
            state: Mutex::new(RequestState {
                ready_state: ReadyState::Unsent,
                sent: false,
                generation: 0,
                base_url: None,
                message,
                response: ResponseMessage::new(),
                body: None,
                error: None,
                callback: None,
                pending: Pending::None,
            }),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<RequestInner>) -> Self {
        Self { inner }
    }

    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.inner.lock()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Relative URLs passed to `open` are resolved against this.
    pub fn set_base_url(&self, base: Option<Url>) {
        self.lock().base_url = base;
    }

    /// Prepare a new load. An empty `url` is the empty URL, which loads
    /// nothing and succeeds.
    ///
    /// Cancels whatever the request was doing before. The completion
    /// callback is kept.
    pub fn open(&self, method: &str, url: &str) -> Result<(), NetError> {
        let (pending, generation) = {
            let mut state = self.lock();
            let url = url.trim();
            let url = if url.is_empty() {
                None
            } else {
                let parsed = match &state.base_url {
                    Some(base) => base.join(url),
                    None => Url::parse(url),
                };
                Some(parsed.map_err(|_| NetError::InvalidUrl)?)
            };

            let mut message = RequestMessage::new(self.inner.client.config.http_version);
            message.open(method, url, &self.inner.client.config.user_agent)?;

            let cancelled = state.reset();
            state.message = message;
            state.ready_state = ReadyState::Opened;
            cancelled
        };
        self.inner.cancel(pending, generation);
        Ok(())
    }

    /// Add a request header. Only allowed between `open` and `send`.
    pub fn set_request_header(&self, name: &str, value: &str) -> Result<(), NetError> {
        let mut state = self.lock();
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(NetError::InvalidState);
        }
        if !is_token(name.as_bytes()) || value.contains(['\r', '\n']) {
            return Err(NetError::InvalidHeader);
        }
        state.message.headers.set(name, value, true);
        Ok(())
    }

    /// Attach a request body. Ignored for GET and HEAD.
    pub fn set_body(&self, body: impl Into<Bytes>) -> Result<(), NetError> {
        let mut state = self.lock();
        if state.ready_state != ReadyState::Opened || state.sent {
            return Err(NetError::InvalidState);
        }
        if !state.message.is_cacheable_method() {
            state.message.body = Some(body.into());
        }
        Ok(())
    }

    /// Called once when the load reaches `Done`, successfully or not.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Request) + Send + 'static,
    {
        self.lock().callback = Some(Box::new(callback));
    }

    /// Start the load.
    ///
    /// Only misuse (not opened, already sent) is reported here. Load
    /// failures end in `Done` with [`error`](Self::error) set.
    pub fn send(&self) -> Result<(), NetError> {
        let (message, generation) = {
            let mut state = self.lock();
            if state.ready_state != ReadyState::Opened || state.sent {
                return Err(NetError::InvalidState);
            }
            state.sent = true;
            (state.message.clone(), state.generation)
        };

        let scheme = Scheme::of(message.url.as_ref());
        tracing::debug!(
            id = self.id(),
            method = %message.method,
            url = message.url.as_ref().map_or("", |u| u.as_str()),
            scheme = ?scheme,
            "send"
        );

        if scheme == Scheme::Http {
            if let Err(error) = self.inner.dispatch(generation, &message) {
                self.finish_now(generation, Err(error));
            }
        } else {
            let outcome = job::load_local(scheme, &message, &self.inner.client.config);
            self.finish_now(generation, outcome);
        }
        Ok(())
    }

    /// Finish synchronously and run the callback on this thread.
    fn finish_now(&self, generation: u64, outcome: Outcome) {
        let callback = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.apply(outcome);
            state.ready_state = ReadyState::Done;
            if let Some(error) = &state.error {
                tracing::debug!(id = self.id(), error = %error, "request failed");
            }
            state.callback.take()
        };
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Move a completed load to `Done` and run its callback. Returns
    /// `false` if the completion belongs to a superseded attempt.
    pub(crate) fn deliver(&self, generation: u64) -> bool {
        let callback = {
            let mut state = self.lock();
            if state.generation != generation || state.ready_state != ReadyState::Complete {
                return false;
            }
            state.ready_state = ReadyState::Done;
            state.callback.take()
        };
        if let Some(callback) = callback {
            callback(self);
        }
        true
    }

    /// Cancel the load. The callback is discarded, not invoked, and the
    /// request returns to `Unsent`.
    pub fn abort(&self) {
        let (pending, generation) = {
            let mut state = self.lock();
            state.callback = None;
            state.ready_state = ReadyState::Unsent;
            state.reset()
        };
        tracing::debug!(id = self.id(), "aborted");
        self.inner.cancel(pending, generation);
    }

    pub fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    /// Status code once headers have arrived; 0 before that or on error.
    pub fn status(&self) -> u16 {
        let state = self.lock();
        if state.error.is_some() || state.ready_state < ReadyState::HeadersReceived {
            return 0;
        }
        state.response.status
    }

    pub fn response(&self) -> ResponseMessage {
        self.lock().response.clone()
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        self.lock().response.headers.get(name).map(str::to_string)
    }

    pub fn body(&self) -> Option<Body> {
        self.lock().body.clone()
    }

    /// The whole body as UTF-8; empty when there is none.
    pub fn text(&self) -> Result<String, NetError> {
        match self.body() {
            Some(body) => body.text(),
            None => Ok(String::new()),
        }
    }

    pub fn error(&self) -> Option<NetError> {
        self.lock().error.clone()
    }

    pub fn is_error(&self) -> bool {
        self.lock().error.is_some()
    }

    pub fn url(&self) -> Option<Url> {
        self.lock().message.url.clone()
    }

    pub fn method(&self) -> http::Method {
        self.lock().message.method.clone()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("ready_state", &state.ready_state)
            .field("method", &state.message.method)
            .field("url", &state.message.url.as_ref().map(|u| u.as_str()))
            .field("error", &state.error)
            .finish()
    }
}
