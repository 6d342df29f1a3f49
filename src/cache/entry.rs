//! One cached resource and the requests waiting on it.
//!
//! At most one upstream fetch per entry is in flight. GET and HEAD requests
//! arriving while it runs are queued and all resolved from its single
//! result, in arrival order.

use crate::base::neterror::NetError;
use crate::base::readystate::ReadyState;
use crate::http::body::{Body, Spool};
use crate::http::date::{format_time, now};
use crate::http::request::RequestMessage;
use crate::http::response::{is_cacheable_status, ResponseMessage};
use crate::socket::exchange::{Exchange, Notifiable};
use crate::socket::pool::ConnectionManager;
use crate::urlrequest::request::{Outcome, RequestInner};
use http::Method;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use url::Url;

/// `If-Modified-Since` is only worth sending when the resource had been
/// stable for at least this long when it was served.
const MIN_MODIFIED_AGE: i64 = 60;

struct Waiter {
    request: Weak<RequestInner>,
    id: u64,
    generation: u64,
    method: Method,
}

#[derive(Default)]
struct EntryState {
    response: Option<ResponseMessage>,
    body: Option<Body>,
    /// When the fetch that produced `response` was dispatched.
    request_time: i64,
    /// When the fetch in flight was dispatched. Only becomes `request_time`
    /// once that fetch stores a response.
    pending_request_time: i64,
    fetching: bool,
    fetch_method: Option<Method>,
    waiters: VecDeque<Waiter>,
}

impl EntryState {
    fn invalidate(&mut self) {
        self.response = None;
        self.body = None;
        self.request_time = 0;
    }

    fn take_waiters(&mut self) -> Vec<Waiter> {
        self.waiters.drain(..).collect()
    }
}

pub struct CacheEntry {
    url: Url,
    me: Weak<CacheEntry>,
    state: Mutex<EntryState>,
}

impl CacheEntry {
    pub(crate) fn new(url: Url) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            url,
            me: me.clone(),
            state: Mutex::new(EntryState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// A fetch is outstanding or requests are queued.
    pub fn is_busy(&self) -> bool {
        let state = self.lock();
        state.fetching || !state.waiters.is_empty()
    }

    pub fn has_response(&self) -> bool {
        self.lock().response.is_some()
    }

    /// Drop the stored response and body.
    pub fn invalidate(&self) {
        tracing::debug!(url = %self.url, "cache entry invalidated");
        self.lock().invalidate();
    }

    /// Serve `message` for `request`, from the stored response when it is
    /// fresh, otherwise by joining or starting an upstream fetch.
    ///
    /// An `Err` means nothing was queued for `request`; it is not notified.
    pub(crate) fn send(
        &self,
        request: &Arc<RequestInner>,
        generation: u64,
        message: &RequestMessage,
        connections: &ConnectionManager,
        spool_dir: &Path,
    ) -> Result<(), NetError> {
        let is_head = message.method == Method::HEAD;
        let waiter = Waiter {
            request: Arc::downgrade(request),
            id: request.id(),
            generation,
            method: message.method.clone(),
        };

        let mut state = self.lock();
        let t = now();
        let cached = state
            .response
            .as_ref()
            .filter(|r| r.is_fresh(t, state.request_time))
            .filter(|_| is_head || state.body.is_some())
            .cloned();
        if let Some(response) = cached {
            let body = if is_head { None } else { state.body.clone() };
            drop(state);
            tracing::debug!(url = %self.url, method = %message.method, "cache hit");
            request.complete(generation, Ok((response, body)));
            return Ok(());
        }

        if state.fetching {
            let queued = state.waiters.len() + 1;
            tracing::debug!(url = %self.url, queued, "joining fetch in flight");
            state.waiters.push_back(waiter);
            return Ok(());
        }

        let mut upstream = message.clone();
        if let Some(response) = &state.response {
            if is_head || state.body.is_some() {
                add_validators(&mut upstream, response);
            }
        }
        let validating = upstream.headers.contains("if-none-match")
            || upstream.headers.contains("if-modified-since");

        let spool = Spool::new(spool_dir)?;
        let owner: Weak<dyn Notifiable> = self.me.clone();
        let exchange = Exchange::new(connections.next_id(), 0, upstream, spool, owner);

        state.pending_request_time = t;
        state.fetching = true;
        state.fetch_method = Some(message.method.clone());
        state.waiters.push_back(waiter);
        drop(state);

        tracing::debug!(
            url = %self.url,
            method = %message.method,
            validating,
            "cache miss, fetching"
        );
        if let Err(error) = connections.send(exchange) {
            let others = {
                let mut state = self.lock();
                state.fetching = false;
                state.fetch_method = None;
                state.invalidate();
                state
                    .waiters
                    .retain(|w| !(w.id == request.id() && w.generation == generation));
                state.take_waiters()
            };
            deliver(others, Err(error.clone()));
            return Err(error);
        }
        Ok(())
    }

    /// Forget a request that was queued on this entry.
    pub(crate) fn remove_waiter(&self, id: u64, generation: u64) {
        self.lock()
            .waiters
            .retain(|w| !(w.id == id && w.generation == generation));
    }

    fn waiting(&self) -> Vec<(Arc<RequestInner>, u64)> {
        self.lock()
            .waiters
            .iter()
            .filter_map(|w| Some((w.request.upgrade()?, w.generation)))
            .collect()
    }

    /// Fold a finished fetch into the entry; returns what waiters receive.
    fn store(&self, state: &mut EntryState, exchange: Exchange) -> (ResponseMessage, Option<Body>) {
        let fetched = exchange.response;
        let fetched_body = exchange.body.into_body();
        let was_head = state.fetch_method.as_ref() == Some(&Method::HEAD);
        let request_time = state.pending_request_time;

        if fetched.status == 304 {
            if let Some(response) = state.response.as_mut() {
                response.update(&fetched);
                state.request_time = request_time;
                tracing::debug!(url = %self.url, "revalidated");
                let delivered = (response.clone(), state.body.clone());
                if response.no_store {
                    state.invalidate();
                }
                return delivered;
            }
            // A 304 with nothing to merge into is handed through as is.
            return (fetched, Some(fetched_body));
        }

        if !is_cacheable_status(fetched.status) {
            tracing::debug!(url = %self.url, status = fetched.status, "not cacheable");
            state.invalidate();
            return (fetched, Some(fetched_body));
        }

        let mut stored = state.response.take().unwrap_or_default();
        stored.update(&fetched);
        state.body = if was_head { None } else { Some(fetched_body) };
        let delivered = (stored.clone(), state.body.clone());
        if stored.no_store {
            state.invalidate();
        } else {
            state.response = Some(stored);
            state.request_time = request_time;
        }
        delivered
    }
}

impl Notifiable for CacheEntry {
    fn on_headers(&self, exchange: &Exchange) {
        // A 304 is merged before anyone sees it.
        let response = (exchange.response.status != 304).then_some(&exchange.response);
        for (request, generation) in self.waiting() {
            request.headers_received(generation, response);
        }
    }

    fn on_data(&self, _exchange: &Exchange) {
        for (request, generation) in self.waiting() {
            request.progress(generation, ReadyState::Loading);
        }
    }

    fn notify(&self, exchange: Exchange, result: Result<(), NetError>) {
        let (outcome, fetch_method, waiters) = {
            let mut state = self.lock();
            state.fetching = false;
            let fetch_method = state.fetch_method.take();
            let outcome = match result {
                Ok(()) => Ok(self.store(&mut state, exchange)),
                Err(error) => {
                    tracing::debug!(url = %self.url, error = %error, "fetch failed");
                    state.invalidate();
                    Err(error)
                }
            };
            (outcome, fetch_method, state.take_waiters())
        };

        let head_fetch = fetch_method == Some(Method::HEAD);
        let mut ready = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            // A HEAD result carries no body for a GET that joined it.
            if head_fetch && waiter.method != Method::HEAD && outcome.is_ok() {
                if let Some(request) = waiter.request.upgrade() {
                    request.redispatch(waiter.generation);
                }
                continue;
            }
            ready.push(waiter);
        }
        deliver(ready, outcome);
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CacheEntry")
            .field("url", &self.url.as_str())
            .field("status", &state.response.as_ref().map(|r| r.status))
            .field("has_body", &state.body.is_some())
            .field("fetching", &state.fetching)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

fn deliver(waiters: Vec<Waiter>, outcome: Outcome) {
    for waiter in waiters {
        let Some(request) = waiter.request.upgrade() else {
            continue;
        };
        let result = match &outcome {
            Ok((response, _)) if waiter.method == Method::HEAD => Ok((response.clone(), None)),
            other => other.clone(),
        };
        request.complete(waiter.generation, result);
    }
}

/// Attach `If-None-Match` / `If-Modified-Since` for a stored response.
fn add_validators(message: &mut RequestMessage, response: &ResponseMessage) {
    if let Some(etag) = response.headers.get("etag") {
        message.headers.set("If-None-Match", etag, false);
    }
    if let (Some(date), Some(last_modified)) = (response.date(), response.last_modified()) {
        if date - last_modified >= MIN_MODIFIED_AGE {
            if let Some(value) = format_time(last_modified) {
                message.headers.set("If-Modified-Since", &value, false);
            }
        }
    }
}
