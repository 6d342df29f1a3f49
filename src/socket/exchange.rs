//! The unit of work handed to a connection.

use crate::base::neterror::NetError;
use crate::http::body::Spool;
use crate::http::headers::HeaderList;
use crate::http::request::RequestMessage;
use crate::http::response::ResponseMessage;
use std::fmt;
use std::sync::Weak;

/// Receives progress and the final result of an [`Exchange`].
///
/// Implemented by requests (direct network loads) and cache entries
/// (upstream fetches shared by several requests). All methods run on the
/// I/O loop, so implementations only record state and hand off.
pub trait Notifiable: Send + Sync {
    /// Status line and headers have been parsed.
    fn on_headers(&self, _exchange: &Exchange) {}

    /// Body bytes have been written to the exchange's spool.
    fn on_data(&self, _exchange: &Exchange) {}

    /// The exchange finished, successfully or not. Called exactly once.
    fn notify(&self, exchange: Exchange, result: Result<(), NetError>);
}

/// A request travelling through a connection, together with the response
/// being assembled for it.
pub struct Exchange {
    /// Used to find the exchange again on abort.
    pub id: u64,
    /// Owner-defined tag; lets the owner ignore results of a superseded send.
    pub generation: u64,
    pub message: RequestMessage,
    pub response: ResponseMessage,
    pub trailers: HeaderList,
    pub body: Spool,
    /// Number of times the exchange has been resent.
    pub retries: usize,
    pub owner: Weak<dyn Notifiable>,
}

impl Exchange {
    pub fn new(
        id: u64,
        generation: u64,
        message: RequestMessage,
        body: Spool,
        owner: Weak<dyn Notifiable>,
    ) -> Self {
        Self {
            id,
            generation,
            message,
            response: ResponseMessage::new(),
            trailers: HeaderList::new(),
            body,
            retries: 0,
            owner,
        }
    }

    /// Forget everything received so far, before a resend.
    pub(crate) fn reset_response(&mut self) -> Result<(), NetError> {
        self.response = ResponseMessage::new();
        self.trailers.clear();
        self.body.reset()
    }

    pub(crate) fn on_headers(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.on_headers(self);
        }
    }

    pub(crate) fn on_data(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.on_data(self);
        }
    }

    /// Hand the exchange back to its owner. Dropped silently if the owner is
    /// gone.
    pub(crate) fn finish(self, result: Result<(), NetError>) {
        match self.owner.upgrade() {
            Some(owner) => owner.notify(self, result),
            None => tracing::trace!(id = self.id, "exchange owner dropped, discarding result"),
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("method", &self.message.method)
            .field("url", &self.message.url.as_ref().map(|u| u.as_str()))
            .field("status", &self.response.status)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
