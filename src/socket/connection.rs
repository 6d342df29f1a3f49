//! HTTP/1.x connection to a single `(host, port)`.
//!
//! Each connection runs as one task on the I/O loop and owns at most one TCP
//! socket. Exchanges are served strictly one at a time in FIFO order; the
//! connection advances through an explicit [`State`] where every transition
//! follows exactly one awaited operation (resolve, connect, write, read).
//!
//! ```text
//! Closed -> Resolving -> Resolved -> Connected -> ReadStatusLine -> ReadHead
//!        -> (ReadContent | ReadChunk -> ReadTrailer) -> CloseWait -> Closed
//! ```
//!
//! A kept-alive socket sits in `Connected` with no current exchange.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::dns::resolve_host;
use crate::http::chunked::ChunkedDecoder;
use crate::http::request::HttpVersion;
use crate::http::retry::RetryPolicy;
use crate::socket::exchange::Exchange;
use crate::socket::pool::Shared;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

const READ_CHUNK: usize = 16 * 1024;

/// Default limit for a single status, header or chunk-size line.
pub const DEFAULT_MAX_HEADER_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Resolving,
    Resolved,
    /// Socket open; writing the current request, or idle when there is none.
    Connected,
    ReadStatusLine,
    ReadHead,
    /// Body delimited by Content-Length (`Some`) or by EOF (`None`).
    ReadContent { remaining: Option<u64> },
    ReadChunk,
    ReadTrailer,
    CloseWait,
}

/// Per-connection limits, shared by every connection of a manager.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub retry: RetryPolicy,
    pub max_header_line: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_header_line: DEFAULT_MAX_HEADER_LINE,
        }
    }
}

pub(crate) enum Command {
    Send(Exchange),
    Abort(u64),
}

enum Progress {
    Advanced,
    NeedData,
}

pub(crate) struct Connection {
    host: String,
    port: u16,
    shared: Arc<Shared>,
    state: State,
    socket: Option<TcpStream>,
    addrs: VecDeque<SocketAddr>,
    connect_error: Option<NetError>,
    queue: VecDeque<Exchange>,
    current: Option<Exchange>,
    read_buf: BytesMut,
    write_buf: Bytes,
    chunked: ChunkedDecoder,
    /// Skipping the headers of a 1xx interim response.
    interim: bool,
    /// Body is delimited by EOF; the socket cannot be reused.
    close_after: bool,
}

impl Connection {
    pub(crate) fn new(host: String, port: u16, shared: Arc<Shared>) -> Self {
        let max_line = shared.settings.max_header_line;
        Self {
            host,
            port,
            shared,
            state: State::Closed,
            socket: None,
            addrs: VecDeque::new(),
            connect_error: None,
            queue: VecDeque::new(),
            current: None,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: Bytes::new(),
            chunked: ChunkedDecoder::new(max_line),
            interim: false,
            close_after: false,
        }
    }

    /// Drive the connection until the manager goes away.
    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        tracing::debug!(host = %self.host, port = self.port, "connection task started");
        loop {
            if self.current.is_none() {
                if let Some(next) = self.queue.pop_front() {
                    self.start(next);
                    continue;
                }
                match commands.recv().await {
                    Some(command) => self.handle(command),
                    None => break,
                }
                continue;
            }

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                result = self.step() => {
                    if let Err(error) = result {
                        self.fail(error);
                    }
                }
            }
        }
        tracing::debug!(host = %self.host, port = self.port, "connection task stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Send(exchange) => {
                tracing::trace!(
                    host = %self.host,
                    id = exchange.id,
                    queued = self.queue.len(),
                    "exchange queued"
                );
                self.queue.push_back(exchange);
            }
            Command::Abort(id) => self.abort(id),
        }
    }

    fn start(&mut self, exchange: Exchange) {
        tracing::debug!(
            host = %self.host,
            port = self.port,
            id = exchange.id,
            method = %exchange.message.method,
            attempt = exchange.retries + 1,
            "starting exchange"
        );
        self.current = Some(exchange);
        self.interim = false;
        self.close_after = false;
        if self.socket.is_some() {
            self.begin_write();
            self.set_state(State::Connected);
        } else {
            self.set_state(State::Resolving);
        }
    }

    fn abort(&mut self, id: u64) {
        if let Some(pos) = self.queue.iter().position(|e| e.id == id) {
            if let Some(exchange) = self.queue.remove(pos) {
                tracing::debug!(host = %self.host, id, "aborted queued exchange");
                self.shared.done(exchange, Err(NetError::Aborted));
            }
            return;
        }
        if self.current.as_ref().is_some_and(|e| e.id == id) {
            tracing::debug!(
                host = %self.host,
                id,
                state = ?self.state,
                "aborted in-flight exchange"
            );
            self.close();
            if let Some(exchange) = self.current.take() {
                self.shared.done(exchange, Err(NetError::Aborted));
            }
        }
    }

    fn set_state(&mut self, state: State) {
        tracing::trace!(
            host = %self.host,
            port = self.port,
            from = ?self.state,
            to = ?state,
            "state"
        );
        self.state = state;
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!(host = %self.host, port = self.port, "socket closed");
        }
        self.read_buf.clear();
        self.write_buf = Bytes::new();
        self.addrs.clear();
        self.set_state(State::Closed);
    }

    fn begin_write(&mut self) {
        if let Some(exchange) = &self.current {
            self.write_buf = exchange.message.to_bytes();
        }
    }

    /// Perform one transition. Cancel-safe: state only changes after the
    /// awaited operation has completed.
    async fn step(&mut self) -> Result<(), NetError> {
        match self.state {
            State::Closed => {
                self.set_state(State::Resolving);
                Ok(())
            }
            State::Resolving => {
                let resolver = self.shared.resolver.as_ref();
                let addrs = resolve_host(resolver, &self.host, self.port).await?;
                tracing::debug!(host = %self.host, count = addrs.len(), "resolved");
                self.addrs = addrs.into();
                self.connect_error = None;
                self.set_state(State::Resolved);
                Ok(())
            }
            State::Resolved => self.connect_next().await,
            State::Connected => self.write().await,
            State::CloseWait => {
                self.close();
                Ok(())
            }
            State::ReadStatusLine
            | State::ReadHead
            | State::ReadContent { .. }
            | State::ReadChunk
            | State::ReadTrailer => {
                if let Progress::Advanced = self.process()? {
                    return Ok(());
                }
                let socket = self.socket.as_mut().ok_or(NetError::SocketNotConnected)?;
                self.read_buf.reserve(READ_CHUNK);
                let n = socket.read_buf(&mut self.read_buf).await.socket_context()?;
                if n == 0 {
                    return self.on_eof();
                }
                tracing::trace!(host = %self.host, bytes = n, "read");
                Ok(())
            }
        }
    }

    async fn connect_next(&mut self) -> Result<(), NetError> {
        let Some(&addr) = self.addrs.front() else {
            return Err(self
                .connect_error
                .take()
                .unwrap_or(NetError::ConnectionFailed));
        };

        match TcpStream::connect(addr).await.connection_context(&self.host, self.port) {
            Ok(stream) => {
                stream.set_nodelay(true).socket_context()?;
                tracing::debug!(host = %self.host, addr = %addr, "connected");
                self.socket = Some(stream);
                self.addrs.clear();
                self.begin_write();
                self.set_state(State::Connected);
            }
            Err(error) => {
                tracing::debug!(host = %self.host, addr = %addr, error = %error, "connect failed");
                self.addrs.pop_front();
                self.connect_error = Some(error);
            }
        }
        Ok(())
    }

    async fn write(&mut self) -> Result<(), NetError> {
        if self.write_buf.has_remaining() {
            let socket = self.socket.as_mut().ok_or(NetError::SocketNotConnected)?;
            let n = socket.write_buf(&mut self.write_buf).await.socket_context()?;
            if n == 0 {
                return Err(NetError::ConnectionClosed);
            }
            return Ok(());
        }

        let Some(exchange) = self.current.as_mut() else {
            return Ok(());
        };
        if exchange.message.version == HttpVersion::Http09 {
            exchange.response.version = HttpVersion::Http09;
            self.close_after = true;
            exchange.on_headers();
            self.set_state(State::ReadContent { remaining: None });
        } else {
            self.set_state(State::ReadStatusLine);
        }
        Ok(())
    }

    /// Consume buffered input for the current state.
    fn process(&mut self) -> Result<Progress, NetError> {
        match self.state {
            State::ReadStatusLine => self.read_status_line(),
            State::ReadHead => self.read_head(),
            State::ReadContent { remaining } => self.read_content(remaining),
            State::ReadChunk | State::ReadTrailer => self.read_chunked(),
            _ => Ok(Progress::Advanced),
        }
    }

    fn read_status_line(&mut self) -> Result<Progress, NetError> {
        // Tolerate stray CRLFs left over from the previous response.
        let blank = self
            .read_buf
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        self.read_buf.advance(blank);

        let Some(exchange) = self.current.as_mut() else {
            return Ok(Progress::Advanced);
        };

        if self.read_buf.len() < 5 && !self.read_buf.contains(&b'\n') {
            return Ok(Progress::NeedData);
        }
        if !looks_like_status_line(&self.read_buf) {
            // No status line: an HTTP/0.9 response, everything is body.
            tracing::debug!(host = %self.host, "HTTP/0.9 response");
            exchange.response.version = HttpVersion::Http09;
            self.close_after = true;
            exchange.on_headers();
            self.set_state(State::ReadContent { remaining: None });
            return Ok(Progress::Advanced);
        }

        let max_line = self.shared.settings.max_header_line;
        let Some(line) = take_line(&mut self.read_buf, max_line)? else {
            return Ok(Progress::NeedData);
        };
        if !exchange.response.parse_status_line(strip_cr(&line))? {
            exchange.body.write_all(&line)?;
            exchange.body.write_all(b"\n")?;
            self.close_after = true;
            exchange.on_headers();
            self.set_state(State::ReadContent { remaining: None });
            return Ok(Progress::Advanced);
        }
        self.interim = (100..200).contains(&exchange.response.status);
        tracing::debug!(
            host = %self.host,
            status = exchange.response.status,
            version = exchange.response.version.number(),
            "status line"
        );
        self.set_state(State::ReadHead);
        Ok(Progress::Advanced)
    }

    fn read_head(&mut self) -> Result<Progress, NetError> {
        let Some(exchange) = self.current.as_mut() else {
            return Ok(Progress::Advanced);
        };
        let max_line = self.shared.settings.max_header_line;
        let Some(mut line) = take_line(&mut self.read_buf, max_line)? else {
            return Ok(Progress::NeedData);
        };
        if !strip_cr(&line).is_empty() {
            line.extend_from_slice(b"\n");
            exchange.response.parse_header(&line)?;
            return Ok(Progress::Advanced);
        }

        if self.interim {
            tracing::trace!(
                host = %self.host,
                status = exchange.response.status,
                "skipping interim response"
            );
            exchange.response = Default::default();
            self.interim = false;
            self.set_state(State::ReadStatusLine);
            return Ok(Progress::Advanced);
        }

        exchange.on_headers();
        let has_body = exchange.response.has_body(&exchange.message.method);
        let is_chunked = exchange.response.is_chunked;
        let content_length = exchange.response.content_length;

        if !has_body {
            self.finish();
        } else if is_chunked {
            self.chunked = ChunkedDecoder::new(self.shared.settings.max_header_line);
            self.set_state(State::ReadChunk);
        } else {
            match content_length {
                Some(0) => self.finish(),
                Some(n) => self.set_state(State::ReadContent { remaining: Some(n) }),
                None => {
                    self.close_after = true;
                    self.set_state(State::ReadContent { remaining: None });
                }
            }
        }
        Ok(Progress::Advanced)
    }

    fn read_content(&mut self, remaining: Option<u64>) -> Result<Progress, NetError> {
        if self.read_buf.is_empty() {
            return Ok(Progress::NeedData);
        }
        let Some(exchange) = self.current.as_mut() else {
            return Ok(Progress::Advanced);
        };

        let take = match remaining {
            Some(r) => usize::try_from(r).unwrap_or(usize::MAX).min(self.read_buf.len()),
            None => self.read_buf.len(),
        };
        let data = self.read_buf.split_to(take);
        exchange.body.write_all(&data)?;
        exchange.on_data();

        match remaining {
            Some(r) if r == take as u64 => self.finish(),
            Some(r) => self.set_state(State::ReadContent {
                remaining: Some(r - take as u64),
            }),
            None => {}
        }
        Ok(Progress::Advanced)
    }

    fn read_chunked(&mut self) -> Result<Progress, NetError> {
        let Some(exchange) = self.current.as_mut() else {
            return Ok(Progress::Advanced);
        };
        let before = exchange.body.len();
        let done = self
            .chunked
            .decode(&mut self.read_buf, &mut exchange.body, &mut exchange.trailers)?;
        if exchange.body.len() > before {
            exchange.on_data();
        }
        if done {
            let trailers = std::mem::take(&mut exchange.trailers);
            exchange.response.merge_trailers(&trailers);
            self.finish();
            return Ok(Progress::Advanced);
        }
        if self.chunked.in_trailer() && self.state == State::ReadChunk {
            self.set_state(State::ReadTrailer);
        }
        Ok(Progress::NeedData)
    }

    fn on_eof(&mut self) -> Result<(), NetError> {
        tracing::debug!(
            host = %self.host,
            state = ?self.state,
            buffered = self.read_buf.len(),
            "EOF"
        );
        match self.state {
            State::ReadStatusLine if self.read_buf.is_empty() => Err(NetError::EmptyResponse),
            State::ReadStatusLine if looks_like_status_line(&self.read_buf) => {
                Err(NetError::ResponseHeadersTruncated)
            }
            State::ReadStatusLine => {
                // A short HTTP/0.9 body.
                if let Some(exchange) = self.current.as_mut() {
                    exchange.response.version = HttpVersion::Http09;
                    exchange.body.write_all(&self.read_buf)?;
                    settle_length(exchange);
                }
                self.read_buf.clear();
                self.close_after = true;
                self.finish();
                Ok(())
            }
            State::ReadHead => Err(NetError::ResponseHeadersTruncated),
            State::ReadContent { remaining: None } => {
                if let Some(exchange) = self.current.as_mut() {
                    settle_length(exchange);
                }
                self.finish();
                Ok(())
            }
            State::ReadContent { remaining: Some(_) } => Err(NetError::ContentLengthMismatch),
            State::ReadChunk | State::ReadTrailer => Err(NetError::IncompleteChunkedEncoding),
            _ => Err(NetError::ConnectionClosed),
        }
    }

    /// The current response is complete: hand it back and decide whether the
    /// socket can serve the next exchange.
    fn finish(&mut self) {
        let Some(exchange) = self.current.take() else {
            return;
        };
        let reusable = !self.close_after
            && exchange.message.version == HttpVersion::Http11
            && exchange.response.version == HttpVersion::Http11
            && !wants_close(exchange.response.headers.get("connection"))
            && !wants_close(exchange.message.headers.get("connection"));

        tracing::debug!(
            host = %self.host,
            id = exchange.id,
            status = exchange.response.status,
            bytes = exchange.body.len(),
            reusable,
            "exchange complete"
        );

        if reusable {
            self.set_state(State::Connected);
        } else {
            self.set_state(State::CloseWait);
            self.close();
        }
        self.shared.done(exchange, Ok(()));
    }

    /// Resend after a network failure, or report it.
    fn fail(&mut self, error: NetError) {
        let Some(mut exchange) = self.current.take() else {
            return;
        };
        self.close();

        if let Some(reason) = self.shared.settings.retry.should_retry(exchange.retries, &error) {
            exchange.retries += 1;
            tracing::debug!(
                host = %self.host,
                id = exchange.id,
                reason = ?reason,
                error = %error,
                retry = exchange.retries,
                "retrying exchange"
            );
            match exchange.reset_response() {
                Ok(()) => self.start(exchange),
                Err(e) => self.shared.done(exchange, Err(e)),
            }
            return;
        }

        if error.is_retryable() {
            tracing::warn!(
                host = %self.host,
                id = exchange.id,
                error = %error,
                retries = exchange.retries,
                "giving up"
            );
            self.shared.done(exchange, Err(error));
            return;
        }

        // Protocol errors poison everything queued behind the failed exchange.
        tracing::warn!(
            host = %self.host,
            id = exchange.id,
            error = %error,
            queued = self.queue.len(),
            "protocol error"
        );
        self.shared.done(exchange, Err(error.clone()));
        for queued in self.queue.drain(..) {
            self.shared.done(queued, Err(error.clone()));
        }
    }
}

/// Split off one line (without its `\n`), or `None` if incomplete.
fn take_line(buf: &mut BytesMut, max_line: usize) -> Result<Option<BytesMut>, NetError> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) if pos > max_line => Err(NetError::ResponseHeadersTooBig),
        Some(pos) => {
            let line = buf.split_to(pos);
            buf.advance(1);
            Ok(Some(line))
        }
        None if buf.len() > max_line => Err(NetError::ResponseHeadersTooBig),
        None => Ok(None),
    }
}

/// Whether `buf` starts with (a prefix of) `HTTP/`.
fn looks_like_status_line(buf: &[u8]) -> bool {
    let n = buf.len().min(5);
    buf[..n].eq_ignore_ascii_case(&b"HTTP/"[..n])
}

/// An EOF-delimited body is complete: its byte count becomes the length.
fn settle_length(exchange: &mut Exchange) {
    let len = exchange.body.len().to_string();
    exchange.response.headers.set("Content-Length", &len, false);
    exchange.response.refresh();
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn wants_close(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
}
