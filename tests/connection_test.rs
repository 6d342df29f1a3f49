//! Wire-level behavior: framing, keep-alive, retries, protocol errors, abort.

mod common;

use common::{closed_port, response, serve, Reply};
use fetchnet::dns::{Addrs, Name, Resolve, Resolving};
use fetchnet::{Client, NetError, ReadyState, Request};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn send(client: &Client, method: &str, url: &str) -> Request {
    let request = client.request();
    request.open(method, url).unwrap();
    request.send().unwrap();
    request
}

/// Resolves every name to one fixed address and counts lookups.
struct CountingResolver {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl Resolve for CountingResolver {
    fn resolve(&self, _name: Name) -> Resolving {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let addr = self.addr;
        Box::pin(async move { Ok(Box::new(std::iter::once(addr)) as Addrs) })
    }
}

#[test]
fn test_chunked_body_with_trailers() {
    let origin = serve(|_, _| {
        Reply::Send(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              5;ext=1\r\nhello\r\n7\r\n, world\r\n0\r\nX-Checksum: abc\r\n\r\n"
                .to_vec(),
        )
    });
    let client = Client::new().unwrap();
    let request = send(&client, "GET", &origin.url("/chunked"));
    assert!(client.wait(&request, WAIT));
    assert!(!request.is_error(), "{:?}", request.error());
    assert_eq!(request.text().unwrap(), "hello, world");
    assert_eq!(request.response_header("x-checksum").as_deref(), Some("abc"));
}

#[test]
fn test_keep_alive_reuses_socket() {
    let origin = serve(|seen, _| Reply::Send(response("200 OK", &[], &seen.target)));
    let client = Client::new().unwrap();

    for path in ["/a", "/b", "/c"] {
        let request = send(&client, "POST", &origin.url(path));
        assert!(client.wait(&request, WAIT));
        assert_eq!(request.text().unwrap(), path);
    }
    assert_eq!(origin.accepts(), 1);
    assert_eq!(client.connections().connection_count(), 1);
}

#[test]
fn test_connection_close_opens_new_socket() {
    let origin = serve(|_, _| Reply::SendAndClose(response("200 OK", &[("Connection", "close")], "bye")));
    let client = Client::new().unwrap();

    for _ in 0..2 {
        let request = send(&client, "POST", &origin.url("/"));
        assert!(client.wait(&request, WAIT));
        assert_eq!(request.text().unwrap(), "bye");
    }
    assert_eq!(origin.accepts(), 2);
}

#[test]
fn test_body_delimited_by_eof() {
    let origin = serve(|_, _| Reply::SendAndClose(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nuntil close".to_vec()));
    let client = Client::new().unwrap();
    let request = send(&client, "GET", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert_eq!(request.text().unwrap(), "until close");
    assert_eq!(request.response().content_length, Some(11));
}

#[test]
fn test_http09_response() {
    let origin = serve(|_, _| Reply::SendAndClose(b"<html>old school</html>".to_vec()));
    let client = Client::new().unwrap();
    let request = send(&client, "GET", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert!(!request.is_error());
    assert_eq!(request.text().unwrap(), "<html>old school</html>");
}

#[test]
fn test_interim_response_skipped() {
    let origin = serve(|_, _| {
        let mut bytes = b"HTTP/1.1 100 Continue\r\n\r\n".to_vec();
        bytes.extend(response("201 Created", &[], "made"));
        Reply::Send(bytes)
    });
    let client = Client::new().unwrap();
    let request = send(&client, "POST", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert_eq!(request.status(), 201);
    assert_eq!(request.text().unwrap(), "made");
}

#[test]
fn test_retry_bound() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr: SocketAddr = format!("127.0.0.1:{}", closed_port()).parse().unwrap();
    let client = Client::builder()
        .resolver(Arc::new(CountingResolver {
            addr,
            calls: Arc::clone(&calls),
        }))
        .build()
        .unwrap();

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    let request = client.request();
    request.on_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    request.open("GET", &format!("http://retry.test:{}/", addr.port())).unwrap();
    request.send().unwrap();

    assert!(client.wait(&request, WAIT));
    assert!(request.is_error());
    assert!(request.error().is_some_and(|e| e.is_retryable()));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropped_connection_is_retried() {
    let origin = serve(|_, n| {
        if n == 1 {
            Reply::Close
        } else {
            Reply::Send(response("200 OK", &[], "second try"))
        }
    });
    let client = Client::new().unwrap();
    let request = send(&client, "POST", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert_eq!(request.text().unwrap(), "second try");
    assert_eq!(origin.hits(), 2);
}

#[test]
fn test_bad_chunk_size_is_not_retried() {
    let origin = serve(|_, _| {
        Reply::Send(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n".to_vec())
    });
    let client = Client::new().unwrap();
    let request = send(&client, "GET", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert_eq!(request.error(), Some(NetError::InvalidChunkedEncoding));
    assert_eq!(origin.hits(), 1);
}

#[test]
fn test_truncated_body_fails_after_retries() {
    let origin = serve(|_, _| Reply::SendAndClose(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort".to_vec()));
    let client = Client::builder().max_retries(1).build().unwrap();
    let request = send(&client, "POST", &origin.url("/"));
    assert!(client.wait(&request, WAIT));
    assert_eq!(request.error(), Some(NetError::ContentLengthMismatch));
    assert_eq!(origin.hits(), 2);
}

#[test]
fn test_abort_in_flight() {
    let origin = serve(|_, _| Reply::Hang);
    let client = Client::new().unwrap();

    let called = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&called);
    let request = client.request();
    request.on_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    request.open("POST", &origin.url("/slow")).unwrap();
    request.send().unwrap();

    while origin.hits() == 0 {
        thread::sleep(Duration::from_millis(10));
    }
    request.abort();
    assert_eq!(request.ready_state(), ReadyState::Unsent);

    client.run_until(Duration::from_millis(200), || false);
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert!(!request.is_error());

    // The client keeps working after an abort.
    let origin2 = serve(|_, _| Reply::Send(response("200 OK", &[], "ok")));
    let next = send(&client, "GET", &origin2.url("/"));
    assert!(client.wait(&next, WAIT));
    assert_eq!(next.text().unwrap(), "ok");
}

#[test]
fn test_progress_states() {
    let origin = serve(|_, _| {
        Reply::Send(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n".to_vec())
    });
    let client = Client::new().unwrap();
    let request = send(&client, "POST", &origin.url("/"));

    // The final chunk never arrives, so the load stays in Loading.
    let deadline = std::time::Instant::now() + WAIT;
    while request.ready_state() != ReadyState::Loading && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(request.ready_state(), ReadyState::Loading);
    assert_eq!(request.status(), 200);
    request.abort();
}

#[test]
fn test_protocol_error_fails_queued_requests() {
    let origin = serve(|_, _| {
        thread::sleep(Duration::from_millis(200));
        Reply::Send(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n".to_vec())
    });
    let client = Client::new().unwrap();

    let called = Arc::new(AtomicUsize::new(0));
    let requests: Vec<Request> = ["/a", "/b", "/c"]
        .iter()
        .map(|path| {
            let request = client.request();
            let counter = Arc::clone(&called);
            request.on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            request.open("POST", &origin.url(path)).unwrap();
            request.send().unwrap();
            request
        })
        .collect();

    assert!(client.run_until(WAIT, || requests
        .iter()
        .all(|r| r.ready_state() == ReadyState::Done)));
    for request in &requests {
        assert_eq!(request.error(), Some(NetError::InvalidChunkedEncoding));
    }
    assert_eq!(origin.hits(), 1);
    assert_eq!(called.load(Ordering::SeqCst), 3);
}

#[test]
fn test_abort_queued_leaves_neighbors() {
    let origin = serve(|seen, _| {
        thread::sleep(Duration::from_millis(200));
        Reply::Send(response("200 OK", &[], &seen.target))
    });
    let client = Client::new().unwrap();

    let called = Arc::new(AtomicUsize::new(0));
    let requests: Vec<Request> = ["/a", "/b", "/c"]
        .iter()
        .map(|path| {
            let request = client.request();
            let counter = Arc::clone(&called);
            request.on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            request.open("POST", &origin.url(path)).unwrap();
            request.send().unwrap();
            request
        })
        .collect();
    let (a, b, c) = (&requests[0], &requests[1], &requests[2]);

    b.abort();
    assert_eq!(b.ready_state(), ReadyState::Unsent);

    assert!(client.run_until(WAIT, || a.ready_state() == ReadyState::Done
        && c.ready_state() == ReadyState::Done));
    assert_eq!(a.text().unwrap(), "/a");
    assert_eq!(c.text().unwrap(), "/c");
    assert_eq!(b.ready_state(), ReadyState::Unsent);
    assert_eq!(called.load(Ordering::SeqCst), 2);
    assert_eq!(origin.hits(), 2);
}
