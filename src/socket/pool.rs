use crate::base::neterror::NetError;
use crate::dns::Resolve;
use crate::socket::connection::{Command, Connection, ConnectionSettings};
use crate::socket::exchange::Exchange;
use crate::socket::runtime::IoRuntime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};

/// A live connection task, addressed by `(host, port)`.
struct ConnectionHandle {
    host: String,
    port: u16,
    commands: UnboundedSender<Command>,
}

#[derive(Default)]
struct PoolState {
    connections: Vec<ConnectionHandle>,
    in_flight: usize,
}

/// State shared between the manager and its connection tasks.
pub(crate) struct Shared {
    pool: Mutex<PoolState>,
    pub(crate) resolver: Arc<dyn Resolve>,
    pub(crate) settings: ConnectionSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a connection when an exchange is finished with.
    ///
    /// Bookkeeping happens under the pool lock; the owner is notified after
    /// it is released.
    pub(crate) fn done(&self, exchange: Exchange, result: Result<(), NetError>) {
        {
            let mut pool = self.lock();
            pool.in_flight = pool.in_flight.saturating_sub(1);
        }
        tracing::trace!(id = exchange.id, ok = result.is_ok(), "exchange done");
        exchange.finish(result);
    }
}

/// Pool of per-host connections driven by one I/O loop.
///
/// Connections are created on first use and live as long as the manager.
/// `send` and `abort` may be called from any thread.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    runtime: IoRuntime,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(resolver: Arc<dyn Resolve>, settings: ConnectionSettings) -> Result<Self, NetError> {
        Ok(Self {
            shared: Arc::new(Shared {
                pool: Mutex::new(PoolState::default()),
                resolver,
                settings,
            }),
            runtime: IoRuntime::start("fetchnet-io")?,
            next_id: AtomicU64::new(1),
        })
    }

    /// Allocate an exchange id, unique within this manager.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Linear lookup by `(host, port)`, spawning a new connection on a miss.
    fn get_connection<'a>(
        &self,
        pool: &'a mut PoolState,
        host: &str,
        port: u16,
    ) -> &'a UnboundedSender<Command> {
        let idx = match pool
            .connections
            .iter()
            .position(|c| c.port == port && c.host.eq_ignore_ascii_case(host) && !c.commands.is_closed())
        {
            Some(idx) => idx,
            None => {
                pool.connections
                    .retain(|c| !(c.port == port && c.host.eq_ignore_ascii_case(host)));
                let (tx, rx) = mpsc::unbounded_channel();
                let connection = Connection::new(host.to_string(), port, Arc::clone(&self.shared));
                self.runtime.spawn(connection.run(rx));
                tracing::debug!(host = %host, port, total = pool.connections.len() + 1, "new connection");
                pool.connections.push(ConnectionHandle {
                    host: host.to_string(),
                    port,
                    commands: tx,
                });
                pool.connections.len() - 1
            }
        };
        &pool.connections[idx].commands
    }

    /// Queue an exchange on the connection for its URL's `(host, port)`.
    ///
    /// The owner is notified on the I/O loop once it completes. An `Err`
    /// means the exchange was never queued and no notification will follow.
    pub fn send(&self, exchange: Exchange) -> Result<(), NetError> {
        let (host, port) = exchange.message.host_port().ok_or(NetError::InvalidUrl)?;
        let mut pool = self.shared.lock();
        let commands = self.get_connection(&mut pool, &host, port);
        match commands.send(Command::Send(exchange)) {
            Ok(()) => {
                pool.in_flight += 1;
                Ok(())
            }
            Err(_) => {
                tracing::warn!(host = %host, port, "connection task is gone");
                Err(NetError::ConnectionAborted)
            }
        }
    }

    /// Cancel exchange `id` queued or running on `(host, port)`.
    pub fn abort(&self, host: &str, port: u16, id: u64) {
        let pool = self.shared.lock();
        if let Some(conn) = pool
            .connections
            .iter()
            .find(|c| c.port == port && c.host.eq_ignore_ascii_case(host))
        {
            let _ = conn.commands.send(Command::Abort(id));
        }
    }

    /// Number of connections ever created and still alive.
    pub fn connection_count(&self) -> usize {
        self.shared.lock().connections.len()
    }

    /// Exchanges queued or running across all connections.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.shared.settings
    }

    pub(crate) fn runtime(&self) -> &IoRuntime {
        &self.runtime
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pool = self.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("connections", &pool.connections.len())
            .field("in_flight", &pool.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::GaiResolver;
    use crate::http::body::Spool;
    use crate::http::request::{HttpVersion, RequestMessage};
    use crate::socket::exchange::Notifiable;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use url::Url;

    struct Recorder {
        tx: Mutex<std_mpsc::Sender<(u16, Result<(), NetError>, String)>>,
    }

    impl Notifiable for Recorder {
        fn notify(&self, exchange: Exchange, result: Result<(), NetError>) {
            let body = exchange.body.into_body().text().unwrap_or_default();
            let _ = self
                .tx
                .lock()
                .unwrap()
                .send((exchange.response.status, result, body));
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Arc::new(GaiResolver::new()), ConnectionSettings::default()).unwrap()
    }

    fn exchange(id: u64, url: &str, owner: &Arc<Recorder>) -> Exchange {
        let mut message = RequestMessage::new(HttpVersion::Http11);
        message.open("GET", Some(Url::parse(url).unwrap()), "test").unwrap();
        let owner: std::sync::Weak<dyn Notifiable> = Arc::downgrade(owner) as _;
        Exchange::new(id, 0, message, Spool::new(&std::env::temp_dir()).unwrap(), owner)
    }

    #[test]
    fn test_keep_alive_reuses_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            // One accepted socket serves both requests.
            let (mut stream, _) = listener.accept().unwrap();
            for body in ["one", "two"] {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).unwrap();
                write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n{}", body).unwrap();
            }
        });

        let manager = manager();
        let (tx, rx) = std_mpsc::channel();
        let owner = Arc::new(Recorder { tx: Mutex::new(tx) });
        let url = format!("http://127.0.0.1:{}/", port);

        manager.send(exchange(1, &url, &owner)).unwrap();
        manager.send(exchange(2, &url, &owner)).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.2, "one");
        assert_eq!(second.2, "two");
        assert!(first.1.is_ok() && second.1.is_ok());
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn test_send_without_host_fails() {
        let manager = manager();
        let (tx, _rx) = std_mpsc::channel();
        let owner = Arc::new(Recorder { tx: Mutex::new(tx) });
        let mut ex = exchange(1, "http://127.0.0.1/", &owner);
        ex.message.url = None;
        assert_eq!(manager.send(ex).unwrap_err(), NetError::InvalidUrl);
        assert_eq!(manager.connection_count(), 0);
    }
}
