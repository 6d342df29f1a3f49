use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Network error codes, numbered after Chromium's `net_error_list.h`.
///
/// Structured variants keep their `io::Error` source behind an `Arc` so the
/// enum stays `Clone`: a single failed upstream fetch is reported to every
/// request coalesced behind it.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Generic
    #[error("Operation failed")]
    Failed,
    #[error("Request aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("File not found")]
    FileNotFound,
    #[error("Access denied")]
    AccessDenied,
    #[error("I/O error: {source}")]
    Io { source: Arc<io::Error> },

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        source: Arc<io::Error>,
    },
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Name not resolved: {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        source: Arc<io::Error>,
    },
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Method not supported")]
    MethodNotSupported,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Response headers truncated")]
    ResponseHeadersTruncated,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,
    #[error("Too many retries")]
    TooManyRetries,

    // Codes outside Chromium's list (custom range starting at -910)
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Request is not in a state that allows this operation")]
    InvalidState,
    #[error("about: URLs are not configured")]
    AboutPathNotConfigured,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::FileNotFound => -6,
            NetError::AccessDenied => -10,
            NetError::Io { .. } => -2,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved => -105,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::MethodNotSupported => -322,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed => -330,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::ResponseHeadersTruncated => -357,
            NetError::InvalidHttpResponse => -370,
            NetError::TooManyRetries => -375,

            NetError::InvalidHeader => -910,
            NetError::InvalidState => -911,
            NetError::AboutPathNotConfigured => -912,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether the error is a network-level failure that warrants closing the
    /// connection and resending the request. Protocol framing errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionClosed
                | NetError::ConnectionReset
                | NetError::ConnectionRefused
                | NetError::ConnectionAborted
                | NetError::ConnectionFailed
                | NetError::ConnectionFailedTo { .. }
                | NetError::NameNotResolved
                | NetError::NameNotResolvedFor { .. }
                | NetError::SocketNotConnected
                | NetError::ConnectionTimedOut
                | NetError::EmptyResponse
                | NetError::ContentLengthMismatch
                | NetError::IncompleteChunkedEncoding
                | NetError::ResponseHeadersTruncated
        )
    }

    pub fn connection_failed_to(host: &str, port: u16, source: io::Error) -> Self {
        NetError::ConnectionFailedTo {
            host: host.to_string(),
            port,
            source: Arc::new(source),
        }
    }

    pub fn dns_failed(domain: &str, source: io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            source: Arc::new(source),
        }
    }

    /// Map a socket-level `io::Error` to the closest network error.
    pub fn from_socket(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
                NetError::ConnectionClosed
            }
            _ => NetError::ConnectionFailed,
        }
    }
}

impl PartialEq for NetError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                NetError::ConnectionFailedTo { host: a, port: p, .. },
                NetError::ConnectionFailedTo { host: b, port: q, .. },
            ) => a == b && p == q,
            (
                NetError::NameNotResolvedFor { domain: a, .. },
                NetError::NameNotResolvedFor { domain: b, .. },
            ) => a == b,
            (NetError::Io { source: a }, NetError::Io { source: b }) => a.kind() == b.kind(),
            _ => {
                std::mem::discriminant(self) == std::mem::discriminant(other)
                    && self.as_i32() == other.as_i32()
            }
        }
    }
}

impl Eq for NetError {}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => NetError::FileNotFound,
            io::ErrorKind::PermissionDenied => NetError::AccessDenied,
            _ => NetError::Io {
                source: Arc::new(err),
            },
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -6 => NetError::FileNotFound,
            -10 => NetError::AccessDenied,

            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -302 => NetError::UnknownUrlScheme,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -322 => NetError::MethodNotSupported,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -330 => NetError::ContentDecodingFailed,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -357 => NetError::ResponseHeadersTruncated,
            -370 => NetError::InvalidHttpResponse,
            -375 => NetError::TooManyRetries,

            -910 => NetError::InvalidHeader,
            -911 => NetError::InvalidState,
            -912 => NetError::AboutPathNotConfigured,
            _ => NetError::Unknown(code),
        }
    }
}
