//! Connection-level retry policy.
//!
//! Based on Chromium's `HttpNetworkTransaction::RetryReason` enum and retry logic.
//! See: net/http/http_network_transaction.h
//!
//! Network-level failures close the socket and resend the request right
//! away on a fresh connection. Protocol framing errors are never retried.

use crate::base::neterror::NetError;

/// Resends allowed after the first attempt.
pub const MAX_RETRY_COUNT: usize = 3;

/// Reasons for retrying a request (mirrors Chromium's RetryReason enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// DNS lookup failed
    NameNotResolved,
    /// Could not establish a TCP connection
    ConnectFailed,
    /// Server closed connection unexpectedly
    ConnectionReset,
    /// Connection was closed during request
    ConnectionClosed,
    /// Connection was aborted
    ConnectionAborted,
    /// Socket not connected
    SocketNotConnected,
    /// Empty response received
    EmptyResponse,
    /// HTTP request timeout
    HttpRequestTimeout,
    /// Body or headers cut short by EOF
    Truncated,
}

impl RetryReason {
    /// Map a NetError to a RetryReason, if the error is retryable.
    pub fn from_error(error: &NetError) -> Option<Self> {
        match error {
            NetError::NameNotResolved | NetError::NameNotResolvedFor { .. } => {
                Some(Self::NameNotResolved)
            }
            NetError::ConnectionRefused
            | NetError::ConnectionFailed
            | NetError::ConnectionFailedTo { .. } => Some(Self::ConnectFailed),
            NetError::ConnectionReset => Some(Self::ConnectionReset),
            NetError::ConnectionClosed => Some(Self::ConnectionClosed),
            NetError::ConnectionAborted => Some(Self::ConnectionAborted),
            NetError::SocketNotConnected => Some(Self::SocketNotConnected),
            NetError::EmptyResponse => Some(Self::EmptyResponse),
            NetError::ConnectionTimedOut => Some(Self::HttpRequestTimeout),
            NetError::ContentLengthMismatch
            | NetError::IncompleteChunkedEncoding
            | NetError::ResponseHeadersTruncated => Some(Self::Truncated),
            _ => None,
        }
    }
}

/// How many times a failed exchange is resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_COUNT,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0 }
    }

    /// Decide whether an exchange that has already been resent `retries`
    /// times should be resent again after `error`.
    pub fn should_retry(&self, retries: usize, error: &NetError) -> Option<RetryReason> {
        if retries >= self.max_retries {
            return None;
        }
        RetryReason::from_error(error)
    }
}
