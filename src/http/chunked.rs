//! Incremental decoder for `Transfer-Encoding: chunked` bodies.
//!
//! ```text
//! <hex-size>[;ext]\r\n<data>\r\n ... 0\r\n<trailer lines>\r\n
//! ```
//!
//! The decoder is fed whatever the socket delivered so far and consumes as
//! much of it as it can; incomplete framing stays in the buffer for the next
//! read.

use crate::base::neterror::NetError;
use crate::http::headers::HeaderList;
use bytes::{Buf, BytesMut};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a chunk-size line.
    Size,
    /// Copying chunk data; bytes remaining in this chunk.
    Data(u64),
    /// Expecting the CRLF that closes a chunk.
    DataEnd,
    /// Reading trailer lines after the last chunk.
    Trailer,
    Done,
}

#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    phase: Phase,
    max_line: usize,
}

impl ChunkedDecoder {
    pub fn new(max_line: usize) -> Self {
        Self {
            phase: Phase::Size,
            max_line,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the last chunk has been seen and only trailers remain.
    pub fn in_trailer(&self) -> bool {
        self.phase == Phase::Trailer
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Consume framing from `buf`, writing chunk data to `out` and trailer
    /// headers to `trailers`.
    ///
    /// Returns `Ok(true)` once the terminating blank line has been consumed.
    pub fn decode<W: Write>(
        &mut self,
        buf: &mut BytesMut,
        out: &mut W,
        trailers: &mut HeaderList,
    ) -> Result<bool, NetError> {
        loop {
            match self.phase {
                Phase::Size => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(false);
                    };
                    let size = parse_chunk_size(&line)?;
                    tracing::trace!(size, "chunk header");
                    self.phase = if size == 0 {
                        Phase::Trailer
                    } else {
                        Phase::Data(size)
                    };
                }
                Phase::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(false);
                    }
                    let n = usize::try_from(remaining)
                        .unwrap_or(usize::MAX)
                        .min(buf.len());
                    let data = buf.split_to(n);
                    out.write_all(&data)?;
                    let remaining = remaining - n as u64;
                    self.phase = if remaining == 0 {
                        Phase::DataEnd
                    } else {
                        Phase::Data(remaining)
                    };
                }
                Phase::DataEnd => {
                    if buf.starts_with(b"\r\n") {
                        buf.advance(2);
                    } else if buf.starts_with(b"\n") {
                        buf.advance(1);
                    } else if buf.is_empty() || &buf[..] == b"\r" {
                        return Ok(false);
                    } else {
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    self.phase = Phase::Size;
                }
                Phase::Trailer => {
                    let Some(line) = self.take_line(buf)? else {
                        return Ok(false);
                    };
                    if line.is_empty() || &line[..] == b"\r" {
                        self.phase = Phase::Done;
                        return Ok(true);
                    }
                    let mut terminated = line.to_vec();
                    terminated.push(b'\n');
                    trailers.parse_line(&terminated)?;
                }
                Phase::Done => return Ok(true),
            }
        }
    }

    /// Split off one line (without its `\n`), or `None` if incomplete.
    fn take_line(&self, buf: &mut BytesMut) -> Result<Option<BytesMut>, NetError> {
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line = buf.split_to(pos);
                buf.advance(1);
                Ok(Some(line))
            }
            None if buf.len() > self.max_line => Err(NetError::InvalidChunkedEncoding),
            None => Ok(None),
        }
    }
}

/// `1a;name=value\r` -> 26. Extensions are ignored.
fn parse_chunk_size(line: &[u8]) -> Result<u64, NetError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let digits = trim_ascii(digits);
    if !digits.first().is_some_and(u8::is_ascii_hexdigit) {
        return Err(NetError::InvalidChunkedEncoding);
    }

    let mut size: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(NetError::InvalidChunkedEncoding),
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(u64::from(digit)))
            .ok_or(NetError::InvalidChunkedEncoding)?;
    }
    Ok(size)
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}
