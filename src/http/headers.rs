//! Ordered, case-insensitive header list.
//!
//! Headers keep their original casing and insertion order so a parsed
//! message serializes back to the same block. Lookup ignores case.

use crate::base::neterror::NetError;
use std::fmt;

/// Headers whose values are comma-separated lists; `set(.., merge = true)`
/// appends to these instead of replacing them.
const LIST_HEADERS: &[&str] = &[
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "connection",
    "content-encoding",
    "content-language",
    "expect",
    "if-match",
    "if-none-match",
    "pragma",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "vary",
    "via",
    "warning",
];

/// An ordered multimap of header name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    /// Headers as (original_name, value) pairs
    headers: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Parse one `Name: value` line from the start of `buf`.
    ///
    /// Returns the position just past the line's `\n`.
    pub fn parse_line(&mut self, buf: &[u8]) -> Result<usize, NetError> {
        let end = buf
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(NetError::InvalidHeader)?;
        let mut line = &buf[..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(NetError::InvalidHeader)?;
        let name = &line[..colon];
        if !is_token(name) {
            return Err(NetError::InvalidHeader);
        }
        let value = trim_lws(&line[colon + 1..]);

        // Token bytes are ASCII; values are kept lossily for obs-text.
        let name = String::from_utf8_lossy(name);
        let value = String::from_utf8_lossy(value);
        self.set(&name, &value, true);
        Ok(end + 1)
    }

    /// Parse a header block terminated by an empty line.
    ///
    /// Returns the position just past the terminator.
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize, NetError> {
        let mut pos = 0;
        loop {
            let rest = &buf[pos..];
            if rest.starts_with(b"\r\n") {
                return Ok(pos + 2);
            }
            if rest.starts_with(b"\n") {
                return Ok(pos + 1);
            }
            if rest.is_empty() {
                return Err(NetError::InvalidHeader);
            }
            pos += self.parse_line(rest)?;
        }
    }

    /// Set a header.
    ///
    /// An empty value deletes the header unless merging onto an existing one.
    pub fn set(&mut self, name: &str, value: &str, merge: bool) {
        let value = value.trim_matches(|c| c == ' ' || c == '\t');
        let existing = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name));

        match existing {
            Some((_, v)) if merge => {
                if value.is_empty() {
                    return;
                }
                if is_list_header(name) && !v.is_empty() {
                    v.push_str(", ");
                    v.push_str(value);
                } else {
                    *v = value.to_string();
                }
            }
            Some(_) if value.is_empty() => self.erase(name),
            Some((_, v)) => *v = value.to_string(),
            None if value.is_empty() => {}
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Get header value (case-insensitive lookup, first occurrence).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove the first header matching `name`.
    pub fn erase(&mut self, name: &str) {
        if let Some(idx) = self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            self.headers.remove(idx);
        }
    }

    /// Get all headers as-is with original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

pub(crate) fn is_list_header(name: &str) -> bool {
    LIST_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// RFC 7230 `token`.
pub(crate) fn is_token(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|&b| is_tchar(b))
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

fn trim_lws(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}
