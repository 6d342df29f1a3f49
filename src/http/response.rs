//! Incoming HTTP response message and its cache semantics.
//!
//! Besides the raw status line and headers, a [`ResponseMessage`] carries a
//! few fields derived from the headers (framing, media type, cache
//! directives). They are recomputed by [`ResponseMessage::refresh`] every time
//! the header list changes.

use crate::base::neterror::NetError;
use crate::http::date::parse_time;
use crate::http::headers::HeaderList;
use crate::http::request::HttpVersion;
use std::fmt;

/// Status codes whose responses may be stored in (or replace) a cache entry.
pub const CACHEABLE_STATUS: &[u16] = &[200, 203, 206, 300, 301, 410];

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Freshness lifetime meaning "never goes stale".
pub const INFINITE_LIFETIME: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub version: HttpVersion,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderList,

    pub is_chunked: bool,
    pub content_length: Option<u64>,
    /// Lower-cased `type/subtype`.
    pub content_type: Option<String>,
    pub content_charset: Option<String>,
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<u64>,
}

impl Default for ResponseMessage {
    fn default() -> Self {
        Self {
            version: HttpVersion::Http11,
            status: 200,
            status_text: "OK".to_string(),
            headers: HeaderList::new(),
            is_chunked: false,
            content_length: None,
            content_type: None,
            content_charset: None,
            no_cache: false,
            no_store: false,
            max_age: None,
        }
    }
}

impl ResponseMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a status line (without its line terminator).
    ///
    /// Returns `Ok(false)` when the line carries no `HTTP/` token: the
    /// response is HTTP/0.9 and the line is the first piece of the body.
    pub fn parse_status_line(&mut self, line: &[u8]) -> Result<bool, NetError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_start();
        let Some(rest) = strip_prefix_ignore_case(line, "HTTP/") else {
            self.version = HttpVersion::Http09;
            self.status = 200;
            self.status_text = "OK".to_string();
            return Ok(false);
        };

        let (version, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let (major, minor) = version.split_once('.').ok_or(NetError::InvalidHttpResponse)?;
        let major: u32 = parse_digits(major).ok_or(NetError::InvalidHttpResponse)?;
        let minor: u32 = parse_digits(minor).ok_or(NetError::InvalidHttpResponse)?;
        self.version = match (major, minor) {
            (0, _) => HttpVersion::Http09,
            (1, 0) => HttpVersion::Http10,
            _ => HttpVersion::Http11,
        };

        let rest = rest.trim_start();
        let (code, reason) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        match parse_digits::<u16>(code).filter(|c| (100..=999).contains(c)) {
            Some(code) => {
                self.status = code;
                let reason = reason.trim();
                self.status_text = if reason.is_empty() {
                    http::StatusCode::from_u16(code)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("OK")
                        .to_string()
                } else {
                    reason.to_string()
                };
            }
            None => {
                self.status = 200;
                self.status_text = "OK".to_string();
            }
        }
        Ok(true)
    }

    /// Parse one header line and reclassify the derived fields.
    pub fn parse_header(&mut self, line: &[u8]) -> Result<usize, NetError> {
        let pos = self.headers.parse_line(line)?;
        self.refresh();
        Ok(pos)
    }

    /// Recompute the fields derived from the header list.
    pub fn refresh(&mut self) {
        self.content_length = self.headers.get("content-length").and_then(parse_length);

        self.content_type = None;
        self.content_charset = None;
        if let Some(value) = self.headers.get("content-type") {
            let mut params = value.split(';');
            let media = params.next().unwrap_or("").trim().to_ascii_lowercase();
            if !media.is_empty() {
                self.content_type = Some(media);
            }
            for param in params {
                if let Some((key, val)) = param.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("charset") {
                        let charset = val.trim().trim_matches(|c| c == '"' || c == '\'');
                        if !charset.is_empty() {
                            self.content_charset = Some(charset.to_string());
                        }
                    }
                }
            }
        }

        self.no_cache = false;
        self.no_store = false;
        self.max_age = None;
        if let Some(value) = self.headers.get("cache-control") {
            for directive in value.split(',') {
                let (name, arg) = match directive.split_once('=') {
                    Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                    None => (directive.trim(), None),
                };
                if name.eq_ignore_ascii_case("no-cache") && arg.is_none() {
                    self.no_cache = true;
                } else if name.eq_ignore_ascii_case("no-store") {
                    self.no_store = true;
                } else if name.eq_ignore_ascii_case("max-age") {
                    self.max_age = arg.and_then(parse_length);
                }
            }
        }
        if has_token(self.headers.get("pragma"), "no-cache") {
            self.no_cache = true;
        }

        self.is_chunked = has_token(self.headers.get("transfer-encoding"), "chunked");
    }

    /// Whether a response to `method` with this status carries a body.
    pub fn has_body(&self, method: &http::Method) -> bool {
        !(method == http::Method::HEAD
            || self.status == 204
            || self.status == 304
            || (100..200).contains(&self.status))
    }

    pub fn date(&self) -> Option<i64> {
        self.headers.get("date").and_then(parse_time)
    }

    pub fn last_modified(&self) -> Option<i64> {
        self.headers.get("last-modified").and_then(parse_time)
    }

    /// Seconds this response may be served from cache without revalidation.
    pub fn freshness_lifetime(&self, now: i64) -> u64 {
        if let Some(max_age) = self.max_age {
            return max_age;
        }

        let date = self.date().unwrap_or(now);
        if let Some(expires) = self.headers.get("expires") {
            // An unparseable Expires means "already expired".
            return parse_time(expires).map_or(0, |e| (e - date).max(0) as u64);
        }
        if let Some(last_modified) = self.last_modified() {
            if last_modified <= date {
                return ((date - last_modified) / 10) as u64;
            }
        }
        if self.status == 300 || self.status == 301 {
            return INFINITE_LIFETIME;
        }
        0
    }

    /// Seconds since the origin asserted this response, adjusted for the
    /// time the request spent in flight.
    pub fn current_age(&self, now: i64, request_time: i64) -> u64 {
        let apparent = self.date().map_or(0, |d| (now - d).max(0) as u64);
        let age_header = self
            .headers
            .get("age")
            .and_then(parse_length)
            .unwrap_or(0);
        let in_flight = (now - request_time).max(0) as u64;
        apparent.max(age_header).saturating_add(in_flight)
    }

    /// Fresh responses may be served without touching the network.
    pub fn is_fresh(&self, now: i64, request_time: i64) -> bool {
        !self.no_cache && self.freshness_lifetime(now) > self.current_age(now, request_time)
    }

    /// Fold a newer response for the same resource into this one.
    ///
    /// A `304` merges its end-to-end headers; a cacheable status replaces the
    /// message wholesale. Returns `false` (leaving `self` untouched) for any
    /// other status.
    pub fn update(&mut self, other: &ResponseMessage) -> bool {
        if other.status == 304 {
            // The stored body stays, so its length does too.
            for (name, value) in other.headers.iter() {
                if !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-length") {
                    self.headers.set(name, value, false);
                }
            }
            self.refresh();
            return true;
        }
        if !CACHEABLE_STATUS.contains(&other.status) {
            return false;
        }

        self.version = other.version;
        self.status = other.status;
        self.status_text = other.status_text.clone();
        self.headers.clear();
        for (name, value) in other.headers.iter() {
            if !is_hop_by_hop(name) {
                self.headers.set(name, value, false);
            }
        }
        self.refresh();
        true
    }

    /// Append the trailer section of a chunked body. Framing and hop-by-hop
    /// fields are dropped.
    pub fn merge_trailers(&mut self, trailers: &HeaderList) {
        if trailers.is_empty() {
            return;
        }
        for (name, value) in trailers.iter() {
            if !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-length") {
                self.headers.set(name, value, true);
            }
        }
        self.refresh();
    }
}

impl fmt::Display for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version != HttpVersion::Http09 {
            write!(
                f,
                "{} {} {}\r\n{}\r\n",
                self.version.as_str(),
                self.status,
                self.status_text,
                self.headers
            )?;
        }
        Ok(())
    }
}

pub fn is_cacheable_status(status: u16) -> bool {
    CACHEABLE_STATUS.contains(&status)
}

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Unsigned decimal, saturating at `u64::MAX` instead of failing on overflow.
fn parse_length(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    }))
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn has_token(value: Option<&str>, token: &str) -> bool {
    value.is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_headers(status: u16, headers: &[(&str, &str)]) -> ResponseMessage {
        let mut resp = ResponseMessage::new();
        resp.status = status;
        for (n, v) in headers {
            resp.headers.set(n, v, false);
        }
        resp.refresh();
        resp
    }

    #[test]
    fn test_merge_trailers() {
        let mut resp = with_headers(200, &[("Transfer-Encoding", "chunked"), ("Vary", "Accept")]);
        let mut trailers = HeaderList::new();
        trailers.set("X-Checksum", "abc", false);
        trailers.set("Content-Length", "12", false);
        trailers.set("Connection", "close", false);
        trailers.set("Vary", "Origin", false);
        resp.merge_trailers(&trailers);

        assert_eq!(resp.headers.get("x-checksum"), Some("abc"));
        assert_eq!(resp.headers.get("vary"), Some("Accept, Origin"));
        assert_eq!(resp.content_length, None);
        assert!(!resp.headers.contains("connection"));
        assert!(resp.is_chunked);
    }

    #[test]
    fn test_status_line() {
        let mut resp = ResponseMessage::new();
        assert!(resp.parse_status_line(b"HTTP/1.0 404 Not Found").unwrap());
        assert_eq!(resp.version, HttpVersion::Http10);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.status_text, "Not Found");
    }

    #[test]
    fn test_status_line_defaults() {
        let mut resp = ResponseMessage::new();
        assert!(resp.parse_status_line(b"HTTP/1.1 abc").unwrap());
        assert_eq!(resp.status, 200);
        assert_eq!(resp.status_text, "OK");

        assert!(resp.parse_status_line(b"HTTP/1.1 204").unwrap());
        assert_eq!(resp.status, 204);
        assert_eq!(resp.status_text, "No Content");
    }

    #[test]
    fn test_status_line_http09() {
        let mut resp = ResponseMessage::new();
        assert!(!resp.parse_status_line(b"<html>hello").unwrap());
        assert_eq!(resp.version, HttpVersion::Http09);
    }

    #[test]
    fn test_status_line_bad_version() {
        let mut resp = ResponseMessage::new();
        assert_eq!(
            resp.parse_status_line(b"HTTP/x.y 200 OK"),
            Err(NetError::InvalidHttpResponse)
        );
    }

    #[test]
    fn test_content_length_saturates() {
        let resp = with_headers(200, &[("Content-Length", "99999999999999999999999")]);
        assert_eq!(resp.content_length, Some(u64::MAX));
        let resp = with_headers(200, &[("Content-Length", "12x")]);
        assert_eq!(resp.content_length, None);
    }

    #[test]
    fn test_content_type_and_charset() {
        let resp = with_headers(200, &[("Content-Type", "Text/HTML; Charset=\"UTF-8\"")]);
        assert_eq!(resp.content_type.as_deref(), Some("text/html"));
        assert_eq!(resp.content_charset.as_deref(), Some("UTF-8"));

        let resp = with_headers(200, &[("Content-Type", "text/plain; charset='latin1'")]);
        assert_eq!(resp.content_charset.as_deref(), Some("latin1"));
    }

    #[test]
    fn test_cache_control_directives() {
        let resp = with_headers(200, &[("Cache-Control", "no-cache=\"Set-Cookie\", max-age=30")]);
        assert!(!resp.no_cache);
        assert_eq!(resp.max_age, Some(30));

        let resp = with_headers(200, &[("Cache-Control", "no-cache, no-store")]);
        assert!(resp.no_cache);
        assert!(resp.no_store);

        let resp = with_headers(200, &[("Pragma", "no-cache")]);
        assert!(resp.no_cache);
    }

    #[test]
    fn test_parse_header_refreshes() {
        let mut resp = ResponseMessage::new();
        resp.parse_header(b"Transfer-Encoding: gzip\r\n").unwrap();
        assert!(!resp.is_chunked);
        resp.parse_header(b"Transfer-Encoding: chunked\r\n").unwrap();
        assert!(resp.is_chunked);
    }

    #[test]
    fn test_max_age_wins() {
        let resp = with_headers(
            200,
            &[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Cache-Control", "max-age=60"),
                ("Expires", "Sun, 06 Nov 1994 09:49:37 GMT"),
                ("Last-Modified", "Sun, 06 Nov 1993 08:49:37 GMT"),
            ],
        );
        assert_eq!(resp.freshness_lifetime(0), 60);
    }

    #[test]
    fn test_expires_lifetime() {
        let resp = with_headers(
            200,
            &[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Expires", "Sun, 06 Nov 1994 08:50:37 GMT"),
            ],
        );
        assert_eq!(resp.freshness_lifetime(0), 60);

        let expired = with_headers(
            200,
            &[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Expires", "0"),
            ],
        );
        assert_eq!(expired.freshness_lifetime(0), 0);
    }

    #[test]
    fn test_heuristic_lifetime() {
        let resp = with_headers(
            200,
            &[
                ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("Last-Modified", "Sun, 06 Nov 1994 08:32:57 GMT"),
            ],
        );
        assert_eq!(resp.freshness_lifetime(0), 100);
    }

    #[test]
    fn test_redirect_lifetime_infinite() {
        let resp = with_headers(301, &[]);
        assert_eq!(resp.freshness_lifetime(0), INFINITE_LIFETIME);
        let resp = with_headers(302, &[]);
        assert_eq!(resp.freshness_lifetime(0), 0);
    }

    #[test]
    fn test_current_age() {
        let date = parse_time("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let resp = with_headers(200, &[("Date", "Sun, 06 Nov 1994 08:49:37 GMT"), ("Age", "5")]);
        // Apparent age 10 beats Age 5, plus 2 seconds in flight.
        assert_eq!(resp.current_age(date + 10, date + 8), 12);
        // Age header wins when the clock says less.
        assert_eq!(resp.current_age(date + 1, date + 1), 5);
    }

    #[test]
    fn test_is_fresh() {
        let now = 1_000_000;
        let resp = with_headers(200, &[("Cache-Control", "max-age=60")]);
        assert!(resp.is_fresh(now, now));
        assert!(!resp.is_fresh(now + 60, now));

        let resp = with_headers(200, &[("Cache-Control", "max-age=60, no-cache")]);
        assert!(!resp.is_fresh(now, now));
    }

    #[test]
    fn test_update_304_merges() {
        let mut cached = with_headers(
            200,
            &[("ETag", "\"v1\""), ("Content-Type", "text/plain"), ("Cache-Control", "max-age=0")],
        );
        let not_modified = with_headers(
            304,
            &[("Cache-Control", "max-age=120"), ("Connection", "close")],
        );
        assert!(cached.update(&not_modified));
        assert_eq!(cached.status, 200);
        assert_eq!(cached.max_age, Some(120));
        assert_eq!(cached.headers.get("etag"), Some("\"v1\""));
        assert!(cached.headers.get("connection").is_none());
    }

    #[test]
    fn test_update_replaces_and_strips_hop_by_hop() {
        let mut cached = with_headers(200, &[("ETag", "\"v1\"")]);
        let fresh = with_headers(
            200,
            &[("ETag", "\"v2\""), ("Transfer-Encoding", "chunked"), ("Keep-Alive", "timeout=5")],
        );
        assert!(cached.update(&fresh));
        assert_eq!(cached.headers.get("etag"), Some("\"v2\""));
        assert!(!cached.is_chunked);
        assert!(cached.headers.get("keep-alive").is_none());
    }

    #[test]
    fn test_update_rejects_uncacheable_status() {
        let mut cached = with_headers(200, &[("ETag", "\"v1\"")]);
        let error = with_headers(500, &[("ETag", "\"bad\"")]);
        assert!(!cached.update(&error));
        assert_eq!(cached.headers.get("etag"), Some("\"v1\""));
    }
}
