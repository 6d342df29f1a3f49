//! Outgoing HTTP request message.

use crate::base::neterror::NetError;
use crate::http::headers::HeaderList;
use bytes::{BufMut, Bytes, BytesMut};
use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Wire protocol version of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HttpVersion {
    /// Request line only, no headers; the response is the raw body.
    Http09,
    Http10,
    #[default]
    Http11,
}

impl HttpVersion {
    /// The version as a two-digit number (9, 10, 11).
    pub fn number(self) -> u8 {
        match self {
            HttpVersion::Http09 => 9,
            HttpVersion::Http10 => 10,
            HttpVersion::Http11 => 11,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http09 => "HTTP/0.9",
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

impl TryFrom<u8> for HttpVersion {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            9 => Ok(HttpVersion::Http09),
            10 => Ok(HttpVersion::Http10),
            11 => Ok(HttpVersion::Http11),
            other => Err(format!("unsupported HTTP version {}", other)),
        }
    }
}

impl From<HttpVersion> for u8 {
    fn from(v: HttpVersion) -> u8 {
        v.number()
    }
}

/// A request line plus headers and an optional body.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    pub version: HttpVersion,
    pub method: Method,
    /// `None` is the empty URL.
    pub url: Option<Url>,
    pub headers: HeaderList,
    pub body: Option<Bytes>,
}

impl Default for RequestMessage {
    fn default() -> Self {
        Self::new(HttpVersion::default())
    }
}

impl RequestMessage {
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            method: Method::GET,
            url: None,
            headers: HeaderList::new(),
            body: None,
        }
    }

    /// Set method and URL, and the default `User-Agent`.
    ///
    /// The method is upper-cased; extension methods are accepted as long as
    /// they are valid tokens.
    pub fn open(&mut self, method: &str, url: Option<Url>, user_agent: &str) -> Result<(), NetError> {
        let upper = method.trim().to_ascii_uppercase();
        self.method = Method::from_bytes(upper.as_bytes()).map_err(|_| NetError::MethodNotSupported)?;
        self.url = url;
        self.headers.clear();
        self.body = None;
        self.headers.set("User-Agent", user_agent, false);
        Ok(())
    }

    /// GET and HEAD go through the cache; everything else bypasses it.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// `(hostname, port)` the request is sent to.
    pub fn host_port(&self) -> Option<(String, u16)> {
        let url = self.url.as_ref()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some((host.to_string(), port))
    }

    /// Request target: path plus query.
    pub fn target(&self) -> String {
        let Some(url) = self.url.as_ref() else {
            return "/".to_string();
        };
        let path = if url.path().is_empty() { "/" } else { url.path() };
        match url.query() {
            Some(q) => format!("{}?{}", path, q),
            None => path.to_string(),
        }
    }

    fn host_header(&self) -> Option<String> {
        let url = self.url.as_ref()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Serialized request head and body, ready for the socket.
    pub fn to_bytes(&self) -> Bytes {
        let head = self.to_string();
        let body_len = match self.version {
            HttpVersion::Http09 => 0,
            _ => self.body.as_ref().map_or(0, |b| b.len()),
        };
        let mut buf = BytesMut::with_capacity(head.len() + body_len);
        buf.put_slice(head.as_bytes());
        if body_len > 0 {
            if let Some(body) = &self.body {
                buf.put_slice(body);
            }
        }
        buf.freeze()
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == HttpVersion::Http09 {
            return write!(f, "GET {}\r\n", self.target());
        }

        write!(f, "{} {} {}\r\n", self.method, self.target(), self.version.as_str())?;
        let derived_host = match self.version {
            HttpVersion::Http11 => self.host_header(),
            _ => None,
        };
        if let Some(host) = &derived_host {
            write!(f, "Host: {}\r\n", host)?;
        }
        for (name, value) in self.headers.iter() {
            if derived_host.is_some() && name.eq_ignore_ascii_case("host") {
                continue;
            }
            if self.body.is_some() && name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            write!(f, "{}: {}\r\n", name, value)?;
        }
        if let Some(body) = &self.body {
            write!(f, "Content-Length: {}\r\n", body.len())?;
        }
        f.write_str("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, url: &str) -> RequestMessage {
        let mut req = RequestMessage::new(HttpVersion::Http11);
        req.open(method, Some(Url::parse(url).unwrap()), "fetchnet-test")
            .unwrap();
        req
    }

    #[test]
    fn test_open_uppercases_method() {
        let req = request("get", "http://example.com/");
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.headers.get("user-agent"), Some("fetchnet-test"));
    }

    #[test]
    fn test_extension_method_allowed() {
        let req = request("purge", "http://example.com/");
        assert_eq!(req.method.as_str(), "PURGE");
        assert!(!req.is_cacheable_method());
    }

    #[test]
    fn test_invalid_method_rejected() {
        let mut req = RequestMessage::default();
        assert_eq!(
            req.open("BAD METHOD", None, "ua"),
            Err(NetError::MethodNotSupported)
        );
        assert_eq!(req.open("", None, "ua"), Err(NetError::MethodNotSupported));
    }

    #[test]
    fn test_serialize_http11() {
        let req = request("GET", "http://example.com/a/b?x=1#frag");
        let wire = req.to_string();
        assert_eq!(
            wire,
            "GET /a/b?x=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: fetchnet-test\r\n\r\n"
        );
    }

    #[test]
    fn test_host_header_explicit_port() {
        let mut req = request("GET", "http://example.com:8080/");
        req.headers.set("Host", "stale.example", false);
        let wire = req.to_string();
        assert!(wire.contains("Host: example.com:8080\r\n"));
        assert!(!wire.contains("stale.example"));
    }

    #[test]
    fn test_serialize_http09() {
        let mut req = request("GET", "http://example.com/index.html");
        req.version = HttpVersion::Http09;
        assert_eq!(req.to_string(), "GET /index.html\r\n");
    }

    #[test]
    fn test_serialize_http10_has_no_derived_host() {
        let mut req = request("HEAD", "http://example.com/");
        req.version = HttpVersion::Http10;
        assert!(req.to_string().starts_with("HEAD / HTTP/1.0\r\n"));
        assert!(!req.to_string().contains("Host:"));
    }

    #[test]
    fn test_body_sets_content_length() {
        let mut req = request("POST", "http://example.com/submit");
        req.body = Some(Bytes::from_static(b"a=1&b=2"));
        let bytes = req.to_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("\r\n\r\na=1&b=2"));
    }

    #[test]
    fn test_host_port_default() {
        let req = request("GET", "http://example.com/");
        assert_eq!(req.host_port(), Some(("example.com".to_string(), 80)));
    }

    #[test]
    fn test_version_serde() {
        let v: HttpVersion = serde_json::from_str("10").unwrap();
        assert_eq!(v, HttpVersion::Http10);
        assert_eq!(serde_json::to_string(&HttpVersion::Http09).unwrap(), "9");
        assert!(serde_json::from_str::<HttpVersion>("20").is_err());
    }
}
