//! Scheme dispatch for a request.
//!
//! `http:` goes to the network (through the cache for GET and HEAD). The
//! local schemes are answered immediately from the filesystem or the URL
//! itself.

use crate::base::neterror::NetError;
use crate::http::body::{Body, Spool};
use crate::http::request::RequestMessage;
use crate::http::response::ResponseMessage;
use crate::urlrequest::context::ClientConfig;
use crate::urlrequest::data::DataUrl;
use http::Method;
use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    Empty,
    File,
    About,
    Data,
    Http,
    Https,
    Unknown,
}

impl Scheme {
    pub(crate) fn of(url: Option<&Url>) -> Self {
        let Some(url) = url else {
            return Scheme::Empty;
        };
        match url.scheme() {
            "file" => Scheme::File,
            "about" => Scheme::About,
            "data" => Scheme::Data,
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => Scheme::Unknown,
        }
    }
}

/// Result of a local load: headers plus the body, if any.
pub(crate) type Loaded = (ResponseMessage, Option<Body>);

/// Answer a request for a non-network scheme.
pub(crate) fn load_local(
    scheme: Scheme,
    message: &RequestMessage,
    config: &ClientConfig,
) -> Result<Loaded, NetError> {
    let url = message.url.as_ref();
    match (scheme, url) {
        (Scheme::Empty, _) => Ok((ResponseMessage::new(), None)),
        (Scheme::File, Some(url)) => {
            require_get(message)?;
            open_file(&file_path(url)?)
        }
        (Scheme::About, Some(url)) => {
            require_get(message)?;
            let root = config.about_path().ok_or(NetError::AboutPathNotConfigured)?;
            open_file(&about_path(root, url)?)
        }
        (Scheme::Data, Some(url)) => {
            let data = DataUrl::parse(url)?;
            let mut spool = Spool::new(&config.spool_dir())?;
            spool.write_all(&data.data)?;
            let mut response = local_response(spool.len());
            response.headers.set("Content-Type", &data.content_type(), false);
            response.refresh();
            Ok((response, Some(spool.into_body())))
        }
        (Scheme::Https, _) => Err(NetError::DisallowedUrlScheme),
        _ => Err(NetError::UnknownUrlScheme),
    }
}

fn require_get(message: &RequestMessage) -> Result<(), NetError> {
    if message.method == Method::GET {
        Ok(())
    } else {
        Err(NetError::MethodNotSupported)
    }
}

fn file_path(url: &Url) -> Result<PathBuf, NetError> {
    match url.host_str() {
        None | Some("") => {}
        Some(host) if host.eq_ignore_ascii_case("localhost") => {}
        Some(_) => return Err(NetError::InvalidUrl),
    }
    url.to_file_path().map_err(|_| NetError::InvalidUrl)
}

/// `about:name` maps to `<about_path>/name`; nothing may escape the root.
fn about_path(root: &Path, url: &Url) -> Result<PathBuf, NetError> {
    let name = url.path();
    let relative = Path::new(name);
    if name.is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(NetError::InvalidUrl);
    }
    Ok(root.join(relative))
}

fn open_file(path: &Path) -> Result<Loaded, NetError> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(NetError::FileNotFound);
    }
    let body = Body::from_file(file)?;
    tracing::debug!(path = %path.display(), bytes = body.len(), "local file");
    Ok((local_response(body.len()), Some(body)))
}

fn local_response(len: u64) -> ResponseMessage {
    let mut response = ResponseMessage::new();
    response.headers.set("Content-Length", &len.to_string(), false);
    response.refresh();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::HttpVersion;

    fn message(method: &str, url: &str) -> RequestMessage {
        let mut m = RequestMessage::new(HttpVersion::Http11);
        m.open(method, Some(Url::parse(url).unwrap()), "test").unwrap();
        m
    }

    #[test]
    fn test_scheme_of() {
        assert_eq!(Scheme::of(None), Scheme::Empty);
        let url = Url::parse("ftp://example.com/").unwrap();
        assert_eq!(Scheme::of(Some(&url)), Scheme::Unknown);
        let url = Url::parse("HTTP://example.com/").unwrap();
        assert_eq!(Scheme::of(Some(&url)), Scheme::Http);
    }

    #[test]
    fn test_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html></html>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let config = ClientConfig::default();
        let (response, body) = load_local(Scheme::File, &message("GET", url.as_str()), &config).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_length, Some(13));
        assert_eq!(body.unwrap().text().unwrap(), "<html></html>");

        assert_eq!(
            load_local(Scheme::File, &message("POST", url.as_str()), &config).unwrap_err(),
            NetError::MethodNotSupported
        );
    }

    #[test]
    fn test_file_url_remote_host_rejected() {
        let config = ClientConfig::default();
        let err = load_local(Scheme::File, &message("GET", "file://server/etc/hosts"), &config).unwrap_err();
        assert_eq!(err, NetError::InvalidUrl);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing")).unwrap();
        let config = ClientConfig::default();
        let err = load_local(Scheme::File, &message("GET", url.as_str()), &config).unwrap_err();
        assert_eq!(err, NetError::FileNotFound);
    }

    #[test]
    fn test_about_requires_configuration() {
        let config = ClientConfig::default();
        let err = load_local(Scheme::About, &message("GET", "about:blank"), &config).unwrap_err();
        assert_eq!(err, NetError::AboutPathNotConfigured);
    }

    #[test]
    fn test_about_maps_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank"), "").unwrap();
        let config = ClientConfig {
            about_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (response, body) = load_local(Scheme::About, &message("GET", "about:blank"), &config).unwrap();
        assert_eq!(response.content_length, Some(0));
        assert!(body.unwrap().is_empty());
    }

    #[test]
    fn test_about_cannot_escape_root() {
        let root = Path::new("/srv/about");
        let url = Url::parse("about:../secret").unwrap();
        assert_eq!(about_path(root, &url), Err(NetError::InvalidUrl));
    }

    #[test]
    fn test_data_url() {
        let config = ClientConfig::default();
        let (response, body) =
            load_local(Scheme::Data, &message("GET", "data:text/plain;base64,aGk="), &config).unwrap();
        assert_eq!(response.content_type.as_deref(), Some("text/plain"));
        assert_eq!(body.unwrap().text().unwrap(), "hi");
    }

    #[test]
    fn test_https_refused() {
        let config = ClientConfig::default();
        let err = load_local(Scheme::Https, &message("GET", "https://example.com/"), &config).unwrap_err();
        assert_eq!(err, NetError::DisallowedUrlScheme);
    }
}
