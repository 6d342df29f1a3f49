//! `data:` URL decoding.

use crate::base::neterror::NetError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use percent_encoding::percent_decode_str;
use url::Url;

const DEFAULT_MIME: &str = "text/plain";
const DEFAULT_CHARSET: &str = "US-ASCII";

/// Accepts input with or without trailing `=`.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub charset: Option<String>,
    pub data: Vec<u8>,
}

impl DataUrl {
    /// Parse `data:[<mediatype>][;base64],<data>`.
    pub fn parse(url: &Url) -> Result<Self, NetError> {
        if url.scheme() != "data" {
            return Err(NetError::InvalidUrl);
        }
        let mut content = url.path().to_string();
        if let Some(query) = url.query() {
            content.push('?');
            content.push_str(query);
        }
        let (meta, payload) = content.split_once(',').ok_or(NetError::InvalidUrl)?;

        let mut params = meta.split(';');
        let mime = params.next().unwrap_or("").trim().to_ascii_lowercase();
        let mut charset = None;
        let mut is_base64 = false;
        for param in params {
            let param = param.trim();
            if param.eq_ignore_ascii_case("base64") {
                is_base64 = true;
            } else if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("charset") {
                    charset = Some(value.trim().trim_matches('"').to_string());
                }
            }
        }

        let (mime_type, charset) = if mime.is_empty() {
            (DEFAULT_MIME.to_string(), charset.or_else(|| Some(DEFAULT_CHARSET.to_string())))
        } else {
            (mime, charset)
        };

        let decoded: Vec<u8> = percent_decode_str(payload).collect();
        let data = if is_base64 {
            let compact: Vec<u8> = decoded
                .into_iter()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            BASE64.decode(compact).map_err(|e| {
                tracing::debug!(error = %e, "bad base64 in data URL");
                NetError::InvalidUrl
            })?
        } else {
            decoded
        };

        Ok(Self {
            mime_type,
            charset,
            data,
        })
    }

    /// `type/subtype` plus the charset parameter, if any.
    pub fn content_type(&self) -> String {
        match &self.charset {
            Some(charset) => format!("{};charset={}", self.mime_type, charset),
            None => self.mime_type.clone(),
        }
    }
}
