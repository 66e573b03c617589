//! Absolute URLs pointing back at mounted trees.

use axum::http::header::HOST;
use axum::http::HeaderMap;
use osboot_distro::UrlBuilder;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Bytes escaped in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Builds file URLs for one mount as seen by the requesting client.
#[derive(Debug, Clone)]
pub struct RequestUrls {
    origin: String,
    prefix: String,
}

impl RequestUrls {
    /// Use the request's `Host` and `X-Forwarded-Proto` headers, falling back
    /// to `fallback_host` and plain HTTP.
    pub fn from_headers(headers: &HeaderMap, fallback_host: &str, prefix: &str) -> Self {
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(fallback_host);
        let scheme = headers
            .get(FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|scheme| matches!(*scheme, "http" | "https"))
            .unwrap_or("http");
        Self {
            origin: format!("{scheme}://{host}"),
            prefix: prefix.to_string(),
        }
    }

    /// Absolute path of the mount itself, with a trailing `/`.
    pub fn mount_path(prefix: &str) -> String {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", encode_path(prefix))
        }
    }
}

impl UrlBuilder for RequestUrls {
    fn file_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.origin,
            Self::mount_path(&self.prefix),
            encode_path(path.trim_start_matches('/'))
        )
    }
}

/// Percent-encode each `/`-separated segment of `path`.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a request path; `None` if it is not valid UTF-8.
pub fn decode_path(path: &str) -> Option<String> {
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
