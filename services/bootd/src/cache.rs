//! HTTP cache validators for served files.
//!
//! The entity tag is `"<mtime>-<root>-<path>"`, where `<mtime>` is the tree's
//! modification time in whole seconds and `<root>`/`<path>` are the first four
//! bytes of the SHA-256 of the tree root and of the requested path, in hex.
//! It changes whenever the image is replaced and differs between paths.

use std::path::Path;
use std::time::{Duration, SystemTime};

use axum::http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Validators for one (tree, path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValidators {
    /// Quoted strong entity tag.
    pub etag: String,
    /// Tree modification time, truncated to seconds.
    pub last_modified: DateTime<Utc>,
}

impl CacheValidators {
    pub fn compute(root: &Path, modified: SystemTime, path: &str) -> Self {
        let secs = modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let last_modified = i64::try_from(secs)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();
        let etag = format!(
            "\"{secs}-{}-{}\"",
            short_digest(root.to_string_lossy().as_bytes()),
            short_digest(path.as_bytes()),
        );
        Self {
            etag,
            last_modified,
        }
    }

    /// Whether the request's conditional headers show a fresh client copy.
    ///
    /// `If-None-Match` takes precedence; `If-Modified-Since` is only
    /// consulted when it is absent.
    pub fn is_not_modified(&self, headers: &HeaderMap) -> bool {
        if let Some(value) = headers.get(IF_NONE_MATCH) {
            let Ok(value) = value.to_str() else {
                return false;
            };
            return value.split(',').map(str::trim).any(|tag| {
                tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == self.etag
            });
        }

        headers
            .get(IF_MODIFIED_SINCE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date)
            .is_some_and(|since| self.last_modified <= since)
    }

    pub fn last_modified_header(&self) -> String {
        format_http_date(self.last_modified)
    }
}

/// `Cache-Control` and `Expires` values for a freshness lifetime.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    max_age: Duration,
}

impl CachePolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn cache_control(&self) -> String {
        format!("max-age={}, public", self.max_age.as_secs())
    }

    pub fn expires(&self, now: DateTime<Utc>) -> String {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::zero());
        format_http_date(now + max_age)
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE).to_string()
}

/// Parse an IMF-fixdate or RFC 2822 date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc2822(value.trim()).map(|at| at.with_timezone(&Utc)))
        .ok()
}

fn short_digest(data: &[u8]) -> String {
    hex::encode(&Sha256::digest(data)[..4])
}
