//! Streaming file endpoint for trees read out of images.
//!
//! Conditional requests are answered from the validators alone, before the
//! path is looked up. Everything else opens a [`RangeHandle`] over the file
//! and streams it in chunks read on the blocking pool; the handle is closed
//! when the body finishes or the client goes away.

use std::io::{self, Read};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES, LAST_MODIFIED},
        HeaderMap, StatusCode,
    },
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{unfold, Stream};
use osboot_tree::{RangeFile, RangeHandle};
use tracing::{debug, error};

use super::error::ApiError;
use crate::cache::{CachePolicy, CacheValidators};
use crate::discovery::Mount;
use crate::state::AppState;

/// Bytes read per blocking call.
const CHUNK_SIZE: usize = 64 * 1024;

pub async fn serve(
    state: &AppState,
    mount: Arc<Mount>,
    path: String,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let tree = Arc::clone(mount.tree());
    let validators = CacheValidators::compute(tree.root(), tree.modified(), &path);
    let policy = state.cache_policy();

    if validators.is_not_modified(headers) {
        debug!(prefix = %mount.prefix(), path = %path, "Client copy is fresh");
        return not_modified(&validators, &policy);
    }

    let opened = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || tree.open_range(&path)).await
    };
    let RangeFile {
        handle,
        size,
        content_type,
    } = match opened {
        Ok(Ok(range)) => range,
        Ok(Err(e)) => return Err(ApiError::from_tree(e, &path).with_instance(&path)),
        Err(e) => {
            error!(path = %path, error = %e, "Open task failed");
            return Err(ApiError::internal("open_failed", "Failed to open file"));
        }
    };

    debug!(
        prefix = %mount.prefix(),
        path = %path,
        size,
        start = handle.start(),
        "Streaming file"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, size)
        .header(CONTENT_TYPE, content_type)
        .header(LAST_MODIFIED, validators.last_modified_header())
        .header(EXPIRES, policy.expires(Utc::now()))
        .header(CACHE_CONTROL, policy.cache_control())
        .header(ETAG, &validators.etag)
        .body(Body::from_stream(chunks(handle, path)))
        .map_err(|e| {
            error!(error = %e, "Failed to build file response");
            ApiError::internal("response_failed", "Failed to build response")
        })
}

fn not_modified(validators: &CacheValidators, policy: &CachePolicy) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(ETAG, &validators.etag)
        .header(CACHE_CONTROL, policy.cache_control())
        .header(LAST_MODIFIED, validators.last_modified_header())
        .body(Body::empty())
        .map_err(|e| {
            error!(error = %e, "Failed to build not-modified response");
            ApiError::internal("response_failed", "Failed to build response")
        })
}

/// Read `handle` to the end in [`CHUNK_SIZE`] pieces.
///
/// A read error ends the stream after yielding it, which aborts the response.
fn chunks(handle: RangeHandle, path: String) -> impl Stream<Item = io::Result<Bytes>> + Send {
    unfold(Some(handle), move |handle| {
        let path = path.clone();
        async move {
            let mut handle = handle?;
            let read = tokio::task::spawn_blocking(move || {
                let len = usize::try_from(handle.remaining())
                    .map_or(CHUNK_SIZE, |remaining| remaining.min(CHUNK_SIZE));
                let mut buf = vec![0u8; len];
                let result = handle.read(&mut buf).map(|n| {
                    buf.truncate(n);
                    buf
                });
                (handle, result)
            })
            .await;

            match read {
                Ok((_, Ok(buf))) if buf.is_empty() => None,
                Ok((handle, Ok(buf))) => Some((Ok(Bytes::from(buf)), Some(handle))),
                Ok((_, Err(e))) => {
                    error!(path = %path, error = %e, "Streaming read failed");
                    Some((Err(e), None))
                }
                Err(e) => {
                    error!(path = %path, error = %e, "Streaming task failed");
                    Some((Err(io::Error::other(e)), None))
                }
            }
        }
    })
}
