//! iPXE boot script endpoint.

use std::sync::Arc;

use axum::{
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::error::ApiError;
use crate::discovery::Mount;
use crate::state::AppState;
use crate::urls::RequestUrls;

pub async fn serve(
    state: &AppState,
    mount: Arc<Mount>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let fallback_host = state.config().listen_addr.to_string();
    let urls = RequestUrls::from_headers(headers, &fallback_host, mount.prefix());

    let rendered = {
        let mount = Arc::clone(&mount);
        tokio::task::spawn_blocking(move || mount.distro().boot_script(&urls)).await
    };

    match rendered {
        Ok(Ok(Some(script))) => {
            debug!(prefix = %mount.prefix(), kind = mount.distro().kind().id(), "Rendered boot script");
            Ok((
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                script.into_string(),
            )
                .into_response())
        }
        Ok(Ok(None)) => Err(ApiError::not_found(
            "no_boot_script",
            format!(
                "{} distributions cannot be network booted",
                mount.distro().kind().id()
            ),
        )),
        Ok(Err(e)) => {
            error!(prefix = %mount.prefix(), error = %e, "Failed to render boot script");
            Err(ApiError::internal("boot_script_failed", "Failed to render boot script"))
        }
        Err(e) => {
            error!(prefix = %mount.prefix(), error = %e, "Boot script task failed");
            Err(ApiError::internal("boot_script_failed", "Failed to render boot script"))
        }
    }
}
