//! HTTP routing.
//!
//! Health probes have fixed routes. Every other request is matched against
//! the boot catalog:
//!
//! | Path                     | Served by                               |
//! |--------------------------|-----------------------------------------|
//! | `/<prefix>`              | 308 to `/<prefix>/`                     |
//! | `/<prefix>/`             | boot script                             |
//! | `/<prefix>/boot.ipxe`    | boot script                             |
//! | `/<prefix>/<path>`       | file endpoint (images) or static files  |
//! | anything else            | static files from the storage root      |

mod boot;
pub mod error;
mod files;
mod health;

use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    response::{IntoResponse, Redirect, Response},
    Router,
};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use self::error::ApiError;
use crate::catalog::Route;
use crate::state::AppState;
use crate::urls::{decode_path, RequestUrls};

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let Some(path) = decode_path(request.uri().path()) else {
        return ApiError::not_found("file_not_found", "Request path is not valid UTF-8")
            .into_response();
    };

    let route = state.catalog().route(&path);
    let readable = matches!(*request.method(), Method::GET | Method::HEAD);
    match route {
        Route::Static => serve_static(&state, request).await,
        Route::File { ref mount, .. } if !mount.serves_files() => {
            serve_static(&state, request).await
        }
        _ if !readable => ApiError::method_not_allowed(
            "method_not_allowed",
            format!("{} is not supported here", request.method()),
        )
        .into_response(),
        Route::Redirect(mount) => {
            Redirect::permanent(&RequestUrls::mount_path(mount.prefix())).into_response()
        }
        Route::BootScript(mount) => boot::serve(&state, mount, request.headers())
            .await
            .into_response(),
        Route::File { mount, path } => files::serve(&state, mount, path, request.headers())
            .await
            .into_response(),
    }
}

async fn serve_static(state: &AppState, request: Request) -> Response {
    match state.static_files().oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
