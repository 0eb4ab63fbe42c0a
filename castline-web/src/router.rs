//! Request routing for `/{kind}/{token}/{id}` paths.
//!
//! Everything is handled by a single fallback so that malformed paths, extra
//! segments and unusual methods all get the same treatment: checked token,
//! registry lookup, then the content responder.

use std::any::Any;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::Response;
use castline_core::{FileRegistry, SessionToken};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::responder::ContentResponder;

/// Path segment that selects the artwork content type.
const ARTWORK_KIND: &str = "artwork";

/// Shared state handed to every request.
#[derive(Clone)]
pub struct BridgeState {
    pub registry: Arc<FileRegistry>,
    pub token: Arc<SessionToken>,
    pub responder: Arc<ContentResponder>,
}

/// Creates the router serving registered files.
pub fn create_router(state: BridgeState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_request(
    State(state): State<BridgeState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    route(&state, &method, uri.path(), &headers).await
}

/// Resolves a request path to a registered file and serves it.
///
/// Paths with fewer than three segments and unknown IDs get 404. A token
/// mismatch gets 403 before the ID is looked at, so the response never
/// reveals whether an ID exists. Segments past the third are ignored.
pub async fn route(
    state: &BridgeState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Response {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let [kind, token, id, ..] = segments.as_slice() else {
        tracing::debug!("Malformed path: {}", path);
        return plain_text(StatusCode::NOT_FOUND, "Not found");
    };

    if !state.token.matches(token) {
        tracing::warn!("Rejected {} request with invalid session token", method);
        return plain_text(StatusCode::FORBIDDEN, "Forbidden");
    }

    let Some(registration) = state.registry.lookup(id) else {
        tracing::debug!("No registration for id {}", id);
        return plain_text(StatusCode::NOT_FOUND, "Not found");
    };

    let is_artwork = *kind == ARTWORK_KIND;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let head_only = method == Method::HEAD;

    match state
        .responder
        .respond(&registration.locator, is_artwork, range, head_only)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Failed to serve {}: {}", registration.locator, e);
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}"))
        }
    }
}

fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!("Request handler panicked: {}", detail);
    plain_text(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Error: internal server error",
    )
}
