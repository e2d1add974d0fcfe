//! Per-request correlation ids.
//!
//! Every request gets an id: a caller-supplied `x-request-id` header when it
//! looks sane, a fresh UUID otherwise. The id rides in the request
//! extensions (error responses echo it in their JSON body), tags the request
//! tracing span, and is mirrored back on the response so clients can quote
//! it when reporting a problem.

use axum::http::header::HeaderMap;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest inbound id we accept verbatim; anything bigger is replaced, not
/// truncated, so the value a client sent is never silently altered.
const MAX_ID_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Take the caller's id when it is non-empty, printable ASCII, and within
/// the length cap; mint a UUID otherwise.
fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_ID_LEN
                && id.bytes().all(|b| (0x21..=0x7e).contains(&b))
        })
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn request_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let id = resolve_request_id(request.headers());
    request.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!("request", request_id = %id);
    let _guard = span.enter();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}
