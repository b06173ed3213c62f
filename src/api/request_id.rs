//! Request ID middleware.
//!
//! Every inbound request gets an `X-Request-ID`: the caller's value if it
//! sent a non-empty one, a fresh UUID v4 otherwise. The ID is echoed in the
//! response header and wraps the handler in a [`tracing`] span, so probe
//! failures logged at `debug` can be matched to the e2e request that hit them.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

const HEADER: &str = "x-request-id";

/// Apply **inside** the `TraceLayer` so it runs within the trace span.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::debug_span!("request", id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HEADER, value);
    }

    response
}
