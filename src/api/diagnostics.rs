//! Runtime diagnostics endpoint (`/`).
//!
//! Always answers 200. The filesystem and session probes are best-effort and
//! show up as `false`/`null` in the body when they fail.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Version},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{
    diagnostics::{DiagnosticsReport, ServerInfo},
    error::AppError,
    state::AppState,
};

const SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const PROTOCOLS: [(Version, &str); 5] = [
    (Version::HTTP_09, "HTTP/0.9"),
    (Version::HTTP_10, "HTTP/1.0"),
    (Version::HTTP_11, "HTTP/1.1"),
    (Version::HTTP_2, "HTTP/2.0"),
    (Version::HTTP_3, "HTTP/3.0"),
];

/// `/`: pretty-printed diagnostics document.
///
/// Starts (or resumes) a session as a side effect; a newly issued session id
/// is returned in `Set-Cookie`. `server.port` is the configured listen port,
/// never the client's `Host` header.
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    version: Version,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let snapshot = state.snapshot();
    let server = ServerInfo::new(
        Some(SOFTWARE.to_string()),
        protocol_name(version).map(String::from),
        Some(state.config.server.port.to_string()),
    );

    let filesystem = state.filesystem.run();

    let cookie_id = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| state.sessions.id_from_cookie_header(v));
    let session = state.sessions.ensure_started(cookie_id);

    debug!(
        write_test = filesystem.write_test,
        temp_dir_writable = filesystem.temp_dir_writable,
        session_status = ?session.status,
        "diagnostics collected"
    );

    let set_cookie = session
        .issued
        .then(|| session.id.as_deref())
        .flatten()
        .map(|id| state.sessions.set_cookie_header(id));

    let report = DiagnosticsReport::build(&snapshot, server, filesystem, session);
    let body = serde_json::to_string_pretty(&report)?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();

    if let Some(cookie) = set_cookie {
        let value = HeaderValue::from_str(&cookie)?;
        response.headers_mut().insert(header::SET_COOKIE, value);
    }

    Ok(response)
}

fn protocol_name(version: Version) -> Option<&'static str> {
    PROTOCOLS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, name)| *name)
}
