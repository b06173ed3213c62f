//! Container health endpoint (`/health`).

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{debug, warn};

use crate::{health::HealthReport, state::AppState};

/// `/health`: 200 when every check passes, 503 otherwise.
///
/// Example response:
/// ```json
/// {
///   "status": "healthy",
///   "checks": {
///     "php": true,
///     "opcache": true,
///     "memory": true,
///     "rootless": true,
///     "non_root_user": true
///   },
///   "user_id": 1000,
///   "timestamp": "2026-10-19T12:00:00+00:00"
/// }
/// ```
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    let report = HealthReport::build(&snapshot);

    let code = if report.is_healthy() {
        debug!(user_id = report.user_id, "health check passed");
        StatusCode::OK
    } else {
        warn!(
            failed = ?report.checks.failed(),
            user_id = report.user_id,
            memory_usage = snapshot.memory_usage,
            memory_limit = %snapshot.memory_limit,
            "health check failed"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(report))
}
