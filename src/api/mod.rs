//! HTTP surface: the health verdict and the diagnostics document.
//!
//! Handlers are thin. They capture a [`crate::probe::Snapshot`], gather the
//! per-request facts, and hand everything to the report builders.

use std::sync::Arc;

use axum::{routing::any, Router};

use crate::state::AppState;

pub mod diagnostics;
pub mod health;
pub mod request_id;

/// Build the axum router. Both endpoints answer any method.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(diagnostics::diagnostics))
        .route("/index.php", any(diagnostics::diagnostics))
        .route("/health", any(health::health))
        .route("/health.php", any(health::health))
        .with_state(state)
}
