//! Unified HTTP error type for axum request handlers.
//!
//! The probes themselves never fail; they degrade to `false`/`null` values.
//! [`AppError`] covers what is left: internal faults such as a report that
//! cannot be serialized. It wraps [`anyhow::Error`] and renders as a JSON
//! `500`, so a handler can return `Result<T, AppError>` and use `?`.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn my_handler() -> Result<String, AppError> {
//!     let body = serde_json::to_string_pretty(&report)?;
//!     Ok(body)
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Wraps [`anyhow::Error`] so it can be returned from axum handlers.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "handler error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Convert any `Into<anyhow::Error>` into an [`AppError`].
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn into_response_returns_500_with_json_error_body() {
        let err: AppError = anyhow::anyhow!("report unavailable").into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "report unavailable");
    }

    #[tokio::test]
    async fn serde_error_message_survives_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let expected = serde_err.to_string();
        let response = AppError::from(serde_err).into_response();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], expected);
    }

    #[test]
    fn debug_format_includes_inner_error_message() {
        let err: AppError = anyhow::anyhow!("debug me").into();
        let s = format!("{err:?}");
        assert!(s.contains("debug me"), "debug output: {s}");
    }
}
