//! # error
//!
//! Centralised HTTP error type.
//!
//! Every handler returns `Result<_, AppError>`. Axum's `IntoResponse` impl
//! converts these into structured JSON error bodies so dashboards and
//! scripts always get a machine-readable response even on failure.
//!
//! Engine-side failures have their own types next to the code that raises
//! them (`source::FetchError`, `engine::statistics::StatsError`,
//! `engine::monitor::CycleError`, `config::ConfigError`); none of them ever
//! reach a handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested instrument is unknown or has no data yet.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The engine is stopped or has not produced data yet.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg)  => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg)    => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
