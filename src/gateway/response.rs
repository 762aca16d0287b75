//! HTTP response shaping.
//!
//! Success responses carry the engine reply payload verbatim; failures
//! share one error body.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ExchangeError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let body = ApiError {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Validation failures from request bodies map to `InvalidOrder`.
pub fn validation_error(errors: validator::ValidationErrors) -> ExchangeError {
    ExchangeError::InvalidOrder(errors.to_string())
}
