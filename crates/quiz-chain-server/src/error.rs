//! Errors surfaced by the intake endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server is missing its API key.")]
    MissingApiKey,
}

impl IntakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IntakeError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        tracing::warn!(status = self.status().as_u16(), "{self}");
        (self.status(), Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
