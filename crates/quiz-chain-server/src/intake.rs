//! Job intake: accept a quiz job, acknowledge it, solve it in the background.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use quiz_chain::{ChainController, ChallengeTask};

use crate::error::IntakeError;

/// Body of `POST /webhook`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

impl QuizRequest {
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.email.trim().is_empty() {
            return Err(IntakeError::InvalidRequest("email must not be empty".into()));
        }
        if self.secret.trim().is_empty() {
            return Err(IntakeError::InvalidRequest("secret must not be empty".into()));
        }
        let url = Url::parse(self.url.trim())
            .map_err(|e| IntakeError::InvalidRequest(format!("url is not an absolute URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IntakeError::InvalidRequest(format!(
                "url must use http or https, not {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    pub fn into_task(self) -> ChallengeTask {
        ChallengeTask::new(self.url.trim(), self.email, self.secret)
    }
}

/// Shared handler state. The controller is absent when no API key is
/// configured.
#[derive(Clone)]
pub struct IntakeState {
    controller: Option<Arc<ChainController>>,
}

impl IntakeState {
    pub fn new(controller: Option<Arc<ChainController>>) -> Self {
        Self { controller }
    }
}

pub fn router(state: IntakeState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/webhook", post(handle_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Quiz solver is running." }))
}

async fn handle_health(State(state): State<IntakeState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "api_key_configured": state.controller.is_some(),
    }))
}

async fn handle_webhook(
    State(state): State<IntakeState>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, IntakeError> {
    let Json(request) = payload.map_err(|e| IntakeError::InvalidRequest(e.body_text()))?;
    request.validate()?;
    let controller = state.controller.clone().ok_or(IntakeError::MissingApiKey)?;

    tracing::info!(url = %request.url, email = %request.email, "Task received");
    let task = request.into_task();
    tokio::spawn(async move {
        let report = controller.run(task).await;
        tracing::info!(
            steps = report.steps.len(),
            complete = report.is_complete(),
            "Background chain finished"
        );
    });

    Ok(Json(serde_json::json!({
        "message": "Task received, processing in background."
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, secret: &str, url: &str) -> QuizRequest {
        QuizRequest {
            email: email.into(),
            secret: secret.into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_validate_accepts_http_urls() {
        assert!(request("me@example.com", "s", "https://q.example/1").validate().is_ok());
        assert!(request("me@example.com", "s", " http://q.example/1 ").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        assert!(request("", "s", "https://q.example/1").validate().is_err());
        assert!(request("me@example.com", "  ", "https://q.example/1").validate().is_err());
        assert!(request("me@example.com", "s", "/relative").validate().is_err());
        let err = request("me@example.com", "s", "ftp://q.example/1").validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_into_task_trims_url() {
        let task = request("me@example.com", "s", " https://q.example/1 ").into_task();
        assert_eq!(task.current_url, "https://q.example/1");
        assert_eq!(task.email, "me@example.com");
    }
}
