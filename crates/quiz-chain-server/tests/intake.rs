//! Intake routes driven in-process through the router.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use quiz_chain::{ChainConfig, ChainController, PageSnapshot, PageRenderer, ReasoningService};
use quiz_chain_server::{router, IntakeState};

struct NoPages;

#[async_trait]
impl PageRenderer for NoPages {
    async fn render(&self, url: &str) -> anyhow::Result<PageSnapshot> {
        anyhow::bail!("offline: {url}")
    }
}

struct NoReasoning;

#[async_trait]
impl ReasoningService for NoReasoning {
    async fn complete(&self, _contract: &str, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("offline")
    }
}

fn configured() -> IntakeState {
    let controller = ChainController::new(
        ChainConfig::default(),
        Arc::new(NoPages),
        Arc::new(NoReasoning),
    );
    IntakeState::new(Some(Arc::new(controller)))
}

fn post_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_and_health() {
    let app = router(configured());

    let response = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["message"].is_string());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health = json_body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["api_key_configured"], true);
}

#[tokio::test]
async fn test_webhook_acknowledges_immediately() {
    let response = router(configured())
        .oneshot(post_webhook(
            r#"{"email": "me@example.com", "secret": "s3cret", "url": "https://q.example/quiz/1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"message": "Task received, processing in background."})
    );
}

#[tokio::test]
async fn test_webhook_rejects_invalid_jobs() {
    for body in [
        r#"{"email": "me@example.com", "secret": "s3cret"}"#,
        r#"{"email": "me@example.com", "secret": "s3cret", "url": "not a url"}"#,
        r#"{"email": "", "secret": "s3cret", "url": "https://q.example/1"}"#,
        "not json",
    ] {
        let response = router(configured()).oneshot(post_webhook(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn test_webhook_without_api_key() {
    let response = router(IntakeState::new(None))
        .oneshot(post_webhook(
            r#"{"email": "me@example.com", "secret": "s3cret", "url": "https://q.example/quiz/1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"error": "Server is missing its API key."})
    );
}
