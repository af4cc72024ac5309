//! Submission stage: post the answer, decode the verdict.

use serde::{Deserialize, Serialize};

use crate::http::HttpClient;
use crate::types::{truncate, ChainError, ChainResult, SubmissionResponse};

/// Body posted to a submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub email: String,
    pub secret: String,
    /// The challenge page being answered.
    pub url: String,
    pub answer: serde_json::Value,
}

/// POST `payload` to `endpoint`.
///
/// A transport failure or a non-2xx status is a `SubmissionTransport` error;
/// a 2xx reply whose body is not JSON is a `SubmissionParse` error.
pub async fn submit_answer(
    http: &HttpClient,
    endpoint: &str,
    payload: &SubmissionPayload,
) -> ChainResult<SubmissionResponse> {
    tracing::info!(endpoint, answer = %payload.answer, "Submitting answer");

    let resp = http
        .post_json(endpoint, payload)
        .await
        .map_err(|e| ChainError::SubmissionTransport {
            url: endpoint.to_string(),
            status: None,
            detail: format!("{e:#}"),
        })?;

    if !resp.is_success() {
        return Err(ChainError::SubmissionTransport {
            url: endpoint.to_string(),
            status: Some(resp.status),
            detail: truncate(&resp.body, 300),
        });
    }

    SubmissionResponse::from_body(&resp.body).map_err(|_| ChainError::SubmissionParse {
        url: endpoint.to_string(),
        status: resp.status,
        body: truncate(&resp.body, 300),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            email: "me@example.com".into(),
            secret: "s3cret".into(),
            url: "https://q.example/quiz/1".into(),
            answer: json!(160000),
        }
    }

    #[tokio::test]
    async fn test_submit_posts_payload_and_reads_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(body_json(json!({
                "email": "me@example.com",
                "secret": "s3cret",
                "url": "https://q.example/quiz/1",
                "answer": 160000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "correct": true,
                "url": "https://q.example/quiz/2",
                "reason": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = submit_answer(&HttpClient::default(), &format!("{}/submit", server.uri()), &payload())
            .await
            .unwrap();
        assert_eq!(resp.correct, Some(true));
        assert_eq!(resp.next_url(), Some("https://q.example/quiz/2"));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = submit_answer(&HttpClient::default(), &format!("{}/submit", server.uri()), &payload())
            .await
            .unwrap_err();
        match err {
            ChainError::SubmissionTransport { status, detail, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(detail, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>thanks</html>"))
            .mount(&server)
            .await;

        let err = submit_answer(&HttpClient::default(), &format!("{}/submit", server.uri()), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::SubmissionParse { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_has_no_status() {
        let err = submit_answer(&HttpClient::default(), "http://127.0.0.1:9/submit", &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::SubmissionTransport { status: None, .. }));
    }
}
