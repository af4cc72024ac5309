//! Async HTTP client wrapping reqwest.
//!
//! Plain requests only, no rendering. There are no retries: a failed
//! request is reported once and the caller decides what it means.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response of an HTTP request, body read as text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Build `builder`, or fall back to reqwest's defaults (no timeout, no user
/// agent) with a warning when the configuration is rejected.
pub(crate) fn build_client(builder: reqwest::ClientBuilder, purpose: &str) -> reqwest::Client {
    match builder.build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("{purpose} client configuration rejected, using defaults: {e}");
            reqwest::Client::new()
        }
    }
}

/// HTTP client shared by the fetcher, the renderer and the submitter.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("quiz-chain/", env!("CARGO_PKG_VERSION")));

        Self {
            client: build_client(client, "HTTP"),
        }
    }

    /// GET a URL and return the response, whatever its status.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let r = self.client.get(url).send().await?;
        Self::read(url, r).await
    }

    /// GET a URL as text, failing on any non-success status.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.get(url).await?;
        if !resp.is_success() {
            bail!("HTTP {} from {}", resp.status, resp.final_url);
        }
        Ok(resp.body)
    }

    /// POST a JSON body and return the response, whatever its status.
    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<HttpResponse> {
        let r = self.client.post(url).json(body).send().await?;
        Self::read(url, r).await
    }

    async fn read(url: &str, r: reqwest::Response) -> Result<HttpResponse> {
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let body = r.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_rejected_builder_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let rejected = reqwest::Client::builder().user_agent("bad\nagent");
        let client = HttpClient {
            client: build_client(rejected, "test"),
        };
        let text = client
            .get_text(&format!("{}/ping", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "pong");
    }

    #[tokio::test]
    async fn test_get_text_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2"))
            .mount(&server)
            .await;

        let client = HttpClient::default();
        let text = client
            .get_text(&format!("{}/data.csv", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "a,b\n1,2");
    }

    #[tokio::test]
    async fn test_get_text_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::default();
        let err = client
            .get_text(&format!("{}/missing.csv", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_post_json_keeps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(body_json(serde_json::json!({"answer": 4})))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::default();
        let resp = client
            .post_json(
                &format!("{}/submit", server.uri()),
                &serde_json::json!({"answer": 4}),
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 400);
        assert!(!resp.is_success());
        assert_eq!(resp.body, "bad");
    }
}
