//! Page rendering: turn a URL into a [`PageSnapshot`].
//!
//! The `PageRenderer` trait abstracts over how a page is rendered. The
//! default `HttpRenderer` fetches static markup; with the `chromium` feature
//! a headless browser renders pages that build their content in script.

#[cfg(feature = "chromium")]
pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::http::HttpClient;
use crate::types::PageSnapshot;

/// Renders a page into its visible text and markup.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url`. Any error counts as a scrape failure.
    async fn render(&self, url: &str) -> Result<PageSnapshot>;
}

/// Renderer for static pages: one GET, text extracted from the markup.
pub struct HttpRenderer {
    http: HttpClient,
}

impl HttpRenderer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<PageSnapshot> {
        let markup = self.http.get_text(url).await?;
        let text = extract_text(&markup);
        Ok(PageSnapshot { text, markup })
    }
}

/// Visible text of an HTML document, one trimmed text run per line.
///
/// Script, style and template contents are skipped.
pub fn extract_text(markup: &str) -> String {
    let doc = Html::parse_document(markup);
    let root = match Selector::parse("body") {
        Ok(sel) => doc.select(&sel).next().unwrap_or_else(|| doc.root_element()),
        Err(_) => doc.root_element(),
    };

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_text_skips_scripts() {
        let html = r#"<html><head><title>T</title><style>p{}</style></head>
            <body><h1>Quiz 1</h1><script>var x = 1;</script>
            <p>Post your answer to <b>/submit</b></p></body></html>"#;
        assert_eq!(extract_text(html), "Quiz 1\nPost your answer to\n/submit");
    }

    #[test]
    fn test_extract_text_fragment() {
        assert_eq!(extract_text("plain words"), "plain words");
    }

    #[tokio::test]
    async fn test_http_renderer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<body><a href="data.csv">Download</a></body>"#),
            )
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new(HttpClient::default());
        let snap = renderer
            .render(&format!("{}/quiz", server.uri()))
            .await
            .unwrap();
        assert_eq!(snap.text, "Download");
        assert!(snap.markup.contains(r#"href="data.csv""#));
    }

    #[tokio::test]
    async fn test_http_renderer_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::new(HttpClient::default());
        assert!(renderer
            .render(&format!("{}/quiz", server.uri()))
            .await
            .is_err());
    }
}
