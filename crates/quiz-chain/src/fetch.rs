//! Supplemental data fetching: turn harvested references into a corpus.

use std::sync::Arc;

use url::Url;

use crate::http::HttpClient;
use crate::render::PageRenderer;
use crate::types::{
    ChainError, ChainResult, DataReference, ReferenceKind, SupplementalCorpus,
};

/// Resolve `reference` against `base`, as a browser resolves a link.
pub fn resolve(base: &str, reference: &str) -> ChainResult<String> {
    let invalid = |reason: String| ChainError::InvalidUrl {
        base: base.to_string(),
        reference: reference.to_string(),
        reason,
    };
    let base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let joined = base_url
        .join(reference.trim())
        .map_err(|e| invalid(e.to_string()))?;
    Ok(joined.to_string())
}

/// Fetches each data reference of a page, raw files over plain HTTP and
/// interactive pages through the renderer.
pub struct SupplementalFetcher {
    http: HttpClient,
    renderer: Arc<dyn PageRenderer>,
}

impl SupplementalFetcher {
    pub fn new(http: HttpClient, renderer: Arc<dyn PageRenderer>) -> Self {
        Self { http, renderer }
    }

    /// Fetch every reference in order. Failures are logged and skipped.
    pub async fn fetch_all(&self, base_url: &str, refs: &[DataReference]) -> SupplementalCorpus {
        let mut corpus = SupplementalCorpus::new();

        for reference in refs {
            match self.fetch_one(base_url, reference).await {
                Ok(content) => {
                    tracing::info!(
                        locator = %reference.locator,
                        kind = %reference.kind,
                        bytes = content.len(),
                        "Fetched supplemental data"
                    );
                    corpus.push(reference.locator.clone(), content);
                }
                Err(e) => {
                    tracing::warn!(locator = %reference.locator, "{e}");
                }
            }
        }

        corpus
    }

    /// Fetch one reference.
    pub async fn fetch_one(&self, base_url: &str, reference: &DataReference) -> ChainResult<String> {
        let full_url = resolve(base_url, &reference.locator)?;
        let fetch_error = |reason: String| ChainError::DataFetch {
            url: full_url.clone(),
            reason,
        };

        match reference.kind {
            ReferenceKind::RawFile => {
                tracing::debug!(url = %full_url, "Fetching raw file");
                self.http
                    .get_text(&full_url)
                    .await
                    .map_err(|e| fetch_error(e.to_string()))
            }
            ReferenceKind::InteractivePage => {
                tracing::debug!(url = %full_url, "Rendering interactive page");
                self.renderer
                    .render(&full_url)
                    .await
                    .map(|snap| snap.text)
                    .map_err(|e| fetch_error(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HttpRenderer;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_resolve_relative_and_absolute() {
        assert_eq!(
            resolve("https://q.example/quiz/1", "data.csv").unwrap(),
            "https://q.example/quiz/data.csv"
        );
        assert_eq!(
            resolve("https://q.example/quiz/1", "/submit").unwrap(),
            "https://q.example/submit"
        );
        assert_eq!(
            resolve("https://q.example/quiz/1", "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }

    #[test]
    fn test_resolve_invalid_base() {
        let err = resolve("not a url", "/x").unwrap_err();
        assert!(matches!(err, ChainError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failures_and_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quiz/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("name,amount\na,20"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quiz/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quiz/extra-info"))
            .and(query_param("id", "7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<body><p>Cutoff: 42669</p></body>"),
            )
            .mount(&server)
            .await;

        let http = HttpClient::default();
        let fetcher = SupplementalFetcher::new(http.clone(), Arc::new(HttpRenderer::new(http)));
        let refs = vec![
            DataReference {
                locator: "data.csv".into(),
                kind: ReferenceKind::RawFile,
            },
            DataReference {
                locator: "missing.json".into(),
                kind: ReferenceKind::RawFile,
            },
            DataReference {
                locator: "extra-info?id=7".into(),
                kind: ReferenceKind::InteractivePage,
            },
        ];

        let corpus = fetcher
            .fetch_all(&format!("{}/quiz/start", server.uri()), &refs)
            .await;

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.blocks()[0].source, "data.csv");
        assert_eq!(corpus.blocks()[0].content, "name,amount\na,20");
        assert_eq!(corpus.blocks()[1].source, "extra-info?id=7");
        assert_eq!(corpus.blocks()[1].content, "Cutoff: 42669");
    }
}
