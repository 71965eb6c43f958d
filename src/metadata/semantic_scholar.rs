//! Semantic Scholar metadata provider (primary).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Author, ExternalMetadata, MetadataProvider, ProviderError};
use crate::resolver::CanonicalId;

/// Production Semantic Scholar API base URL.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org";

const PROVIDER_NAME: &str = "semantic_scholar";

/// Queries the Semantic Scholar paper lookup API.
///
/// Handles DOI and arXiv identifiers. The base URL is injected so tests
/// can point the provider at a fake endpoint.
#[derive(Debug, Clone)]
pub struct SemanticScholarProvider {
    client: reqwest::Client,
    base_url: String,
}

impl SemanticScholarProvider {
    /// Creates a provider against the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn lookup_url(&self, id: &CanonicalId) -> Result<String, ProviderError> {
        match id {
            CanonicalId::Doi(doi) => Ok(format!("{}/v1/paper/{doi}", self.base_url)),
            CanonicalId::Arxiv(arxiv) => Ok(format!("{}/v1/paper/arXiv:{arxiv}", self.base_url)),
            CanonicalId::OpaqueUrl(_) => Err(ProviderError::unsupported(PROVIDER_NAME)),
        }
    }
}

#[async_trait]
impl MetadataProvider for SemanticScholarProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn try_fetch(&self, id: &CanonicalId) -> Result<ExternalMetadata, ProviderError> {
        let url = self.lookup_url(id)?;
        debug!(url = %url, "querying Semantic Scholar");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::network(PROVIDER_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::http_status(PROVIDER_NAME, status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::network(PROVIDER_NAME, e))?;
        parse_paper(&body)
    }
}

/// Maps a Semantic Scholar paper object to [`ExternalMetadata`].
fn parse_paper(body: &Value) -> Result<ExternalMetadata, ProviderError> {
    let title = body
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::decode(PROVIDER_NAME, "missing title"))?;

    let authors = body
        .get("authors")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(Author::named)
                .collect()
        })
        .unwrap_or_default();

    let pdf_url = body
        .get("openAccessPdf")
        .and_then(|oa| oa.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ExternalMetadata {
        title: title.to_string(),
        authors,
        abstract_text: non_empty_str(body.get("abstract")),
        journal: non_empty_str(body.get("venue")),
        year: body
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok()),
        url: non_empty_str(body.get("url")),
        pdf_url,
        source: PROVIDER_NAME.to_string(),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paper_body() -> Value {
        json!({
            "title": "Deep Learning for Proteins",
            "authors": [{"name": "Ada Lovelace"}, {"name": "Grace Hopper"}],
            "abstract": "We study proteins.",
            "venue": "Nature",
            "year": 2024,
            "url": "https://www.semanticscholar.org/paper/abc",
            "openAccessPdf": {"url": "https://oa.example.org/paper.pdf"}
        })
    }

    #[tokio::test]
    async fn test_fetch_doi_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/paper/10.1038/nature12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_body()))
            .mount(&server)
            .await;

        let provider = SemanticScholarProvider::new(server.uri());
        let id = CanonicalId::Doi("10.1038/nature12345".to_string());
        let metadata = provider.try_fetch(&id).await.unwrap();

        assert_eq!(metadata.title, "Deep Learning for Proteins");
        assert_eq!(metadata.authors.len(), 2);
        assert_eq!(metadata.authors[0].name, "Ada Lovelace");
        assert_eq!(metadata.journal.as_deref(), Some("Nature"));
        assert_eq!(metadata.year, Some(2024));
        assert_eq!(
            metadata.pdf_url.as_deref(),
            Some("https://oa.example.org/paper.pdf")
        );
        assert_eq!(metadata.source, "semantic_scholar");
    }

    #[tokio::test]
    async fn test_fetch_arxiv_uses_arxiv_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/paper/arXiv:2301.04567"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_body()))
            .mount(&server)
            .await;

        let provider = SemanticScholarProvider::new(server.uri());
        let id = CanonicalId::Arxiv("2301.04567".to_string());
        assert!(provider.try_fetch(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_404_is_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = SemanticScholarProvider::new(server.uri());
        let id = CanonicalId::Doi("10.1/missing".to_string());
        let error = provider.try_fetch(&id).await.unwrap_err();
        assert!(matches!(
            error,
            ProviderError::HttpStatus { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn test_fetch_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = SemanticScholarProvider::new(server.uri());
        let id = CanonicalId::Doi("10.1038/nature12345".to_string());
        let error = provider.try_fetch(&id).await.unwrap_err();
        assert!(error.is_rate_limited());
    }

    #[tokio::test]
    async fn test_fetch_opaque_url_unsupported() {
        let provider = SemanticScholarProvider::new("http://unused.invalid");
        let id = CanonicalId::OpaqueUrl("https://example.com/x".to_string());
        let error = provider.try_fetch(&id).await.unwrap_err();
        assert!(matches!(error, ProviderError::Unsupported { .. }));
    }

    #[test]
    fn test_parse_paper_missing_title_is_decode_error() {
        let error = parse_paper(&json!({"authors": []})).unwrap_err();
        assert!(matches!(error, ProviderError::Decode { .. }));
    }
}
