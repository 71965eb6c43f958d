//! Crossref metadata provider (fallback, DOI identifiers only).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Author, ExternalMetadata, MetadataProvider, ProviderError};
use crate::resolver::CanonicalId;

/// Production Crossref API base URL.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

const PROVIDER_NAME: &str = "crossref";

/// Queries the Crossref works API.
///
/// Only plain DOIs are supported; arXiv ids and opaque URLs are declined
/// so the chain's error reflects a genuine lookup miss, not a bad query.
#[derive(Debug, Clone)]
pub struct CrossrefProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CrossrefProvider {
    /// Creates a provider against the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for CrossrefProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn try_fetch(&self, id: &CanonicalId) -> Result<ExternalMetadata, ProviderError> {
        let Some(doi) = id.doi() else {
            return Err(ProviderError::unsupported(PROVIDER_NAME));
        };

        let url = format!("{}/works/{doi}", self.base_url);
        debug!(url = %url, "querying Crossref");

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
        let message = body
            .get("message")
            .ok_or_else(|| ProviderError::decode(PROVIDER_NAME, "missing message envelope"))?;
        parse_work(message)
    }
}

/// Maps a Crossref work object to [`ExternalMetadata`].
fn parse_work(message: &Value) -> Result<ExternalMetadata, ProviderError> {
    let title = first_of_array(message.get("title"))
        .ok_or_else(|| ProviderError::decode(PROVIDER_NAME, "missing title"))?;

    let authors = message
        .get("author")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(parse_author).collect())
        .unwrap_or_default();

    // Crossref reports the date under published-print or published-online
    // as nested date-parts; the year is the first element.
    let year = ["published-print", "published-online"]
        .iter()
        .find_map(|field| year_from_date_parts(message.get(*field)));

    Ok(ExternalMetadata {
        title,
        authors,
        abstract_text: message
            .get("abstract")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        journal: first_of_array(message.get("container-title")),
        year,
        url: message
            .get("URL")
            .and_then(Value::as_str)
            .map(str::to_string),
        pdf_url: None,
        source: PROVIDER_NAME.to_string(),
    })
}

fn parse_author(author: &Value) -> Option<Author> {
    let given = author.get("given").and_then(Value::as_str).unwrap_or("");
    let family = author.get("family").and_then(Value::as_str).unwrap_or("");
    let name = format!("{given} {family}").trim().to_string();
    if name.is_empty() {
        return None;
    }
    let affiliation = author
        .get("affiliation")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Author { name, affiliation })
}

fn first_of_array(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn year_from_date_parts(value: Option<&Value>) -> Option<i32> {
    value
        .and_then(|v| v.get("date-parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(Value::as_array)
        .and_then(|first| first.first())
        .and_then(Value::as_i64)
        .and_then(|y| i32::try_from(y).ok())
}
