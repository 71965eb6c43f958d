//! Bibliographic metadata fetching through an ordered provider chain.
//!
//! Providers implement [`MetadataProvider`] and are tried strictly in
//! declared order; the first success wins and nothing is merged across
//! providers, so a record's provenance is always a single source. A
//! timeout or error from one provider advances the chain to the next.
//!
//! # Architecture
//!
//! - [`MetadataProvider`] - Async trait each provider implements
//! - [`MetadataFetchChain`] - Ordered collection with the fetch loop
//! - [`SemanticScholarProvider`] - Primary bibliographic API
//! - [`CrossrefProvider`] - Fallback bibliographic API (DOI ids only)

mod crossref;
mod semantic_scholar;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crossref::CrossrefProvider;
pub use semantic_scholar::SemanticScholarProvider;

pub(crate) use crossref::DEFAULT_BASE_URL as CROSSREF_BASE_URL;
pub(crate) use semantic_scholar::DEFAULT_BASE_URL as SEMANTIC_SCHOLAR_BASE_URL;

use crate::resolver::CanonicalId;

/// One author as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Full display name.
    pub name: String,
    /// Affiliation, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    /// Creates an author with no affiliation.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
        }
    }
}

/// Bibliographic metadata from exactly one provider.
///
/// Owned by the fetch chain until handed to the library writer; fields
/// are never partially merged across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMetadata {
    /// Paper title.
    pub title: String,
    /// Ordered author list.
    pub authors: Vec<Author>,
    /// Abstract text, when available.
    pub abstract_text: Option<String>,
    /// Journal or venue name.
    pub journal: Option<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// Landing-page URL reported by the provider.
    pub url: Option<String>,
    /// Open-access PDF URL, when the provider knows one.
    pub pdf_url: Option<String>,
    /// Name of the provider this metadata came from.
    pub source: String,
}

/// Errors from a single provider attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level failure (DNS, connection, TLS).
    #[error("network error querying {provider}: {source}")]
    Network {
        /// Provider name.
        provider: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider did not answer within the per-provider budget.
    #[error("timeout querying {provider}")]
    Timeout {
        /// Provider name.
        provider: String,
    },

    /// Non-2xx response.
    #[error("HTTP {status} from {provider}")]
    HttpStatus {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be interpreted.
    #[error("unexpected response from {provider}: {detail}")]
    Decode {
        /// Provider name.
        provider: String,
        /// What was wrong with the body.
        detail: String,
    },

    /// This provider cannot serve the given id type (e.g. Crossref for
    /// an arXiv id or an opaque URL).
    #[error("{provider} does not handle this identifier")]
    Unsupported {
        /// Provider name.
        provider: String,
    },
}

impl ProviderError {
    /// Creates a network error.
    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(provider: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(provider: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            provider: provider.into(),
            status,
        }
    }

    /// Creates a decode error.
    pub fn decode(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    /// Creates an unsupported-identifier error.
    pub fn unsupported(provider: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.into(),
        }
    }

    /// True when the provider answered with HTTP 429.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 429, .. })
    }
}

/// Errors from the chain as a whole.
#[derive(Debug, Error)]
pub enum MetadataFetchError {
    /// Every provider in order failed. Non-fatal to the pipeline: the
    /// record is written without metadata for the user to fill in later.
    #[error("all {tried} metadata provider(s) failed for {id}")]
    AllProvidersFailed {
        /// Display form of the identifier.
        id: String,
        /// Number of providers tried.
        tried: usize,
    },

    /// Every provider failed and at least one was rate-limited; the
    /// caller should suggest retrying shortly instead of a generic error.
    #[error("metadata providers are rate-limiting requests for {id}; try again shortly")]
    RateLimited {
        /// Display form of the identifier.
        id: String,
    },
}

/// Trait each metadata provider implements.
///
/// Uses `async_trait` so the chain can hold `Box<dyn MetadataProvider>`
/// and ordering stays a data concern.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name used as the metadata `source` tag.
    fn name(&self) -> &str;

    /// Attempts to fetch metadata for the identifier.
    async fn try_fetch(&self, id: &CanonicalId) -> Result<ExternalMetadata, ProviderError>;
}

/// Ordered metadata provider chain, first success wins.
pub struct MetadataFetchChain {
    providers: Vec<Box<dyn MetadataProvider>>,
    per_provider_timeout: Duration,
}

impl MetadataFetchChain {
    /// Creates a chain over the given providers, tried in order.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn MetadataProvider>>, per_provider_timeout: Duration) -> Self {
        Self {
            providers,
            per_provider_timeout,
        }
    }

    /// Builds the default chain: Semantic Scholar, then Crossref.
    #[must_use]
    pub fn with_default_providers(per_provider_timeout: Duration) -> Self {
        Self::new(
            vec![
                Box::new(SemanticScholarProvider::new(
                    semantic_scholar::DEFAULT_BASE_URL,
                )),
                Box::new(CrossrefProvider::new(crossref::DEFAULT_BASE_URL)),
            ],
            per_provider_timeout,
        )
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Fetches metadata by trying providers strictly in declared order.
    ///
    /// Providers are never reordered or raced: the documented preference
    /// for earlier providers' data outweighs latency. Each attempt gets
    /// an independent wall-clock budget; timeouts and errors advance the
    /// chain.
    ///
    /// # Errors
    ///
    /// [`MetadataFetchError::AllProvidersFailed`] when every provider
    /// failed, or [`MetadataFetchError::RateLimited`] when every provider
    /// failed and at least one returned HTTP 429.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn fetch(&self, id: &CanonicalId) -> Result<ExternalMetadata, MetadataFetchError> {
        let mut saw_rate_limit = false;

        for provider in &self.providers {
            debug!(provider = provider.name(), "trying metadata provider");

            let attempt = tokio::time::timeout(self.per_provider_timeout, provider.try_fetch(id))
                .await
                .unwrap_or_else(|_| Err(ProviderError::timeout(provider.name())));

            match attempt {
                Ok(metadata) => {
                    info!(
                        provider = provider.name(),
                        title = %metadata.title,
                        "metadata fetched"
                    );
                    return Ok(metadata);
                }
                Err(error) => {
                    saw_rate_limit |= error.is_rate_limited();
                    warn!(
                        provider = provider.name(),
                        error = %error,
                        "metadata provider failed, trying next"
                    );
                }
            }
        }

        if saw_rate_limit {
            Err(MetadataFetchError::RateLimited { id: id.to_string() })
        } else {
            Err(MetadataFetchError::AllProvidersFailed {
                id: id.to_string(),
                tried: self.providers.len(),
            })
        }
    }
}

impl std::fmt::Debug for MetadataFetchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("MetadataFetchChain")
            .field("providers", &names)
            .field("per_provider_timeout", &self.per_provider_timeout)
            .finish()
    }
}
