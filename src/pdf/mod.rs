//! PDF acquisition through an ordered source waterfall.
//!
//! Sources implement [`PdfSource`] and are tried strictly in declared
//! order until one yields a usable PDF. The waterfall is independent of
//! the metadata chain: it needs only the resolved identifier, plus an
//! opportunistic open-access link observed through a watch channel when
//! the metadata chain happens to finish first.
//!
//! # Architecture
//!
//! - [`PdfSource`] - Async trait each source implements
//! - [`PdfFetchWaterfall`] - Ordered collection with the fetch loop
//! - [`MetadataLinkSource`] - Open-access link from fetched metadata
//! - [`UnpaywallSource`] - Open-access resolver service (email-gated)
//! - [`RepositorySource`] - Direct arXiv/bioRxiv repository links
//! - [`PublisherSource`] - Publisher-specific direct PDF links
//! - [`MirrorSource`] - Configurable last-resort mirror domain

mod download;
mod sources;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub use sources::{
    MetadataLinkSource, MirrorSource, PublisherSource, RepositorySource, UnpaywallSource,
};

pub(crate) use download::Downloader;
pub(crate) use sources::{
    ARXIV_BASE_URL, BIORXIV_BASE_URL, ELIFE_CDN_BASE_URL, JNEUROSCI_BASE_URL, PLOS_BASE_URL,
    UNPAYWALL_BASE_URL,
};

use crate::resolver::CanonicalId;

/// A fetched PDF: raw bytes plus provenance.
///
/// Ownership moves forward through the pipeline (extractor, then
/// writer). Once a fetched asset is rejected for a non-recoverable
/// reason (e.g. zero pages) it is discarded, never retried.
#[derive(Debug, Clone)]
pub struct PdfAsset {
    /// Raw PDF bytes.
    pub bytes: Vec<u8>,
    /// Name of the source that produced the asset.
    pub source: String,
    /// True when the download exceeded the configured size ceiling
    /// (kept anyway; surfaced as a large-file notice).
    pub oversize: bool,
}

impl PdfAsset {
    /// Size of the asset in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Per-attempt context handed to each source.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Open-access PDF URL from already-fetched metadata, when the
    /// metadata chain finished before this attempt started.
    pub metadata_pdf_url: Option<String>,
}

/// Receiver side of the opportunistic metadata-link hint.
///
/// The pipeline sends the open-access URL (or `None`) as soon as the
/// metadata chain settles; the waterfall samples the current value
/// before each source attempt.
pub type PdfUrlHint = watch::Receiver<Option<String>>;

/// Creates a hint channel pre-loaded with no link.
#[must_use]
pub fn pdf_url_hint_channel() -> (watch::Sender<Option<String>>, PdfUrlHint) {
    watch::channel(None)
}

/// Errors from a single source attempt.
///
/// The source's name lives in `source_name` rather than `source` so
/// `thiserror` does not mistake it for an error cause.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level failure.
    #[error("network error in source {source_name}: {cause}")]
    Network {
        /// Source name.
        source_name: String,
        /// Underlying error.
        #[source]
        cause: reqwest::Error,
    },

    /// The source did not answer within the per-source budget.
    #[error("timeout in source {source_name}")]
    Timeout {
        /// Source name.
        source_name: String,
    },

    /// Non-2xx response.
    #[error("HTTP {status} from source {source_name}")]
    HttpStatus {
        /// Source name.
        source_name: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response was not a PDF (wrong content type or unparsable).
    #[error("source {source_name} returned something that is not a PDF: {detail}")]
    NotPdf {
        /// Source name.
        source_name: String,
        /// What was wrong.
        detail: String,
    },

    /// Zero-byte response body.
    #[error("source {source_name} returned an empty body")]
    Empty {
        /// Source name.
        source_name: String,
    },

    /// This source has nothing to offer for the given identifier
    /// (e.g. no metadata link yet, or a non-repository id).
    #[error("source {source_name} is not applicable: {reason}")]
    NotApplicable {
        /// Source name.
        source_name: String,
        /// Why the source declined.
        reason: String,
    },
}

impl SourceError {
    /// Creates a network error.
    pub fn network(source: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Network {
            source_name: source.into(),
            cause,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(source: impl Into<String>) -> Self {
        Self::Timeout {
            source_name: source.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(source: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            source_name: source.into(),
            status,
        }
    }

    /// Creates a not-a-PDF error.
    pub fn not_pdf(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotPdf {
            source_name: source.into(),
            detail: detail.into(),
        }
    }

    /// Creates an empty-body error.
    pub fn empty(source: impl Into<String>) -> Self {
        Self::Empty {
            source_name: source.into(),
        }
    }

    /// Creates a not-applicable error.
    pub fn not_applicable(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotApplicable {
            source_name: source.into(),
            reason: reason.into(),
        }
    }

    /// True when the attempt died at the network level (unreachable host
    /// or timed-out connection), as opposed to an answered failure.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Errors from the waterfall as a whole. Never fatal to the pipeline:
/// the record is committed without a PDF.
#[derive(Debug, Error)]
pub enum PdfFetchError {
    /// Every source in order was exhausted.
    #[error("all {tried} PDF source(s) failed for {id}")]
    AllSourcesFailed {
        /// Display form of the identifier.
        id: String,
        /// Number of sources tried.
        tried: usize,
    },

    /// Every source failed and the last-resort mirror was unreachable at
    /// the network level, meaning the domain has likely rotated. Surfaced
    /// distinctly so the caller can suggest updating the mirror setting.
    #[error("no PDF found for {id}; the mirror domain was unreachable — update it in settings")]
    MirrorUnreachable {
        /// Display form of the identifier.
        id: String,
    },
}

/// Trait each PDF source implements.
#[async_trait]
pub trait PdfSource: Send + Sync {
    /// Source name used as the asset's provenance tag.
    fn name(&self) -> &str;

    /// True for the configurable last-resort mirror. Network failures
    /// from this source are reported distinctly.
    fn is_last_resort_mirror(&self) -> bool {
        false
    }

    /// Attempts to fetch a PDF for the identifier.
    async fn try_fetch(
        &self,
        id: &CanonicalId,
        ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError>;
}

/// Ordered PDF source waterfall, first success wins.
pub struct PdfFetchWaterfall {
    sources: Vec<Box<dyn PdfSource>>,
    per_source_timeout: Duration,
}

impl PdfFetchWaterfall {
    /// Creates a waterfall over the given sources, tried in order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn PdfSource>>, per_source_timeout: Duration) -> Self {
        Self {
            sources,
            per_source_timeout,
        }
    }

    /// Number of sources in the waterfall.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetches a PDF by trying sources strictly in declared order.
    ///
    /// Each source gets exactly one timed attempt per import; there are
    /// no retries. The hint channel is sampled before each attempt so a
    /// metadata-provided open-access link is used when it arrived in
    /// time and silently skipped when it did not.
    ///
    /// # Errors
    ///
    /// [`PdfFetchError::AllSourcesFailed`] when every source failed, or
    /// [`PdfFetchError::MirrorUnreachable`] when additionally the mirror
    /// attempt died at the network level.
    #[instrument(skip(self, hint), fields(id = %id))]
    pub async fn fetch(
        &self,
        id: &CanonicalId,
        hint: &PdfUrlHint,
    ) -> Result<PdfAsset, PdfFetchError> {
        let mut mirror_unreachable = false;

        for source in &self.sources {
            let ctx = FetchContext {
                metadata_pdf_url: hint.borrow().clone(),
            };
            debug!(source = source.name(), "trying PDF source");

            let attempt =
                tokio::time::timeout(self.per_source_timeout, source.try_fetch(id, &ctx))
                    .await
                    .unwrap_or_else(|_| Err(SourceError::timeout(source.name())));

            match attempt {
                Ok(asset) => {
                    info!(
                        source = source.name(),
                        bytes = asset.size(),
                        oversize = asset.oversize,
                        "PDF fetched"
                    );
                    return Ok(asset);
                }
                Err(error) => {
                    if source.is_last_resort_mirror() && error.is_unreachable() {
                        mirror_unreachable = true;
                    }
                    match &error {
                        SourceError::NotApplicable { .. } => {
                            debug!(source = source.name(), error = %error, "PDF source skipped");
                        }
                        _ => {
                            warn!(source = source.name(), error = %error, "PDF source failed, trying next");
                        }
                    }
                }
            }
        }

        if mirror_unreachable {
            Err(PdfFetchError::MirrorUnreachable { id: id.to_string() })
        } else {
            Err(PdfFetchError::AllSourcesFailed {
                id: id.to_string(),
                tried: self.sources.len(),
            })
        }
    }
}

impl std::fmt::Debug for PdfFetchWaterfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("PdfFetchWaterfall")
            .field("sources", &names)
            .field("per_source_timeout", &self.per_source_timeout)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Mock Sources ====================

    struct MockSource {
        mock_name: &'static str,
        mirror: bool,
        outcome: MockOutcome,
    }

    enum MockOutcome {
        Success,
        FailStatus(u16),
        Unreachable,
        UseHint,
    }

    #[async_trait]
    impl PdfSource for MockSource {
        fn name(&self) -> &str {
            self.mock_name
        }

        fn is_last_resort_mirror(&self) -> bool {
            self.mirror
        }

        async fn try_fetch(
            &self,
            _id: &CanonicalId,
            ctx: &FetchContext,
        ) -> Result<PdfAsset, SourceError> {
            match self.outcome {
                MockOutcome::Success => Ok(PdfAsset {
                    bytes: b"%PDF-1.5 fake".to_vec(),
                    source: self.mock_name.to_string(),
                    oversize: false,
                }),
                MockOutcome::FailStatus(status) => {
                    Err(SourceError::http_status(self.mock_name, status))
                }
                MockOutcome::Unreachable => Err(SourceError::timeout(self.mock_name)),
                MockOutcome::UseHint => match &ctx.metadata_pdf_url {
                    Some(_) => Ok(PdfAsset {
                        bytes: b"%PDF-1.5 from hint".to_vec(),
                        source: self.mock_name.to_string(),
                        oversize: false,
                    }),
                    None => Err(SourceError::not_applicable(self.mock_name, "no link yet")),
                },
            }
        }
    }

    fn doi_id() -> CanonicalId {
        CanonicalId::Doi("10.1038/nature12345".to_string())
    }

    // ==================== SourceError Tests ====================

    #[test]
    fn test_source_error_names_source_without_claiming_a_cause() {
        let error = SourceError::timeout("mirror");
        assert!(error.to_string().contains("mirror"));
        // Only Network carries an underlying cause; the name string must
        // never be treated as one.
        assert!(std::error::Error::source(&error).is_none());

        let error = SourceError::http_status("unpaywall", 503);
        assert!(error.to_string().contains("unpaywall"));
        assert!(std::error::Error::source(&error).is_none());
    }

    fn waterfall(sources: Vec<Box<dyn PdfSource>>) -> PdfFetchWaterfall {
        PdfFetchWaterfall::new(sources, Duration::from_millis(200))
    }

    // ==================== Ordering Tests ====================

    #[tokio::test]
    async fn test_first_success_wins_in_order() {
        let waterfall = waterfall(vec![
            Box::new(MockSource {
                mock_name: "first",
                mirror: false,
                outcome: MockOutcome::FailStatus(500),
            }),
            Box::new(MockSource {
                mock_name: "second",
                mirror: false,
                outcome: MockOutcome::Success,
            }),
            Box::new(MockSource {
                mock_name: "third",
                mirror: false,
                outcome: MockOutcome::Success,
            }),
        ]);

        let (_tx, rx) = pdf_url_hint_channel();
        let asset = waterfall.fetch(&doi_id(), &rx).await.unwrap();
        assert_eq!(asset.source, "second");
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let waterfall = waterfall(vec![
            Box::new(MockSource {
                mock_name: "a",
                mirror: false,
                outcome: MockOutcome::FailStatus(404),
            }),
            Box::new(MockSource {
                mock_name: "b",
                mirror: false,
                outcome: MockOutcome::FailStatus(500),
            }),
        ]);

        let (_tx, rx) = pdf_url_hint_channel();
        let error = waterfall.fetch(&doi_id(), &rx).await.unwrap_err();
        assert!(matches!(
            error,
            PdfFetchError::AllSourcesFailed { tried: 2, .. }
        ));
    }

    // ==================== Mirror Distinction Tests ====================

    #[tokio::test]
    async fn test_unreachable_mirror_surfaced_distinctly() {
        let waterfall = waterfall(vec![
            Box::new(MockSource {
                mock_name: "oa",
                mirror: false,
                outcome: MockOutcome::FailStatus(404),
            }),
            Box::new(MockSource {
                mock_name: "mirror",
                mirror: true,
                outcome: MockOutcome::Unreachable,
            }),
        ]);

        let (_tx, rx) = pdf_url_hint_channel();
        let error = waterfall.fetch(&doi_id(), &rx).await.unwrap_err();
        assert!(matches!(error, PdfFetchError::MirrorUnreachable { .. }));
        assert!(error.to_string().contains("update it in settings"));
    }

    #[tokio::test]
    async fn test_reachable_mirror_failure_stays_generic() {
        let waterfall = waterfall(vec![Box::new(MockSource {
            mock_name: "mirror",
            mirror: true,
            outcome: MockOutcome::FailStatus(404),
        })]);

        let (_tx, rx) = pdf_url_hint_channel();
        let error = waterfall.fetch(&doi_id(), &rx).await.unwrap_err();
        assert!(matches!(error, PdfFetchError::AllSourcesFailed { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_non_mirror_stays_generic() {
        let waterfall = waterfall(vec![Box::new(MockSource {
            mock_name: "oa",
            mirror: false,
            outcome: MockOutcome::Unreachable,
        })]);

        let (_tx, rx) = pdf_url_hint_channel();
        let error = waterfall.fetch(&doi_id(), &rx).await.unwrap_err();
        assert!(matches!(error, PdfFetchError::AllSourcesFailed { .. }));
    }

    // ==================== Hint Channel Tests ====================

    #[tokio::test]
    async fn test_hint_available_before_fetch_is_used() {
        let waterfall = waterfall(vec![Box::new(MockSource {
            mock_name: "metadata_link",
            mirror: false,
            outcome: MockOutcome::UseHint,
        })]);

        let (tx, rx) = pdf_url_hint_channel();
        tx.send(Some("https://oa.example.org/p.pdf".to_string()))
            .unwrap();
        let asset = waterfall.fetch(&doi_id(), &rx).await.unwrap();
        assert_eq!(asset.source, "metadata_link");
    }

    #[tokio::test]
    async fn test_missing_hint_skips_to_next_source() {
        let waterfall = waterfall(vec![
            Box::new(MockSource {
                mock_name: "metadata_link",
                mirror: false,
                outcome: MockOutcome::UseHint,
            }),
            Box::new(MockSource {
                mock_name: "fallback",
                mirror: false,
                outcome: MockOutcome::Success,
            }),
        ]);

        let (_tx, rx) = pdf_url_hint_channel();
        let asset = waterfall.fetch(&doi_id(), &rx).await.unwrap();
        assert_eq!(asset.source, "fallback");
    }
}
