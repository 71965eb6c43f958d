//! The five concrete waterfall sources.
//!
//! Order is decided by the pipeline, not here: metadata link, then the
//! open-access resolver, then direct repository links, then publisher
//! direct links, then the configurable mirror. Each source declines
//! identifiers it cannot serve with [`SourceError::NotApplicable`] so
//! the waterfall advances quietly.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::download::Downloader;
use super::{FetchContext, PdfAsset, PdfSource, SourceError};
use crate::resolver::CanonicalId;

/// Production open-access resolver base URL.
pub(crate) const UNPAYWALL_BASE_URL: &str = "https://api.unpaywall.org";

/// Production arXiv base URL.
pub(crate) const ARXIV_BASE_URL: &str = "https://arxiv.org";

/// Production bioRxiv base URL.
pub(crate) const BIORXIV_BASE_URL: &str = "https://www.biorxiv.org";

// ==================== Metadata Link ====================

/// Downloads the open-access link carried in already-fetched metadata.
///
/// Applicable only when the metadata chain settled before this attempt
/// and reported a PDF URL; otherwise declines immediately.
#[derive(Debug, Clone)]
pub struct MetadataLinkSource {
    downloader: Downloader,
}

const METADATA_LINK_NAME: &str = "metadata_link";

impl MetadataLinkSource {
    /// Creates the source over a shared downloader.
    #[must_use]
    pub(crate) fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl PdfSource for MetadataLinkSource {
    fn name(&self) -> &str {
        METADATA_LINK_NAME
    }

    async fn try_fetch(
        &self,
        _id: &CanonicalId,
        ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError> {
        let Some(url) = ctx.metadata_pdf_url.as_deref() else {
            return Err(SourceError::not_applicable(
                METADATA_LINK_NAME,
                "no open-access link in metadata yet",
            ));
        };
        let downloaded = self.downloader.fetch_pdf(url, METADATA_LINK_NAME).await?;
        Ok(PdfAsset {
            bytes: downloaded.bytes,
            source: METADATA_LINK_NAME.to_string(),
            oversize: downloaded.oversize,
        })
    }
}

// ==================== Open-Access Resolver ====================

/// Looks up an open-access copy through the Unpaywall resolver.
///
/// The service is email-gated; the configured contact address is sent
/// as a query parameter. DOI identifiers only.
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    downloader: Downloader,
    base_url: String,
    email: String,
}

const UNPAYWALL_NAME: &str = "unpaywall";

impl UnpaywallSource {
    /// Creates the source against the given resolver base URL.
    #[must_use]
    pub(crate) fn new(
        downloader: Downloader,
        base_url: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
        }
    }
}

#[async_trait]
impl PdfSource for UnpaywallSource {
    fn name(&self) -> &str {
        UNPAYWALL_NAME
    }

    async fn try_fetch(
        &self,
        id: &CanonicalId,
        _ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError> {
        let Some(doi) = id.doi() else {
            return Err(SourceError::not_applicable(
                UNPAYWALL_NAME,
                "resolver handles DOIs only",
            ));
        };

        let url = format!(
            "{}/v2/{doi}?email={}",
            self.base_url,
            urlencoding::encode(&self.email)
        );
        debug!(url = %url, "querying open-access resolver");

        let response = self
            .downloader
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::timeout(UNPAYWALL_NAME)
                } else {
                    SourceError::network(UNPAYWALL_NAME, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(UNPAYWALL_NAME, status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::network(UNPAYWALL_NAME, e))?;
        let Some(pdf_url) = body
            .get("best_oa_location")
            .and_then(|loc| loc.get("url_for_pdf"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
        else {
            return Err(SourceError::not_applicable(
                UNPAYWALL_NAME,
                "no open-access location on record",
            ));
        };

        let downloaded = self.downloader.fetch_pdf(pdf_url, UNPAYWALL_NAME).await?;
        Ok(PdfAsset {
            bytes: downloaded.bytes,
            source: UNPAYWALL_NAME.to_string(),
            oversize: downloaded.oversize,
        })
    }
}

// ==================== Direct Repository ====================

/// Builds the well-known direct PDF link for arXiv and bioRxiv ids.
#[derive(Debug, Clone)]
pub struct RepositorySource {
    downloader: Downloader,
    arxiv_base_url: String,
    biorxiv_base_url: String,
}

const REPOSITORY_NAME: &str = "repository";

impl RepositorySource {
    /// Creates the source against the given repository base URLs.
    #[must_use]
    pub(crate) fn new(
        downloader: Downloader,
        arxiv_base_url: impl Into<String>,
        biorxiv_base_url: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            arxiv_base_url: arxiv_base_url.into().trim_end_matches('/').to_string(),
            biorxiv_base_url: biorxiv_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn direct_url(&self, id: &CanonicalId) -> Option<String> {
        match id {
            CanonicalId::Arxiv(arxiv) => {
                Some(format!("{}/pdf/{arxiv}.pdf", self.arxiv_base_url))
            }
            CanonicalId::Doi(doi) if id.is_biorxiv() => {
                Some(format!("{}/content/{doi}.full.pdf", self.biorxiv_base_url))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl PdfSource for RepositorySource {
    fn name(&self) -> &str {
        REPOSITORY_NAME
    }

    async fn try_fetch(
        &self,
        id: &CanonicalId,
        _ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError> {
        let Some(url) = self.direct_url(id) else {
            return Err(SourceError::not_applicable(
                REPOSITORY_NAME,
                "not an arXiv or bioRxiv identifier",
            ));
        };
        let downloaded = self.downloader.fetch_pdf(&url, REPOSITORY_NAME).await?;
        Ok(PdfAsset {
            bytes: downloaded.bytes,
            source: REPOSITORY_NAME.to_string(),
            oversize: downloaded.oversize,
        })
    }
}

// ==================== Publisher Direct Links ====================

/// Production PLOS journals base URL.
pub(crate) const PLOS_BASE_URL: &str = "https://journals.plos.org";

/// Production eLife article CDN base URL.
pub(crate) const ELIFE_CDN_BASE_URL: &str = "https://cdn.elifesciences.org";

/// Production JNeurosci base URL.
pub(crate) const JNEUROSCI_BASE_URL: &str = "https://www.jneurosci.org";

/// DOI markers for PLOS journals whose printable PDF sits at a
/// predictable URL.
const PLOS_JOURNAL_MARKERS: &[&str] = &[
    "journal.pone",
    "journal.pcbi",
    "journal.pgen",
    "journal.ppat",
    "journal.pbio",
    "journal.pmed",
    "journal.pntd",
];

#[allow(clippy::expect_used)]
static JNEUROSCI_PDF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/content/jneuro/[^"]+\.full\.pdf)""#)
        .expect("jneurosci pattern is valid")
});

/// Direct PDF links for publishers with well-known URL shapes.
///
/// PLOS and eLife PDFs sit at predictable URLs derived from the DOI;
/// JNeurosci needs its article page scraped for the PDF link. Covers
/// paywall-free publisher copies the open-access resolver sometimes
/// misses; tried after the repositories and before the mirror.
#[derive(Debug, Clone)]
pub struct PublisherSource {
    downloader: Downloader,
    plos_base_url: String,
    elife_cdn_base_url: String,
    jneurosci_base_url: String,
}

const PUBLISHER_NAME: &str = "publisher";

impl PublisherSource {
    /// Creates the source against the given publisher base URLs.
    #[must_use]
    pub(crate) fn new(
        downloader: Downloader,
        plos_base_url: impl Into<String>,
        elife_cdn_base_url: impl Into<String>,
        jneurosci_base_url: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            plos_base_url: plos_base_url.into().trim_end_matches('/').to_string(),
            elife_cdn_base_url: elife_cdn_base_url.into().trim_end_matches('/').to_string(),
            jneurosci_base_url: jneurosci_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn direct_urls(&self, doi: &str) -> Vec<String> {
        let mut urls = Vec::new();
        if PLOS_JOURNAL_MARKERS.iter().any(|marker| doi.contains(marker)) {
            urls.push(format!(
                "{}/plosone/article/file?id={doi}&type=printable",
                self.plos_base_url
            ));
        }
        if let Some(article_id) = elife_article_id(doi) {
            urls.push(format!(
                "{}/articles/{article_id}/elife-{article_id}-v1.pdf",
                self.elife_cdn_base_url
            ));
        }
        urls
    }

    /// Scrapes the JNeurosci article page for its PDF link. Failures
    /// here are not source errors; the DOI simply yields no candidate.
    async fn jneurosci_url(&self, doi: &str) -> Option<String> {
        let page_url = format!("{}/lookup/doi/{doi}", self.jneurosci_base_url);
        debug!(url = %page_url, "fetching JNeurosci article page");
        let response = match self.downloader.client().get(&page_url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(error = %error, "JNeurosci page fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        let html = response.text().await.ok()?;
        JNEUROSCI_PDF_PATTERN
            .captures(&html)
            .map(|cap| format!("{}{}", self.jneurosci_base_url, &cap[1]))
    }
}

/// Extracts the eLife article number from DOIs like `10.7554/eLife.99545`
/// or version-suffixed forms like `10.7554/eLife.99545.4`.
fn elife_article_id(doi: &str) -> Option<String> {
    let lower = doi.to_lowercase();
    let rest = lower.split("elife.").nth(1)?;
    let article_id = rest.split('.').next()?;
    if article_id.is_empty() {
        None
    } else {
        Some(article_id.to_string())
    }
}

#[async_trait]
impl PdfSource for PublisherSource {
    fn name(&self) -> &str {
        PUBLISHER_NAME
    }

    async fn try_fetch(
        &self,
        id: &CanonicalId,
        _ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError> {
        let Some(doi) = id.doi() else {
            return Err(SourceError::not_applicable(
                PUBLISHER_NAME,
                "publisher links need a DOI",
            ));
        };

        let mut candidates = self.direct_urls(doi);
        if doi.to_lowercase().contains("jneurosci") {
            if let Some(url) = self.jneurosci_url(doi).await {
                candidates.push(url);
            }
        }
        if candidates.is_empty() {
            return Err(SourceError::not_applicable(
                PUBLISHER_NAME,
                "no known publisher pattern for this DOI",
            ));
        }

        let mut last_error = None;
        for candidate in candidates {
            debug!(url = %candidate, "trying publisher PDF link");
            match self.downloader.fetch_pdf(&candidate, PUBLISHER_NAME).await {
                Ok(downloaded) => {
                    return Ok(PdfAsset {
                        bytes: downloaded.bytes,
                        source: PUBLISHER_NAME.to_string(),
                        oversize: downloaded.oversize,
                    });
                }
                Err(error) => last_error = Some(error),
            }
        }
        // candidates was non-empty, so at least one attempt ran
        Err(last_error
            .unwrap_or_else(|| SourceError::not_pdf(PUBLISHER_NAME, "no usable candidate")))
    }
}

// ==================== Last-Resort Mirror ====================

#[allow(clippy::expect_used)]
static MIRROR_OBJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:object|embed)[^>]+(?:data|src)=["']([^"'#]+\.pdf)[^"']*["']"#)
        .expect("object pattern is valid")
});

#[allow(clippy::expect_used)]
static MIRROR_IFRAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<iframe[^>]+src=["']([^"']+\.pdf[^"']*)["']"#)
        .expect("iframe pattern is valid")
});

#[allow(clippy::expect_used)]
static MIRROR_DOWNLOAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href=["'](/(?:download|storage)/[^"'#]+\.pdf)["']"#)
        .expect("download pattern is valid")
});

#[allow(clippy::expect_used)]
static MIRROR_RELATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)/[^\s"'<>]+\.pdf"#).expect("relative pattern is valid")
});

#[allow(clippy::expect_used)]
static MIRROR_ABSOLUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?:)?//[^\s"'<>]+\.pdf"#).expect("absolute pattern is valid")
});

/// Scrapes the configurable last-resort mirror for an embedded PDF.
///
/// Mirror pages embed the file in several historically observed shapes
/// (object/embed tags, iframes, download links, bare `.pdf` hrefs); the
/// scraper collects candidates in preference order and downloads the
/// first that turns out to be a real PDF. Mirror domains rotate, so the
/// base URL comes from user settings and network-level failures here
/// are reported distinctly by the waterfall.
#[derive(Debug, Clone)]
pub struct MirrorSource {
    downloader: Downloader,
    base_url: String,
}

const MIRROR_NAME: &str = "mirror";

impl MirrorSource {
    /// Creates the source against the given mirror base URL
    /// (scheme included, e.g. `https://sci-hub.se`).
    #[must_use]
    pub(crate) fn new(downloader: Downloader, base_url: impl Into<String>) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PdfSource for MirrorSource {
    fn name(&self) -> &str {
        MIRROR_NAME
    }

    fn is_last_resort_mirror(&self) -> bool {
        true
    }

    async fn try_fetch(
        &self,
        id: &CanonicalId,
        _ctx: &FetchContext,
    ) -> Result<PdfAsset, SourceError> {
        let Some(doi) = id.doi() else {
            return Err(SourceError::not_applicable(
                MIRROR_NAME,
                "mirror handles DOIs only",
            ));
        };

        let page_url = format!("{}/{doi}", self.base_url);
        debug!(url = %page_url, "fetching mirror page");

        let response = self
            .downloader
            .client()
            .get(&page_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::timeout(MIRROR_NAME)
                } else {
                    SourceError::network(MIRROR_NAME, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(MIRROR_NAME, status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SourceError::network(MIRROR_NAME, e))?;

        let candidates = mirror_candidates(&html, &self.base_url);
        if candidates.is_empty() {
            return Err(SourceError::not_pdf(
                MIRROR_NAME,
                "no PDF link found on mirror page",
            ));
        }

        let mut last_error = None;
        for candidate in candidates {
            debug!(url = %candidate, "trying mirror PDF candidate");
            match self.downloader.fetch_pdf(&candidate, MIRROR_NAME).await {
                Ok(downloaded) => {
                    return Ok(PdfAsset {
                        bytes: downloaded.bytes,
                        source: MIRROR_NAME.to_string(),
                        oversize: downloaded.oversize,
                    });
                }
                Err(error) => last_error = Some(error),
            }
        }
        // candidates was non-empty, so at least one attempt ran
        Err(last_error
            .unwrap_or_else(|| SourceError::not_pdf(MIRROR_NAME, "no usable candidate")))
    }
}

/// Extracts candidate PDF URLs from a mirror page, most specific
/// embedding shape first, resolved to absolute URLs and de-duplicated.
fn mirror_candidates(html: &str, base_url: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let mut push = |raw: &str| {
        let resolved = resolve_candidate(raw, base_url);
        if !candidates.contains(&resolved) {
            candidates.push(resolved);
        }
    };

    for capture in MIRROR_OBJECT_PATTERN.captures_iter(html) {
        push(&capture[1]);
    }
    for capture in MIRROR_IFRAME_PATTERN.captures_iter(html) {
        push(&capture[1]);
    }
    for capture in MIRROR_DOWNLOAD_PATTERN.captures_iter(html) {
        push(&capture[1]);
    }
    for found in MIRROR_RELATIVE_PATTERN.find_iter(html) {
        push(found.as_str());
    }
    for found in MIRROR_ABSOLUTE_PATTERN.find_iter(html) {
        push(found.as_str());
    }

    candidates
}

/// Resolves a scraped link against the mirror base URL.
fn resolve_candidate(raw: &str, base_url: &str) -> String {
    if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.starts_with('/') {
        format!("{base_url}{raw}")
    } else {
        format!("{base_url}/{raw}")
    }
}
