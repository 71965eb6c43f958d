//! Input resolution: free text → canonical identifier → record key.
//!
//! The resolver normalizes whatever the user pasted (a bare DOI, a
//! `doi.org` URL, an arXiv or bioRxiv page, or an arbitrary article URL)
//! into a [`CanonicalId`], and derives the filesystem-safe [`RecordKey`]
//! used as the storage key and public paper id.
//!
//! Resolution is deterministic for DOI/arXiv inputs: the same input always
//! produces the same id and key. Opaque URLs get a freshly generated key.

mod scrape;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Regex for DOIs anywhere in the input: `10.XXXX/suffix`.
/// Registrant must be 4+ digits; suffix runs to whitespace/quote/bracket.
#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"10\.\d{4,9}(?:\.\d+)*/[^\s<>"'\]]+"#).expect("DOI regex is valid")
});

/// Regex for arXiv abstract/PDF URLs, capturing the arXiv id.
#[allow(clippy::expect_used)]
static ARXIV_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arxiv\.org/(?:abs|pdf)/(\d{4}\.\d{4,5})(?:v\d+)?")
        .expect("arXiv URL regex is valid")
});

/// Regex for bioRxiv content URLs, capturing the embedded `10.1101/*` DOI.
#[allow(clippy::expect_used)]
static BIORXIV_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"biorxiv\.org/content/(10\.1101/[0-9.]+[0-9])")
        .expect("bioRxiv URL regex is valid")
});

/// A normalized identifier for one import attempt.
///
/// Computed once per import and never mutated. DOI and arXiv ids
/// deterministically map to the same [`RecordKey`] on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalId {
    /// A DOI such as `10.1038/nature12345` (bioRxiv preprints included,
    /// via their `10.1101/*` DOIs).
    Doi(String),
    /// An arXiv id such as `2301.04567`.
    Arxiv(String),
    /// A URL that carries no recognizable identifier.
    OpaqueUrl(String),
}

impl CanonicalId {
    /// Returns the DOI if this id is a DOI.
    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        match self {
            Self::Doi(doi) => Some(doi),
            _ => None,
        }
    }

    /// Returns the arXiv id if this id is an arXiv id.
    #[must_use]
    pub fn arxiv_id(&self) -> Option<&str> {
        match self {
            Self::Arxiv(id) => Some(id),
            _ => None,
        }
    }

    /// Returns true for bioRxiv preprint DOIs (`10.1101/*`).
    #[must_use]
    pub fn is_biorxiv(&self) -> bool {
        matches!(self, Self::Doi(doi) if doi.starts_with("10.1101/"))
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doi(doi) => write!(f, "doi:{doi}"),
            Self::Arxiv(id) => write!(f, "arXiv:{id}"),
            Self::OpaqueUrl(url) => write!(f, "url:{url}"),
        }
    }
}

/// Filesystem-safe storage key and public paper id.
///
/// Derived from the canonical id: DOI/arXiv ids become a slug, opaque
/// URLs and manual uploads get a freshly generated `uuid-*` key.
/// Unique within the library; a collision means the paper is a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Derives the key for a canonical id.
    #[must_use]
    pub fn for_id(id: &CanonicalId) -> Self {
        match id {
            CanonicalId::Doi(doi) => Self(slug(doi)),
            CanonicalId::Arxiv(arxiv) => Self(slug(arxiv)),
            CanonicalId::OpaqueUrl(_) => Self::opaque(),
        }
    }

    /// Generates a fresh opaque key (uploads and identifier-less URLs).
    #[must_use]
    pub fn opaque() -> Self {
        Self(format!("uuid-{}", Uuid::new_v4()))
    }

    /// Wraps an already-derived key string (e.g. read back from disk).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts an identifier into a filesystem-safe slug.
///
/// Lowercases, replaces `/` and `.` with `-`, and strips everything
/// outside `[a-z0-9-]`. `10.1038/S41586-024-07386-0` becomes
/// `10-1038-s41586-024-07386-0`.
#[must_use]
pub fn slug(identifier: &str) -> String {
    identifier
        .to_lowercase()
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Errors from input resolution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The input is empty or not a URL/DOI-shaped string at all.
    #[error("could not recognize a DOI or URL in input: {input:?}")]
    InvalidFormat {
        /// The offending input (trimmed).
        input: String,
    },
}

impl ResolutionError {
    /// Creates an invalid-format error.
    pub fn invalid_format(input: impl Into<String>) -> Self {
        Self::InvalidFormat {
            input: input.into(),
        }
    }
}

/// Resolves arbitrary input strings into canonical identifiers.
///
/// Pure pattern matching for DOI/arXiv/bioRxiv shapes; for other URLs a
/// best-effort page scrape looks for a DOI meta tag (short timeout,
/// failure is non-fatal and falls through to [`CanonicalId::OpaqueUrl`]).
#[derive(Debug, Clone)]
pub struct Resolver {
    client: reqwest::Client,
    scrape_timeout: Duration,
}

/// Ceiling for the best-effort meta-tag scrape. The scrape must stay
/// cheap relative to the per-source fetch budget: it runs before any
/// real work and an unresponsive publisher page must not stall the
/// whole import.
const MAX_SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

impl Resolver {
    /// Creates a resolver with the given meta-tag scrape timeout,
    /// capped at [`MAX_SCRAPE_TIMEOUT`].
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(scrape_timeout: Duration) -> Self {
        let scrape_timeout = scrape_timeout.min(MAX_SCRAPE_TIMEOUT);
        let client = reqwest::Client::builder()
            .connect_timeout(scrape_timeout)
            .timeout(scrape_timeout)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            scrape_timeout,
        }
    }

    /// Resolves input text into a canonical identifier.
    ///
    /// Recognition order: arXiv URL shapes, bioRxiv URL shapes, DOI
    /// anywhere in the string (bare DOIs and `doi.org`/publisher URLs),
    /// then a DOI meta-tag scrape for any other http(s) URL.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidFormat`] only when the input is
    /// empty or neither DOI-shaped nor a URL. Scrape failures are not
    /// errors; the input is classified as an opaque URL instead.
    #[instrument(skip(self, input), fields(input_len = input.len()))]
    pub async fn resolve(&self, input: &str) -> Result<CanonicalId, ResolutionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ResolutionError::invalid_format(input));
        }

        // arXiv/bioRxiv URL shapes take precedence over the generic DOI
        // scan so that e.g. an arXiv PDF URL maps to the arXiv id.
        if let Some(cap) = ARXIV_URL_PATTERN.captures(input) {
            let id = cap[1].to_string();
            debug!(arxiv = %id, "resolved arXiv URL");
            return Ok(CanonicalId::Arxiv(id));
        }
        if let Some(cap) = BIORXIV_URL_PATTERN.captures(input) {
            let doi = cap[1].to_string();
            debug!(doi = %doi, "resolved bioRxiv URL");
            return Ok(CanonicalId::Doi(doi));
        }

        if let Some(doi) = find_doi(input) {
            debug!(doi = %doi, "resolved DOI from input");
            return Ok(CanonicalId::Doi(doi));
        }

        if is_http_url(input) {
            // Best-effort: many publisher pages expose the DOI in a meta
            // tag. Failure here falls through to opaque classification.
            match scrape::scrape_doi_meta_tag(&self.client, input, self.scrape_timeout).await {
                Ok(Some(doi)) => {
                    debug!(doi = %doi, url = %input, "resolved DOI from page meta tag");
                    return Ok(CanonicalId::Doi(doi));
                }
                Ok(None) => {
                    debug!(url = %input, "no DOI meta tag found, treating as opaque URL");
                }
                Err(error) => {
                    warn!(url = %input, error = %error, "DOI meta-tag scrape failed, treating as opaque URL");
                }
            }
            return Ok(CanonicalId::OpaqueUrl(input.to_string()));
        }

        Err(ResolutionError::invalid_format(input))
    }
}

/// Finds and normalizes the first DOI in the input, if any.
///
/// The input is percent-decoded before scanning: `doi.org` links often
/// encode the DOI slash as `%2F`, which would otherwise hide the DOI
/// from the pattern entirely.
#[must_use]
pub fn find_doi(input: &str) -> Option<String> {
    let decoded = match urlencoding::decode(input) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => input.to_string(),
    };
    let m = DOI_PATTERN.find(&decoded)?;

    // Reject IP-like and version-number false positives: a DOI match
    // preceded by an alphanumeric character or dot is not a DOI.
    if m.start() > 0 {
        let prev = decoded.as_bytes()[m.start() - 1];
        if prev.is_ascii_alphanumeric() || prev == b'.' {
            return None;
        }
    }

    Some(clean_doi_trailing(m.as_str()))
}

/// Strips trailing punctuation that commonly clings to DOIs pasted from
/// text: `.,;` always, and `)` only when unbalanced within the suffix.
fn clean_doi_trailing(doi: &str) -> String {
    let mut result = doi.trim_end_matches(['.', ',', ';']).to_string();
    if let Some(slash_pos) = result.find('/') {
        while result.ends_with(')') && {
            let suffix = &result[slash_pos + 1..];
            suffix.chars().filter(|&c| c == ')').count()
                > suffix.chars().filter(|&c| c == '(').count()
        } {
            result.pop();
        }
    }
    result
}

fn is_http_url(input: &str) -> bool {
    (input.starts_with("http://") || input.starts_with("https://"))
        && url::Url::parse(input).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new(Duration::from_millis(250))
    }

    #[test]
    fn test_scrape_timeout_capped() {
        let r = Resolver::new(Duration::from_secs(30));
        assert_eq!(r.scrape_timeout, MAX_SCRAPE_TIMEOUT);
        let r = Resolver::new(Duration::from_secs(2));
        assert_eq!(r.scrape_timeout, Duration::from_secs(2));
    }

    // ==================== Slug Tests ====================

    #[test]
    fn test_slug_case_folds_and_escapes() {
        assert_eq!(
            slug("10.1038/S41586-024-07386-0"),
            "10-1038-s41586-024-07386-0"
        );
    }

    #[test]
    fn test_slug_strips_disallowed_characters() {
        assert_eq!(slug("10.1002/(SICI)1097-4636"), "10-1002-sici1097-4636");
    }

    #[test]
    fn test_slug_is_deterministic() {
        assert_eq!(slug("10.1038/nature12345"), slug("10.1038/nature12345"));
    }

    // ==================== RecordKey Tests ====================

    #[test]
    fn test_record_key_for_doi() {
        let id = CanonicalId::Doi("10.1038/nature12345".to_string());
        assert_eq!(RecordKey::for_id(&id).as_str(), "10-1038-nature12345");
    }

    #[test]
    fn test_record_key_for_arxiv() {
        let id = CanonicalId::Arxiv("2301.04567".to_string());
        assert_eq!(RecordKey::for_id(&id).as_str(), "2301-04567");
    }

    #[test]
    fn test_record_key_opaque_urls_get_unique_keys() {
        let id = CanonicalId::OpaqueUrl("https://example.com/paper".to_string());
        let a = RecordKey::for_id(&id);
        let b = RecordKey::for_id(&id);
        assert!(a.as_str().starts_with("uuid-"));
        assert_ne!(a, b, "opaque keys must be freshly generated");
    }

    // ==================== DOI Resolution Tests ====================

    #[tokio::test]
    async fn test_resolve_bare_doi() {
        let id = resolver().resolve("10.1038/nature12345").await.unwrap();
        assert_eq!(id, CanonicalId::Doi("10.1038/nature12345".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_doi_url_matches_bare_doi() {
        let r = resolver();
        let bare = r.resolve("10.1038/nature12345").await.unwrap();
        let url = r
            .resolve("https://doi.org/10.1038/nature12345")
            .await
            .unwrap();
        assert_eq!(bare, url);
    }

    #[tokio::test]
    async fn test_resolve_doi_with_surrounding_text() {
        let id = resolver()
            .resolve("  see 10.1016/j.cell.2024.01.001, please ")
            .await
            .unwrap();
        assert_eq!(
            id,
            CanonicalId::Doi("10.1016/j.cell.2024.01.001".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_percent_encoded_doi_url_matches_bare_doi() {
        let r = resolver();
        let bare = r.resolve("10.1002/abc123").await.unwrap();
        let encoded = r
            .resolve("https://doi.org/10.1002%2Fabc123")
            .await
            .unwrap();
        assert_eq!(bare, encoded);
        assert_eq!(
            RecordKey::for_id(&bare),
            RecordKey::for_id(&encoded),
            "encoded and bare forms must map to the same record key"
        );
    }

    #[tokio::test]
    async fn test_resolve_doi_in_parentheses() {
        let id = resolver().resolve("(10.1234/example)").await.unwrap();
        assert_eq!(id, CanonicalId::Doi("10.1234/example".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_ignores_ip_like_pattern() {
        let result = resolver().resolve("192.10.1234/24").await;
        assert!(matches!(result, Err(ResolutionError::InvalidFormat { .. })));
    }

    // ==================== arXiv / bioRxiv Tests ====================

    #[tokio::test]
    async fn test_resolve_arxiv_abs_url() {
        let id = resolver()
            .resolve("https://arxiv.org/abs/2301.04567")
            .await
            .unwrap();
        assert_eq!(id, CanonicalId::Arxiv("2301.04567".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_arxiv_pdf_url_with_version() {
        let id = resolver()
            .resolve("https://arxiv.org/pdf/2301.04567v2")
            .await
            .unwrap();
        assert_eq!(id, CanonicalId::Arxiv("2301.04567".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_biorxiv_url_yields_doi() {
        let id = resolver()
            .resolve("https://www.biorxiv.org/content/10.1101/2024.01.15.575612v1")
            .await
            .unwrap();
        assert_eq!(id, CanonicalId::Doi("10.1101/2024.01.15.575612".to_string()));
        assert!(id.is_biorxiv());
    }

    // ==================== Invalid Input Tests ====================

    #[tokio::test]
    async fn test_resolve_empty_input_is_invalid() {
        let result = resolver().resolve("   ").await;
        assert!(matches!(result, Err(ResolutionError::InvalidFormat { .. })));
    }

    #[tokio::test]
    async fn test_resolve_plain_text_is_invalid() {
        let result = resolver().resolve("not a url or doi").await;
        assert!(matches!(result, Err(ResolutionError::InvalidFormat { .. })));
    }

    // ==================== find_doi Tests ====================

    #[test]
    fn test_find_doi_strips_trailing_period() {
        assert_eq!(
            find_doi("10.1234/example.").as_deref(),
            Some("10.1234/example")
        );
    }

    #[test]
    fn test_find_doi_preserves_balanced_parens() {
        assert_eq!(
            find_doi("10.1002/(SICI)1097-4636").as_deref(),
            Some("10.1002/(SICI)1097-4636")
        );
    }

    #[test]
    fn test_find_doi_url_decodes() {
        assert_eq!(
            find_doi("https://doi.org/10.1002%2Fabc123").as_deref(),
            Some("10.1002/abc123")
        );
    }

    #[test]
    fn test_find_doi_rejects_short_registrant() {
        assert_eq!(find_doi("rated 10.5/10"), None);
    }
}
