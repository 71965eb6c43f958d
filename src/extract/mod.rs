//! Plain-text extraction from fetched PDFs.
//!
//! Extraction is page-by-page: a page that fails to extract becomes an
//! empty page with a warning rather than failing the document, since
//! scanned or partially damaged papers are common. A PDF whose every
//! page comes back empty is kept but flagged unsearchable.

use lopdf::Document;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::resolver;

/// Extracted plain text for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// One entry per page, in page order. Pages that failed to extract
    /// are present as empty strings so page numbering stays stable.
    pub pages: Vec<String>,
    /// False when no page yielded any text (e.g. a scanned PDF with no
    /// text layer). Such records are kept but excluded from full-text
    /// search.
    pub searchable: bool,
}

impl ExtractedText {
    /// All pages joined into one string, form-feed separated, for the
    /// on-disk text cache.
    #[must_use]
    pub fn joined(&self) -> String {
        self.pages.join("\u{c}")
    }

    /// Rebuilds the page list from the on-disk cache format.
    #[must_use]
    pub fn from_cached(cached: &str) -> Self {
        let pages: Vec<String> = cached.split('\u{c}').map(str::to_string).collect();
        let searchable = pages.iter().any(|p| !p.trim().is_empty());
        Self { pages, searchable }
    }

    /// The first page's text, used for DOI discovery on uploads.
    #[must_use]
    pub fn first_page(&self) -> &str {
        self.pages.first().map_or("", String::as_str)
    }
}

/// Errors while extracting text from a PDF asset.
#[derive(Debug, Error)]
pub enum TextExtractionError {
    /// The PDF container could not be opened at all. The record is
    /// still committed with the PDF present and text absent.
    #[error("PDF container could not be parsed: {detail}")]
    CorruptFile {
        /// Parser detail.
        detail: String,
    },

    /// The document opened but reports zero pages. The asset is
    /// rejected as non-recoverable and never retried.
    #[error("PDF has no pages")]
    NoPages,
}

/// Extracts per-page text from in-memory PDF bytes.
///
/// # Errors
///
/// [`TextExtractionError::CorruptFile`] when the container is
/// unparsable, [`TextExtractionError::NoPages`] for a zero-page
/// document. Per-page extraction failures are not errors.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn extract_text(bytes: &[u8]) -> Result<ExtractedText, TextExtractionError> {
    let document = Document::load_mem(bytes).map_err(|e| TextExtractionError::CorruptFile {
        detail: e.to_string(),
    })?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(TextExtractionError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page_number in page_numbers {
        match document.extract_text(&[page_number]) {
            Ok(text) => pages.push(text),
            Err(error) => {
                warn!(page = page_number, error = %error, "page failed to extract, keeping it empty");
                pages.push(String::new());
            }
        }
    }

    let searchable = pages.iter().any(|p| !p.trim().is_empty());
    if !searchable {
        debug!("no page yielded text, record will be unsearchable");
    }

    Ok(ExtractedText { pages, searchable })
}

/// Finds a DOI in extracted page text, for the upload path.
///
/// Papers usually print their DOI on the first page, often behind a
/// `doi:` or `https://doi.org/` prefix; the shared DOI normalizer
/// handles both.
#[must_use]
pub fn find_doi_in_text(text: &str) -> Option<String> {
    resolver::find_doi(text)
}
