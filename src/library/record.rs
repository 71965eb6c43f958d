//! The durable per-paper record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{Author, ExternalMetadata};
use crate::resolver::{CanonicalId, RecordKey};

/// Provenance and shape of a stored PDF asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfInfo {
    /// Which waterfall source produced the file.
    pub source: String,
    /// File size in bytes.
    pub size: u64,
    /// True when the download exceeded the configured size ceiling.
    #[serde(default)]
    pub oversize: bool,
}

/// Shape of the cached extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInfo {
    /// Page count.
    pub pages: usize,
    /// False when no page yielded text; such records are excluded from
    /// full-text search.
    pub searchable: bool,
}

/// One paper in the library, serialized as `{key}.json`.
///
/// Only `key` and the timestamps are guaranteed; everything else
/// depends on what the fetch stages managed to produce. A metadata-only
/// record (no `pdf`) and a PDF-only record (no `title`) are both valid,
/// committed outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable record key derived from the identifier.
    pub key: RecordKey,

    /// DOI, when the paper was imported by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// arXiv id, when the paper was imported by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,

    /// Landing-page or input URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Title from metadata; absent on a PDF-only partial record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Ordered author list.
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Abstract text.
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    /// Journal or venue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    /// Publication year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Which provider supplied the metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_source: Option<String>,

    /// Stored PDF asset, when one was fetched or uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfInfo>,

    /// Cached extracted text, when extraction succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextInfo>,

    /// User-managed tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// When the record was first committed.
    pub date_added: DateTime<Utc>,

    /// Bumped on every store mutation.
    pub date_modified: DateTime<Utc>,
}

impl PaperRecord {
    /// Creates an empty record for the identifier, timestamps set to now.
    #[must_use]
    pub fn new(key: RecordKey, id: &CanonicalId) -> Self {
        let now = Utc::now();
        Self {
            key,
            doi: id.doi().map(str::to_string),
            arxiv_id: id.arxiv_id().map(str::to_string),
            source_url: match id {
                CanonicalId::OpaqueUrl(url) => Some(url.clone()),
                _ => None,
            },
            title: None,
            authors: Vec::new(),
            abstract_text: None,
            journal: None,
            year: None,
            metadata_source: None,
            pdf: None,
            text: None,
            tags: Vec::new(),
            date_added: now,
            date_modified: now,
        }
    }

    /// Creates an empty record with no external identifier, for uploads
    /// whose first page carried no DOI.
    #[must_use]
    pub fn unidentified(key: RecordKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            doi: None,
            arxiv_id: None,
            source_url: None,
            title: None,
            authors: Vec::new(),
            abstract_text: None,
            journal: None,
            year: None,
            metadata_source: None,
            pdf: None,
            text: None,
            tags: Vec::new(),
            date_added: now,
            date_modified: now,
        }
    }

    /// Folds fetched metadata into the record. The whole block comes
    /// from one provider; fields are never merged across providers.
    pub fn apply_metadata(&mut self, metadata: ExternalMetadata) {
        self.title = Some(metadata.title);
        self.authors = metadata.authors;
        self.abstract_text = metadata.abstract_text;
        self.journal = metadata.journal;
        self.year = metadata.year;
        if self.source_url.is_none() {
            self.source_url = metadata.url;
        }
        self.metadata_source = Some(metadata.source);
    }

    /// Title for display, falling back to the key.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(self.key.as_str())
    }
}
