//! In-memory weighted search over committed records.
//!
//! The index lives outside the acquisition pipeline: it ingests a
//! record (plus its cached text) after commit, and can be rebuilt from
//! the library directory at startup. Scoring is a simple weighted sum
//! over field postings; no ranking model, no persistence.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::extract::ExtractedText;
use crate::library::{Library, PaperRecord, StorageError};
use crate::resolver::RecordKey;

/// Field weights, highest-signal first.
const WEIGHT_TITLE: u32 = 10;
const WEIGHT_TAG: u32 = 8;
const WEIGHT_AUTHOR: u32 = 7;
const WEIGHT_ABSTRACT: u32 = 4;
const WEIGHT_FULL_TEXT: u32 = 1;

/// Common English stopwords excluded from the index.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "this", "but", "they", "have",
    "had", "what", "when", "where", "who", "which", "why", "how",
];

#[allow(clippy::expect_used)]
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

/// Which record field a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchField {
    /// Paper title.
    Title,
    /// User tag.
    Tag,
    /// Author name.
    Author,
    /// Abstract.
    Abstract,
    /// Cached extracted text.
    FullText,
}

impl MatchField {
    /// Stable lowercase label for API payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Tag => "tag",
            Self::Author => "author",
            Self::Abstract => "abstract",
            Self::FullText => "full_text",
        }
    }
}

#[derive(Debug, Clone)]
struct Posting {
    key: RecordKey,
    field: MatchField,
    weight: u32,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Key of the matching record.
    pub key: RecordKey,
    /// Title for display, falling back to the key.
    pub title: String,
    /// Weighted match score.
    pub score: u32,
    /// Fields that matched, deduplicated.
    pub fields: Vec<MatchField>,
}

/// Weighted inverted index over library records.
#[derive(Debug, Default)]
pub struct SearchIndex {
    postings: HashMap<String, Vec<Posting>>,
    titles: HashMap<RecordKey, String>,
}

impl SearchIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.titles.len()
    }

    /// Indexes one committed record and its cached text.
    ///
    /// Records flagged unsearchable contribute no full-text postings
    /// even when a text cache exists.
    pub fn add_record(&mut self, record: &PaperRecord, text: Option<&ExtractedText>) {
        self.titles
            .insert(record.key.clone(), record.display_title().to_string());

        if let Some(title) = &record.title {
            self.index_field(&record.key, title, MatchField::Title, WEIGHT_TITLE);
        }
        for tag in &record.tags {
            self.index_field(&record.key, tag, MatchField::Tag, WEIGHT_TAG);
        }
        for author in &record.authors {
            self.index_field(&record.key, &author.name, MatchField::Author, WEIGHT_AUTHOR);
        }
        if let Some(abstract_text) = &record.abstract_text {
            self.index_field(
                &record.key,
                abstract_text,
                MatchField::Abstract,
                WEIGHT_ABSTRACT,
            );
        }

        let searchable = record.text.as_ref().is_some_and(|t| t.searchable);
        if let (true, Some(text)) = (searchable, text) {
            self.index_field(
                &record.key,
                &text.joined(),
                MatchField::FullText,
                WEIGHT_FULL_TEXT,
            );
        }
    }

    /// Rebuilds the index from every record in the library.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from listing or reading the cache.
    #[instrument(skip_all)]
    pub fn rebuild(&mut self, library: &Library) -> Result<(), StorageError> {
        self.postings.clear();
        self.titles.clear();
        for record in library.list()? {
            let text = library.cached_text(&record.key)?;
            self.add_record(&record, text.as_ref());
        }
        debug!(records = self.record_count(), "search index rebuilt");
        Ok(())
    }

    /// Searches the index, best score first, at most `limit` hits.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<RecordKey, u32> = HashMap::new();
        let mut fields: HashMap<RecordKey, Vec<MatchField>> = HashMap::new();
        for token in tokens {
            let Some(postings) = self.postings.get(&token) else {
                continue;
            };
            for posting in postings {
                *scores.entry(posting.key.clone()).or_insert(0) += posting.weight;
                let seen = fields.entry(posting.key.clone()).or_default();
                if !seen.contains(&posting.field) {
                    seen.push(posting.field);
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(key, score)| SearchHit {
                title: self
                    .titles
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| key.as_str().to_string()),
                fields: fields.remove(&key).unwrap_or_default(),
                key,
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.key.as_str().cmp(b.key.as_str()))
        });
        hits.truncate(limit);
        hits
    }

    fn index_field(&mut self, key: &RecordKey, text: &str, field: MatchField, weight: u32) {
        for token in tokenize(text) {
            self.postings.entry(token).or_default().push(Posting {
                key: key.clone(),
                field,
                weight,
            });
        }
    }
}

/// Lowercases, splits on word boundaries, drops stopwords and
/// single-character tokens.
fn tokenize(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|word| word.len() > 1 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}
