//! Wire shapes for the REST layer that sits in front of the pipeline.
//!
//! The server itself lives elsewhere; these types pin down the JSON
//! contract and the mapping from pipeline outcomes, so the contract is
//! testable without a running server.

use serde::{Deserialize, Serialize};

use crate::pipeline::{ImportOutcome, UploadOutcome};
use crate::search::SearchHit;

/// `POST /papers/import` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Raw DOI or URL as the user pasted it.
    pub input: String,
}

/// `POST /papers/import` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResponse {
    /// `success`, `partial`, or `error`.
    pub status: String,
    /// Key of the committed record, when one was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<String>,
    /// Display message.
    pub message: String,
    /// For partial imports, which of `metadata`/`pdf` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    /// For errors, the machine-readable kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// For duplicates, the record that already covers this paper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<String>,
}

impl From<ImportOutcome> for ImportResponse {
    fn from(outcome: ImportOutcome) -> Self {
        match outcome {
            ImportOutcome::Success { key, message } => Self {
                status: "success".to_string(),
                paper_id: Some(key.as_str().to_string()),
                message,
                missing: None,
                error: None,
                existing_id: None,
            },
            ImportOutcome::Partial {
                key,
                missing,
                message,
            } => Self {
                status: "partial".to_string(),
                paper_id: Some(key.as_str().to_string()),
                message,
                missing: Some(missing.iter().map(|m| m.as_str().to_string()).collect()),
                error: None,
                existing_id: None,
            },
            ImportOutcome::Error {
                kind,
                message,
                existing_id,
            } => Self {
                status: "error".to_string(),
                paper_id: None,
                message,
                missing: None,
                error: Some(kind.as_str().to_string()),
                existing_id: existing_id.map(|k| k.as_str().to_string()),
            },
        }
    }
}

/// `POST /papers/upload` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `success`, `needs_metadata`, or `error`.
    pub status: String,
    /// Key of the committed record, when one was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<String>,
    /// Display message.
    pub message: String,
    /// Provider that supplied the metadata, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_source: Option<String>,
    /// First characters of the extracted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text_preview: Option<String>,
    /// For errors, the machine-readable kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// For duplicates, the record that already covers this paper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<String>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Success {
                key,
                metadata_source,
                preview,
                message,
            } => Self {
                status: "success".to_string(),
                paper_id: Some(key.as_str().to_string()),
                message,
                metadata_source: Some(metadata_source),
                extracted_text_preview: preview,
                error: None,
                existing_id: None,
            },
            UploadOutcome::NeedsMetadata {
                key,
                preview,
                message,
            } => Self {
                status: "needs_metadata".to_string(),
                paper_id: Some(key.as_str().to_string()),
                message,
                metadata_source: None,
                extracted_text_preview: preview,
                error: None,
                existing_id: None,
            },
            UploadOutcome::Error {
                kind,
                message,
                existing_id,
            } => Self {
                status: "error".to_string(),
                paper_id: None,
                message,
                metadata_source: None,
                extracted_text_preview: None,
                error: Some(kind.as_str().to_string()),
                existing_id: existing_id.map(|k| k.as_str().to_string()),
            },
        }
    }
}

/// One entry in a `GET /papers/search` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Key of the matching record.
    pub paper_id: String,
    /// Title for display.
    pub title: String,
    /// Weighted match score.
    pub score: u32,
    /// Fields that matched.
    pub matched_fields: Vec<String>,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            paper_id: hit.key.as_str().to_string(),
            title: hit.title,
            score: hit.score,
            matched_fields: hit.fields.iter().map(|f| f.as_str().to_string()).collect(),
        }
    }
}
