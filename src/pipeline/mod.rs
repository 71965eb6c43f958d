//! The acquisition pipeline: one import request from raw input to a
//! committed library record.
//!
//! Stage order is `resolve → duplicate check → fetch (metadata ∥ PDF)
//! → extract → commit`. Fetch-stage failures degrade the outcome to
//! [`ImportOutcome::Partial`]; resolution, duplicate and storage
//! failures are terminal errors. The two fetch arms run concurrently;
//! the metadata arm feeds its open-access link to the PDF arm through
//! a watch channel so the waterfall can use it when it arrives in time.

use tracing::{info, instrument, warn};

use crate::config::AcquireConfig;
use crate::extract::{self, ExtractedText, TextExtractionError};
use crate::library::{Library, PaperRecord, PdfInfo, StorageError, TextInfo};
use crate::metadata::{
    CrossrefProvider, MetadataFetchChain, MetadataFetchError, SemanticScholarProvider,
};
use crate::pdf::{
    pdf_url_hint_channel, Downloader, MetadataLinkSource, MirrorSource, PdfAsset, PdfFetchError,
    PdfFetchWaterfall, PublisherSource, RepositorySource, UnpaywallSource,
};
use crate::resolver::{CanonicalId, RecordKey, Resolver};

/// Character budget for the text preview returned to upload callers.
const PREVIEW_CHARS: usize = 500;

/// Which fetch arm came up empty in a partial import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No provider returned metadata.
    Metadata,
    /// No source returned a usable PDF.
    Pdf,
}

impl Missing {
    /// Stable lowercase label for API payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Pdf => "pdf",
        }
    }
}

/// Terminal error kinds for an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportErrorKind {
    /// The input is not a DOI, URL, or readable PDF.
    InvalidFormat,
    /// The paper is already in the library.
    Duplicate,
    /// The library directory rejected the write.
    Storage,
}

impl ImportErrorKind {
    /// Stable lowercase label for API payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::Duplicate => "duplicate",
            Self::Storage => "storage",
        }
    }
}

/// Terminal state of one import. Returned to the caller, never
/// persisted; every variant carries a message fit for direct display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Metadata and PDF both landed.
    Success {
        /// Key of the committed record.
        key: RecordKey,
        /// Display message.
        message: String,
    },
    /// The record was committed with at least one fetch arm empty.
    Partial {
        /// Key of the committed record.
        key: RecordKey,
        /// Which arms came up empty.
        missing: Vec<Missing>,
        /// Display message naming the manual follow-up.
        message: String,
    },
    /// Nothing was committed (or, for duplicates, the existing record
    /// was left untouched).
    Error {
        /// What went wrong.
        kind: ImportErrorKind,
        /// Display message.
        message: String,
        /// For duplicates, the record that already covers this paper.
        existing_id: Option<RecordKey>,
    },
}

/// Terminal state of a manual PDF upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A DOI was found in the PDF and metadata fetched for it.
    Success {
        /// Key of the committed record.
        key: RecordKey,
        /// Provider that supplied the metadata.
        metadata_source: String,
        /// First characters of the extracted text.
        preview: Option<String>,
        /// Display message.
        message: String,
    },
    /// The PDF was stored but metadata must be entered manually.
    NeedsMetadata {
        /// Key of the committed record.
        key: RecordKey,
        /// First characters of the extracted text.
        preview: Option<String>,
        /// Display message.
        message: String,
    },
    /// Nothing was committed.
    Error {
        /// What went wrong.
        kind: ImportErrorKind,
        /// Display message.
        message: String,
        /// For duplicates, the record that already covers this paper.
        existing_id: Option<RecordKey>,
    },
}

/// Orchestrates imports against one library.
///
/// Single-flight per call: each `import` runs to completion on its own
/// record key. Concurrent imports of different papers are safe because
/// the library's atomic writes never interleave partially; the same
/// paper twice is caught by the duplicate check.
pub struct AcquisitionPipeline {
    resolver: Resolver,
    library: Library,
    chain: MetadataFetchChain,
    waterfall: PdfFetchWaterfall,
    max_pdf_bytes: u64,
}

impl AcquisitionPipeline {
    /// Builds a pipeline over the library with the given settings.
    #[must_use]
    pub fn new(library: Library, config: &AcquireConfig) -> Self {
        let downloader = Downloader::new(config.fetch_timeout, config.max_pdf_bytes);
        let chain = MetadataFetchChain::new(
            vec![
                Box::new(SemanticScholarProvider::new(
                    config.semantic_scholar_base_url.clone(),
                )),
                Box::new(CrossrefProvider::new(config.crossref_base_url.clone())),
            ],
            config.fetch_timeout,
        );
        let waterfall = PdfFetchWaterfall::new(
            vec![
                Box::new(MetadataLinkSource::new(downloader.clone())),
                Box::new(UnpaywallSource::new(
                    downloader.clone(),
                    config.unpaywall_base_url.clone(),
                    config.unpaywall_email.clone(),
                )),
                Box::new(RepositorySource::new(
                    downloader.clone(),
                    config.arxiv_base_url.clone(),
                    config.biorxiv_base_url.clone(),
                )),
                Box::new(PublisherSource::new(
                    downloader.clone(),
                    config.plos_base_url.clone(),
                    config.elife_cdn_base_url.clone(),
                    config.jneurosci_base_url.clone(),
                )),
                Box::new(MirrorSource::new(downloader, config.mirror_base_url.clone())),
            ],
            config.fetch_timeout,
        );
        Self {
            resolver: Resolver::new(config.fetch_timeout),
            library,
            chain,
            waterfall,
            max_pdf_bytes: config.max_pdf_bytes,
        }
    }

    /// The library this pipeline commits into.
    #[must_use]
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Imports a paper from a raw DOI or URL.
    #[instrument(skip(self))]
    pub async fn import(&self, input: &str) -> ImportOutcome {
        let id = match self.resolver.resolve(input).await {
            Ok(id) => id,
            Err(error) => {
                return ImportOutcome::Error {
                    kind: ImportErrorKind::InvalidFormat,
                    message: format!("{error}. Paste a DOI, arXiv link, or paper URL."),
                    existing_id: None,
                };
            }
        };

        if let Some(existing) = self.library.find_duplicate(&id) {
            return duplicate_outcome(existing);
        }
        let key = RecordKey::for_id(&id);

        // Metadata and PDF arms run concurrently; the metadata arm
        // settles the hint channel either way so the waterfall never
        // waits on it.
        let (hint_tx, hint_rx) = pdf_url_hint_channel();
        let metadata_arm = async {
            let result = self.chain.fetch(&id).await;
            let hint = result.as_ref().ok().and_then(|m| m.pdf_url.clone());
            let _ = hint_tx.send(hint);
            result
        };
        let pdf_arm = self.waterfall.fetch(&id, &hint_rx);
        let (metadata_result, pdf_result) = tokio::join!(metadata_arm, pdf_arm);

        let (asset, text) = match &pdf_result {
            Ok(asset) => extract_stage(asset),
            Err(error) => {
                warn!(error = %error, "no PDF fetched, committing without one");
                (None, None)
            }
        };

        let mut record = PaperRecord::new(key, &id);
        if let Ok(metadata) = &metadata_result {
            record.apply_metadata(metadata.clone());
        }
        apply_files(&mut record, asset, text.as_ref());

        let record = match self.library.commit(record, asset, text.as_ref()).await {
            Ok(record) => record,
            Err(error) => return storage_outcome(&error),
        };

        let mut missing = Vec::new();
        if metadata_result.is_err() {
            missing.push(Missing::Metadata);
        }
        if asset.is_none() {
            missing.push(Missing::Pdf);
        }

        if missing.is_empty() {
            info!(key = record.key.as_str(), "import complete");
            ImportOutcome::Success {
                message: success_message(&record, text.as_ref()),
                key: record.key,
            }
        } else {
            ImportOutcome::Partial {
                message: partial_message(
                    &missing,
                    metadata_result.as_ref().err(),
                    pdf_result.as_ref().err(),
                ),
                key: record.key,
                missing,
            }
        }
    }

    /// Imports a manually uploaded PDF.
    ///
    /// Reuses the extractor (to find a DOI on the first page) and the
    /// metadata chain, but never the waterfall: the PDF is already in
    /// hand.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn import_pdf(&self, bytes: Vec<u8>) -> UploadOutcome {
        let extracted = match extract::extract_text(&bytes) {
            Ok(extracted) => extracted,
            Err(error) => {
                return UploadOutcome::Error {
                    kind: ImportErrorKind::InvalidFormat,
                    message: format!("Uploaded file is not a readable PDF: {error}"),
                    existing_id: None,
                };
            }
        };
        let preview = text_preview(&extracted);

        let discovered = extract::find_doi_in_text(extracted.first_page())
            .map(CanonicalId::Doi);

        let oversize = bytes.len() as u64 > self.max_pdf_bytes;
        if oversize {
            warn!(
                bytes = bytes.len(),
                limit = self.max_pdf_bytes,
                "uploaded PDF exceeds the configured size ceiling"
            );
        }
        let asset = PdfAsset {
            bytes,
            source: "upload".to_string(),
            oversize,
        };

        let Some(id) = discovered else {
            // No DOI on the first page: store under an opaque key.
            let mut record = PaperRecord::unidentified(RecordKey::opaque());
            apply_files(&mut record, Some(&asset), Some(&extracted));
            return match self.library.commit(record, Some(&asset), Some(&extracted)).await {
                Ok(record) => UploadOutcome::NeedsMetadata {
                    key: record.key,
                    preview,
                    message: "PDF stored. No DOI found in it; add the metadata manually."
                        .to_string(),
                },
                Err(error) => upload_storage_outcome(&error),
            };
        };

        if let Some(existing) = self.library.find_duplicate(&id) {
            return match duplicate_outcome(existing) {
                ImportOutcome::Error {
                    kind,
                    message,
                    existing_id,
                } => UploadOutcome::Error {
                    kind,
                    message,
                    existing_id,
                },
                _ => unreachable!("duplicate_outcome always builds an error"),
            };
        }

        let key = RecordKey::for_id(&id);
        let metadata_result = self.chain.fetch(&id).await;

        let mut record = PaperRecord::new(key, &id);
        if let Ok(metadata) = &metadata_result {
            record.apply_metadata(metadata.clone());
        }
        apply_files(&mut record, Some(&asset), Some(&extracted));

        let record = match self.library.commit(record, Some(&asset), Some(&extracted)).await {
            Ok(record) => record,
            Err(error) => return upload_storage_outcome(&error),
        };

        match metadata_result {
            Ok(metadata) => UploadOutcome::Success {
                key: record.key,
                metadata_source: metadata.source,
                preview,
                message: format!("Imported \"{}\" from the uploaded PDF.", metadata.title),
            },
            Err(error) => UploadOutcome::NeedsMetadata {
                key: record.key,
                preview,
                message: format!("PDF stored, but {error}. Add the metadata manually."),
            },
        }
    }
}

/// Runs text extraction on a fetched asset, deciding what survives.
///
/// A zero-page asset is rejected outright (and never retried); a
/// corrupt container keeps the PDF but drops the text.
fn extract_stage(asset: &PdfAsset) -> (Option<&PdfAsset>, Option<ExtractedText>) {
    match extract::extract_text(&asset.bytes) {
        Ok(extracted) => (Some(asset), Some(extracted)),
        Err(TextExtractionError::NoPages) => {
            warn!(source = %asset.source, "fetched PDF has no pages, rejecting the asset");
            (None, None)
        }
        Err(error @ TextExtractionError::CorruptFile { .. }) => {
            warn!(source = %asset.source, error = %error, "keeping PDF without extracted text");
            (Some(asset), None)
        }
    }
}

fn apply_files(record: &mut PaperRecord, asset: Option<&PdfAsset>, text: Option<&ExtractedText>) {
    if let Some(asset) = asset {
        record.pdf = Some(PdfInfo {
            source: asset.source.clone(),
            size: asset.size(),
            oversize: asset.oversize,
        });
    }
    if let Some(text) = text {
        record.text = Some(TextInfo {
            pages: text.pages.len(),
            searchable: text.searchable,
        });
    }
}

/// First [`PREVIEW_CHARS`] characters of the extracted text, when any.
fn text_preview(extracted: &ExtractedText) -> Option<String> {
    let joined = extracted.joined();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(PREVIEW_CHARS).collect())
}

fn duplicate_outcome(existing: RecordKey) -> ImportOutcome {
    ImportOutcome::Error {
        kind: ImportErrorKind::Duplicate,
        message: format!(
            "This paper is already in your library as {} — open the existing record.",
            existing.as_str()
        ),
        existing_id: Some(existing),
    }
}

fn storage_outcome(error: &StorageError) -> ImportOutcome {
    ImportOutcome::Error {
        kind: ImportErrorKind::Storage,
        message: error.to_string(),
        existing_id: None,
    }
}

fn upload_storage_outcome(error: &StorageError) -> UploadOutcome {
    UploadOutcome::Error {
        kind: ImportErrorKind::Storage,
        message: error.to_string(),
        existing_id: None,
    }
}

fn success_message(record: &PaperRecord, text: Option<&ExtractedText>) -> String {
    let title = record.display_title();
    if text.is_some_and(|t| !t.searchable) {
        format!("Imported \"{title}\". The PDF has no text layer, so full-text search is disabled for it.")
    } else {
        format!("Imported \"{title}\".")
    }
}

fn partial_message(
    missing: &[Missing],
    metadata_error: Option<&MetadataFetchError>,
    pdf_error: Option<&PdfFetchError>,
) -> String {
    let pdf_note = match pdf_error {
        Some(PdfFetchError::MirrorUnreachable { .. }) => {
            "PDF unavailable and the mirror domain was unreachable — update it in settings, then upload manually"
        }
        _ => "PDF unavailable — upload manually",
    };
    let metadata_note = match metadata_error {
        Some(MetadataFetchError::RateLimited { .. }) => {
            "metadata providers are rate-limiting — try again shortly"
        }
        _ => "metadata unavailable — fill it in manually",
    };

    match (
        missing.contains(&Missing::Metadata),
        missing.contains(&Missing::Pdf),
    ) {
        (false, true) => format!("Metadata imported, but {pdf_note}."),
        (true, false) => format!("PDF imported, but {metadata_note}."),
        _ => format!("Record created, but {metadata_note}, and {pdf_note}."),
    }
}
