//! Shared in-memory PDF download helper used by every waterfall source.
//!
//! Downloads are streamed into memory with a size ceiling. Exceeding the
//! ceiling is a large-file notice, not a failure: the bytes are kept and
//! the caller records the oversize flag. Zero-byte and non-PDF responses
//! are source failures so the waterfall advances.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::SourceError;

/// PDF files start with this magic.
const PDF_MAGIC: &[u8] = b"%PDF";

/// Downloads PDF bytes for waterfall sources.
///
/// One instance is shared across sources so connection pooling applies
/// across the whole waterfall.
#[derive(Debug, Clone)]
pub(crate) struct Downloader {
    client: reqwest::Client,
    max_bytes: u64,
}

/// A completed in-memory download.
#[derive(Debug)]
pub(crate) struct Downloaded {
    /// The raw response body.
    pub bytes: Vec<u8>,
    /// True when the body exceeded the configured ceiling.
    pub oversize: bool,
}

impl Downloader {
    /// Creates a downloader with the given timeouts and size ceiling.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    pub(crate) fn new(timeout: Duration, max_bytes: u64) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, max_bytes }
    }

    /// Returns the underlying client for non-PDF requests (API lookups,
    /// mirror page fetches).
    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Downloads `url` and validates that it is a usable PDF.
    ///
    /// # Errors
    ///
    /// - [`SourceError::Network`] / [`SourceError::HttpStatus`] on
    ///   transport or status failures
    /// - [`SourceError::Empty`] for zero-byte bodies
    /// - [`SourceError::NotPdf`] when neither the content type nor the
    ///   leading bytes look like a PDF
    pub(crate) async fn fetch_pdf(
        &self,
        url: &str,
        source: &str,
    ) -> Result<Downloaded, SourceError> {
        debug!(url = %url, source = source, "downloading PDF candidate");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::timeout(source)
            } else {
                SourceError::network(source, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(source, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty()
            && !content_type.contains("pdf")
            && !content_type.contains("octet-stream")
        {
            return Err(SourceError::not_pdf(
                source,
                format!("content type {content_type}"),
            ));
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut oversize = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SourceError::network(source, e))?;
            bytes.extend_from_slice(&chunk);
            if !oversize && bytes.len() as u64 > self.max_bytes {
                // Large-file notice only; the download continues.
                oversize = true;
                warn!(
                    url = %url,
                    source = source,
                    limit_bytes = self.max_bytes,
                    "PDF exceeds the configured size ceiling"
                );
            }
        }

        if bytes.is_empty() {
            return Err(SourceError::empty(source));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(SourceError::not_pdf(source, "missing %PDF header"));
        }

        Ok(Downloaded { bytes, oversize })
    }
}
