//! The on-disk paper library: duplicate detection and the single
//! committed-write path.
//!
//! The library directory is the sole source of truth; there is no
//! database beside it. Each record owns three files named by its key:
//! `{key}.json` (the record), `{key}.pdf` (the asset) and `{key}.txt`
//! (cached page text). Every write goes through write-to-temp-then-
//! rename so a crash mid-commit never leaves a half-written file
//! observable under its final name.

mod record;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use record::{PaperRecord, PdfInfo, TextInfo};

use crate::extract::ExtractedText;
use crate::pdf::PdfAsset;
use crate::resolver::{CanonicalId, RecordKey};

/// Errors from the record store. `DiskFull` and `PermissionDenied` are
/// fatal and surfaced verbatim; an import aborts on them even when the
/// fetches succeeded.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The volume holding the library is out of space.
    #[error("disk full while writing {path}")]
    DiskFull {
        /// Path being written.
        path: PathBuf,
    },

    /// The library directory or file is not writable.
    #[error("permission denied for {path}")]
    PermissionDenied {
        /// Path being accessed.
        path: PathBuf,
    },

    /// Any other I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A record file exists but does not parse.
    #[error("record {path} is unreadable: {source}")]
    BadRecord {
        /// Path of the record file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Lookup for a key that has no record.
    #[error("no record with key {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },
}

impl StorageError {
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            io::ErrorKind::StorageFull => Self::DiskFull {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Handle to a library directory.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Opens (creating if needed) the library at `root`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::from_io(&root, e))?;
        Ok(Self { root })
    }

    /// The library directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    fn asset_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(format!("{}.pdf", key.as_str()))
    }

    fn text_path(&self, key: &RecordKey) -> PathBuf {
        self.root.join(format!("{}.txt", key.as_str()))
    }

    /// Checks whether the identifier is already in the library.
    ///
    /// Fast path is the derived key; for DOI identifiers a
    /// case-insensitive scan over stored records' `doi` fields also
    /// catches papers imported under a different key (e.g. an upload
    /// whose DOI was discovered later). Runs before any network fetch.
    #[instrument(skip(self))]
    #[must_use]
    pub fn find_duplicate(&self, id: &CanonicalId) -> Option<RecordKey> {
        let key = RecordKey::for_id(id);
        if self.record_path(&key).exists() {
            debug!(key = key.as_str(), "duplicate found by key");
            return Some(key);
        }

        let doi = id.doi()?;
        for record in self.list().unwrap_or_default() {
            if record
                .doi
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(doi))
            {
                debug!(key = record.key.as_str(), "duplicate found by DOI scan");
                return Some(record.key);
            }
        }
        None
    }

    /// Commits a record with its optional asset and text cache.
    ///
    /// The asset and text files land before the record file: a record
    /// file under its final name always describes files that exist.
    /// Writes run on `tokio::fs` so a large PDF body does not block the
    /// runtime; `date_modified` is bumped on every commit.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`]; `DiskFull` and `PermissionDenied`
    /// abort the import.
    #[instrument(skip(self, record, asset, text), fields(key = record.key.as_str()))]
    pub async fn commit(
        &self,
        mut record: PaperRecord,
        asset: Option<&PdfAsset>,
        text: Option<&ExtractedText>,
    ) -> Result<PaperRecord, StorageError> {
        record.date_modified = Utc::now();

        if let Some(asset) = asset {
            write_atomic(&self.asset_path(&record.key), &asset.bytes).await?;
        }
        if let Some(text) = text {
            write_atomic(&self.text_path(&record.key), text.joined().as_bytes()).await?;
        }
        self.write_record(&record).await?;

        info!(
            key = record.key.as_str(),
            pdf = asset.is_some(),
            text = text.is_some(),
            "record committed"
        );
        Ok(record)
    }

    /// Loads one record.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the key has no record, or a read
    /// or parse failure.
    pub fn load(&self, key: &RecordKey) -> Result<PaperRecord, StorageError> {
        let path = self.record_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.as_str().to_string(),
                });
            }
            Err(e) => return Err(StorageError::from_io(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StorageError::BadRecord { path, source: e })
    }

    /// Lists all records, newest first. Unreadable record files are
    /// skipped with a warning rather than failing the listing.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the directory itself cannot be
    /// read.
    pub fn list(&self) -> Result<Vec<PaperRecord>, StorageError> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| StorageError::from_io(&self.root, e))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::from_io(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).map_err(|e| StorageError::from_io(&path, e)).and_then(|bytes| {
                serde_json::from_slice::<PaperRecord>(&bytes).map_err(|e| {
                    StorageError::BadRecord {
                        path: path.clone(),
                        source: e,
                    }
                })
            }) {
                Ok(record) => records.push(record),
                Err(error) => warn!(path = %path.display(), error = %error, "skipping unreadable record"),
            }
        }

        records.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(records)
    }

    /// Deletes a record and its companion files. Returns whether
    /// anything was removed.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures other than the files being absent.
    pub fn delete(&self, key: &RecordKey) -> Result<bool, StorageError> {
        let mut deleted = false;
        for path in [
            self.record_path(key),
            self.asset_path(key),
            self.text_path(key),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => deleted = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::from_io(&path, e)),
            }
        }
        if deleted {
            info!(key = key.as_str(), "record deleted");
        }
        Ok(deleted)
    }

    /// Replaces a record's tags, bumping `date_modified`.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the key has no record, or a
    /// write failure.
    pub async fn update_tags(&self, key: &RecordKey, tags: Vec<String>) -> Result<(), StorageError> {
        let mut record = self.load(key)?;
        record.tags = tags;
        record.date_modified = Utc::now();
        self.write_record(&record).await
    }

    /// Path to the stored PDF, when one exists.
    #[must_use]
    pub fn pdf_path(&self, key: &RecordKey) -> Option<PathBuf> {
        let path = self.asset_path(key);
        path.exists().then_some(path)
    }

    /// The cached extracted text, when one exists.
    ///
    /// # Errors
    ///
    /// Propagates read failures other than the cache being absent.
    pub fn cached_text(&self, key: &RecordKey) -> Result<Option<ExtractedText>, StorageError> {
        let path = self.text_path(key);
        match fs::read_to_string(&path) {
            Ok(cached) => Ok(Some(ExtractedText::from_cached(&cached))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(&path, e)),
        }
    }

    async fn write_record(&self, record: &PaperRecord) -> Result<(), StorageError> {
        let path = self.record_path(&record.key);
        let json = serde_json::to_vec_pretty(record).map_err(|e| StorageError::BadRecord {
            path: path.clone(),
            source: e,
        })?;
        write_atomic(&path, &json).await
    }
}

/// Writes to `{path}.tmp` then renames over the final name.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StorageError::from_io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // Leave no temp file behind on a failed rename.
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::from_io(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
