//! Paperdock Core Library
//!
//! This library provides the core functionality for the paperdock tool:
//! turning a pasted DOI, arXiv link, or paper URL into a committed
//! library record with metadata, the PDF itself, and searchable text.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`resolver`] - Input normalization into canonical identifiers
//! - [`metadata`] - Ordered bibliographic provider chain
//! - [`pdf`] - Ordered PDF source waterfall
//! - [`extract`] - Plain-text extraction from PDFs
//! - [`library`] - On-disk record store with atomic commits
//! - [`pipeline`] - Import orchestration and outcome typing
//! - [`search`] - Weighted in-memory search over committed records
//! - [`api`] - JSON contract shapes for the REST layer
//! - [`config`] - File config and explicit pipeline settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod extract;
pub mod library;
pub mod metadata;
pub mod pdf;
pub mod pipeline;
pub mod resolver;
pub mod search;

// Re-export commonly used types
pub use config::{AcquireConfig, AppConfig, DEFAULT_MIRROR_DOMAIN};
pub use library::{Library, PaperRecord, StorageError};
pub use pipeline::{AcquisitionPipeline, ImportErrorKind, ImportOutcome, Missing, UploadOutcome};
pub use resolver::{CanonicalId, RecordKey, ResolutionError, Resolver};
pub use search::{SearchHit, SearchIndex};
