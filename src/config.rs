//! Configuration: the JSON config file and the explicit pipeline
//! settings bundle.
//!
//! [`AppConfig`] is what lives on disk; [`AcquireConfig`] is what the
//! pipeline consumes. Settings are always passed in as values, never
//! read as global state, so tests can point every provider and source
//! at a fake endpoint.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::metadata::{CROSSREF_BASE_URL, SEMANTIC_SCHOLAR_BASE_URL};
use crate::pdf::{
    ARXIV_BASE_URL, BIORXIV_BASE_URL, ELIFE_CDN_BASE_URL, JNEUROSCI_BASE_URL, PLOS_BASE_URL,
    UNPAYWALL_BASE_URL,
};

/// Default last-resort mirror domain. These rotate, which is exactly
/// why the value is user-settable.
pub const DEFAULT_MIRROR_DOMAIN: &str = "sci-hub.se";

/// Default PDF size ceiling in megabytes.
pub const DEFAULT_MAX_PDF_MB: u64 = 50;

/// Default wall-clock budget per provider/source attempt, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// JSON-backed file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the paper library.
    pub library_path: PathBuf,
    /// Last-resort mirror domain (no scheme).
    pub mirror_domain: String,
    /// PDF size ceiling in megabytes; exceeding it is a notice, not a
    /// failure.
    pub max_pdf_mb: u64,
    /// Contact address for the email-gated open-access resolver.
    pub unpaywall_email: String,
    /// Per provider/source attempt budget in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("./papers"),
            mirror_domain: DEFAULT_MIRROR_DOMAIN.to_string(),
            max_pdf_mb: DEFAULT_MAX_PDF_MB,
            unpaywall_email: String::new(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Loads config from `path`, writing and returning defaults when
    /// the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read, parsed, or
    /// validated, or when the default file cannot be written.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails when the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory '{}'", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Fails with a message naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.mirror_domain.is_empty() || self.mirror_domain.contains("://") {
            bail!(
                "Invalid config value for `mirror_domain`: '{}'. Expected a bare domain like '{}'",
                self.mirror_domain,
                DEFAULT_MIRROR_DOMAIN
            );
        }
        if !(1..=2048).contains(&self.max_pdf_mb) {
            bail!(
                "Invalid config value for `max_pdf_mb`: {}. Expected range: 1..=2048",
                self.max_pdf_mb
            );
        }
        if !(1..=3600).contains(&self.fetch_timeout_secs) {
            bail!(
                "Invalid config value for `fetch_timeout_secs`: {}. Expected range: 1..=3600",
                self.fetch_timeout_secs
            );
        }
        if !self.unpaywall_email.is_empty() && !self.unpaywall_email.contains('@') {
            bail!(
                "Invalid config value for `unpaywall_email`: '{}'. Expected an email address",
                self.unpaywall_email
            );
        }
        Ok(())
    }

    /// Derives the pipeline settings bundle from the file config.
    #[must_use]
    pub fn acquire_config(&self) -> AcquireConfig {
        AcquireConfig {
            mirror_base_url: format!("https://{}", self.mirror_domain),
            max_pdf_bytes: self.max_pdf_mb * 1024 * 1024,
            unpaywall_email: self.unpaywall_email.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..AcquireConfig::default()
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/paperdock/config.json`
/// 2. `$HOME/.config/paperdock/config.json`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("paperdock")
                .join("config.json"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("paperdock")
            .join("config.json"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Settings the acquisition pipeline consumes, passed in explicitly.
///
/// Base URLs exist so every network dependency can be redirected at a
/// fake server in tests; production code uses the defaults.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Mirror base URL, scheme included.
    pub mirror_base_url: String,
    /// PDF size ceiling in bytes.
    pub max_pdf_bytes: u64,
    /// Contact address for the open-access resolver.
    pub unpaywall_email: String,
    /// Wall-clock budget per provider/source attempt.
    pub fetch_timeout: Duration,
    /// Semantic Scholar API base URL.
    pub semantic_scholar_base_url: String,
    /// Crossref API base URL.
    pub crossref_base_url: String,
    /// Unpaywall API base URL.
    pub unpaywall_base_url: String,
    /// arXiv base URL.
    pub arxiv_base_url: String,
    /// bioRxiv base URL.
    pub biorxiv_base_url: String,
    /// PLOS journals base URL.
    pub plos_base_url: String,
    /// eLife article CDN base URL.
    pub elife_cdn_base_url: String,
    /// JNeurosci base URL.
    pub jneurosci_base_url: String,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            mirror_base_url: format!("https://{DEFAULT_MIRROR_DOMAIN}"),
            max_pdf_bytes: DEFAULT_MAX_PDF_MB * 1024 * 1024,
            unpaywall_email: String::new(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            semantic_scholar_base_url: SEMANTIC_SCHOLAR_BASE_URL.to_string(),
            crossref_base_url: CROSSREF_BASE_URL.to_string(),
            unpaywall_base_url: UNPAYWALL_BASE_URL.to_string(),
            arxiv_base_url: ARXIV_BASE_URL.to_string(),
            biorxiv_base_url: BIORXIV_BASE_URL.to_string(),
            plos_base_url: PLOS_BASE_URL.to_string(),
            elife_cdn_base_url: ELIFE_CDN_BASE_URL.to_string(),
            jneurosci_base_url: JNEUROSCI_BASE_URL.to_string(),
        }
    }
}
