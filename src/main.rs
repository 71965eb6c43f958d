//! CLI entry point for the paperdock tool.

use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use paperdock_core::{
    config, AcquisitionPipeline, AppConfig, ImportOutcome, Library, SearchIndex, UploadOutcome,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config_path = match args.config {
        Some(path) => path,
        None => config::resolve_default_config_path()
            .context("Could not determine a config location; pass --config")?,
    };
    let app_config = AppConfig::load_or_init(&config_path)?;
    debug!(path = %config_path.display(), "configuration loaded");

    let library = Library::open(&app_config.library_path)?;

    match args.command {
        Command::Import { input } => {
            let pipeline = AcquisitionPipeline::new(library, &app_config.acquire_config());
            let outcome = pipeline.import(&input).await;
            report_import(&outcome)?;
        }
        Command::Upload { file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let pipeline = AcquisitionPipeline::new(library, &app_config.acquire_config());
            let outcome = pipeline.import_pdf(bytes).await;
            report_upload(&outcome)?;
        }
        Command::List => {
            let records = library.list()?;
            if records.is_empty() {
                println!("Library is empty.");
            }
            for record in records {
                let pdf_marker = if record.pdf.is_some() { "pdf" } else { "   " };
                println!(
                    "{}  [{}]  {}",
                    record.date_added.format("%Y-%m-%d"),
                    pdf_marker,
                    record.display_title()
                );
                println!("          {}", record.key);
            }
        }
        Command::Search { query, limit } => {
            let mut index = SearchIndex::new();
            index.rebuild(&library)?;
            let hits = index.search(&query, usize::from(limit));
            if hits.is_empty() {
                println!("No matches for '{query}'.");
            }
            for hit in hits {
                println!("{:>4}  {}  ({})", hit.score, hit.title, hit.key);
            }
        }
        Command::Config => {
            println!("config file: {}", config_path.display());
            println!("library_path: {}", app_config.library_path.display());
            println!("mirror_domain: {}", app_config.mirror_domain);
            println!("max_pdf_mb: {}", app_config.max_pdf_mb);
            println!("fetch_timeout_secs: {}", app_config.fetch_timeout_secs);
            let email = if app_config.unpaywall_email.is_empty() {
                "(unset)"
            } else {
                &app_config.unpaywall_email
            };
            println!("unpaywall_email: {email}");
        }
    }

    Ok(())
}

/// Prints an import outcome; exits non-zero for terminal errors.
fn report_import(outcome: &ImportOutcome) -> Result<()> {
    match outcome {
        ImportOutcome::Success { key, message } => {
            info!(key = %key, "import complete");
            println!("{message}");
            Ok(())
        }
        ImportOutcome::Partial { key, message, .. } => {
            info!(key = %key, "import partially complete");
            println!("{message}");
            Ok(())
        }
        ImportOutcome::Error { message, .. } => bail!("{message}"),
    }
}

/// Prints an upload outcome; exits non-zero for terminal errors.
fn report_upload(outcome: &UploadOutcome) -> Result<()> {
    match outcome {
        UploadOutcome::Success { key, message, .. }
        | UploadOutcome::NeedsMetadata { key, message, .. } => {
            info!(key = %key, "upload complete");
            println!("{message}");
            Ok(())
        }
        UploadOutcome::Error { message, .. } => bail!("{message}"),
    }
}
