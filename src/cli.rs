//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Build a local, searchable library of research papers.
///
/// Paperdock resolves DOIs and paper URLs, fetches metadata and PDFs
/// from an ordered set of sources, and commits everything into a plain
/// directory of records.
#[derive(Parser, Debug)]
#[command(name = "paperdock")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file (defaults to the XDG config location)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Paperdock subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a paper by DOI, arXiv link, or URL
    Import {
        /// The DOI or URL to import
        input: String,
    },
    /// Import a PDF file from disk
    Upload {
        /// Path to the PDF file
        file: PathBuf,
    },
    /// List papers in the library, newest first
    List,
    /// Search the library
    Search {
        /// Query terms
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..=500))]
        limit: u16,
    },
    /// Print the active configuration
    Config,
}
