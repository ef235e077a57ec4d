//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the file sharing peer
#[derive(Debug, Parser)]
#[command(name = "p2pfs")]
#[command(about = "Share, search and download files over a peer-to-peer overlay", long_about = None)]
pub struct CliArgs {
    /// Path to a JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding files this peer can share
    #[arg(long, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// Address advertised to other peers and bound by the content server
    #[arg(long, value_name = "IP")]
    pub host: Option<String>,

    /// Port of the content server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory of the shared overlay store
    #[arg(long, value_name = "DIR")]
    pub overlay_dir: Option<PathBuf>,

    /// Directory downloads are written to
    #[arg(short, long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Peer commands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve shared files until interrupted
    Serve {
        /// Publish every file in the content directory first
        #[arg(long)]
        publish_all: bool,
    },
    /// Publish a file from the content directory
    Publish {
        /// File name inside the content directory
        name: String,
        /// Keep serving after publishing
        #[arg(long)]
        serve: bool,
    },
    /// Search the index by one metadata field
    Search {
        /// Field to search by
        #[arg(value_enum)]
        field: SearchField,
        /// Exact term to look up
        term: String,
        /// Download the result
        #[arg(long)]
        download: bool,
    },
}

/// Searchable metadata fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchField {
    Filename,
    Artist,
    Title,
    Album,
}

impl SearchField {
    /// Field name as stored in tag keys
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Filename => "filename",
            SearchField::Artist => "artist",
            SearchField::Title => "title",
            SearchField::Album => "album",
        }
    }
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
