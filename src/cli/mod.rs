//! CLI module
//!
//! Command-line interface for the file sharing peer.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command, SearchField};
pub use config::Config;
