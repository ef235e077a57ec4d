//! p2pfs
//!
//! Peer-to-peer file sharing over a key/value overlay: content-addressed
//! publishing, metadata search and multi-provider HTTP download.

pub mod content;
pub mod overlay;
pub mod metadata;
pub mod service;
pub mod network;
pub mod application;
pub mod cli;
pub mod error;

pub use error::ShareError;

pub use content::{address, generate_tags, tag_key, ContentHasher, ContentId, FileMetadata, FileRecord, MetaInfo};
pub use overlay::{timed_get, timed_put, try_get, DirectoryOverlay, MemoryOverlay, Overlay};
pub use metadata::{normalize, Id3Extractor, MetadataExtractor, FIELDS};
pub use service::{IndexingService, PublishOutcome, QueryService, WriteOutcome};
pub use network::{file_url, ContentServer, TransferService};
pub use application::Application;
pub use cli::{CliArgs, Command, Config, SearchField};
