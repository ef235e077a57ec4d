//! Content addressing module
//!
//! Content identifiers and the metainfo record stored under them.

pub mod id;
pub mod metainfo;

pub use id::{address, ContentHasher, ContentId};
pub use metainfo::{generate_tags, tag_key, FileMetadata, FileRecord, MetaInfo};
