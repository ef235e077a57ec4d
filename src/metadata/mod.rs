//! Metadata extraction module
//!
//! Produces the fixed-shape attribute map attached to a published file.

pub mod id3;

use std::path::Path;

use anyhow::Result;

use crate::content::FileMetadata;

pub use id3::Id3Extractor;

/// Searchable attribute names, in canonical order
pub const FIELDS: [&str; 4] = ["filename", "artist", "title", "album"];

/// Extracts metadata from a file's bytes
///
/// Implementations must not touch the overlay. An error means the file has
/// no usable tags; callers degrade to empty fields.
pub trait MetadataExtractor: Send + Sync {
    /// Extract attributes from `data`, the full contents of the file at `path`
    fn extract(&self, path: &Path, data: &[u8]) -> Result<FileMetadata>;
}

/// Reduce extracted metadata to the canonical fields
///
/// Missing fields become empty strings; attributes outside [`FIELDS`] are
/// dropped.
pub fn normalize(extracted: &FileMetadata) -> FileMetadata {
    FIELDS
        .iter()
        .map(|field| (*field, extracted.get(field).unwrap_or("").trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_and_orders() {
        let extracted = FileMetadata::new()
            .with("album", "Vs.")
            .with("genre", "Rock")
            .with("artist", " Pearl Jam ");

        let normalized = normalize(&extracted);
        let fields: Vec<(&str, &str)> = normalized.iter().collect();
        assert_eq!(
            fields,
            vec![("filename", ""), ("artist", "Pearl Jam"), ("title", ""), ("album", "Vs.")]
        );
    }

    #[test]
    fn test_normalize_empty() {
        let normalized = normalize(&FileMetadata::new());
        assert_eq!(normalized.len(), FIELDS.len());
        assert!(normalized.iter().all(|(_, v)| v.is_empty()));
    }
}
