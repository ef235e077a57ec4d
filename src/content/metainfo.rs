//! Metainfo record module
//!
//! The record stored in the overlay under a content id, its tag keys and
//! its canonical bencode encoding.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::content::id::ContentId;
use crate::error::ShareError;

/// Separator between field and term in a tag key
pub const TAG_SEPARATOR: char = '|';

/// Ordered attribute map extracted from a file
///
/// Stored as a list of `(name, value)` pairs so the insertion order
/// survives encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMetadata {
    fields: Vec<(String, String)>,
}

impl FileMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, keeping its original position if it already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Builder-style variant of [`FileMetadata::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FileMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = FileMetadata::new();
        for (name, value) in iter {
            metadata.insert(name, value);
        }
        metadata
    }
}

/// One physical file belonging to a published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File name as served by providers
    pub name: String,
    /// Content id of the file's bytes
    pub cid: ContentId,
}

impl FileRecord {
    /// Create a new file record
    pub fn new(name: impl Into<String>, cid: ContentId) -> Self {
        Self {
            name: name.into(),
            cid,
        }
    }
}

/// Record stored under a content id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Metadata extracted by the first publisher
    pub metadata: FileMetadata,
    /// Files in this release, in insertion order
    pub files: Vec<FileRecord>,
    /// Provider base URLs, insertion ordered and free of duplicates
    #[serde(rename = "url-list")]
    url_list: Vec<String>,
}

impl MetaInfo {
    /// Create a record for the first publisher of some content
    pub fn new(metadata: FileMetadata, file: FileRecord, provider_url: impl Into<String>) -> Self {
        Self {
            metadata,
            files: vec![file],
            url_list: vec![provider_url.into()],
        }
    }

    /// Provider base URLs in the order they were added
    pub fn url_list(&self) -> &[String] {
        &self.url_list
    }

    /// Check if a provider is already listed
    pub fn has_provider(&self, provider_url: &str) -> bool {
        self.url_list.iter().any(|u| u == provider_url)
    }

    /// Append a provider URL if absent
    ///
    /// Returns `true` if the list changed.
    pub fn add_provider(&mut self, provider_url: impl Into<String>) -> bool {
        let provider_url = provider_url.into();
        if self.has_provider(&provider_url) {
            trace!("Provider {} already listed, skipping", provider_url);
            return false;
        }
        self.url_list.push(provider_url);
        true
    }

    /// Encode to the canonical bencode representation
    pub fn encode(&self) -> Result<Vec<u8>> {
        let data = serde_bencode::to_bytes(self).map_err(|e| {
            ShareError::codec_error_with_source("Failed to encode metainfo", e.to_string())
        })?;
        trace!("Encoded metainfo ({} bytes)", data.len());
        Ok(data)
    }

    /// Decode from bencode
    ///
    /// Records without files are rejected. Duplicate provider URLs written
    /// by other peers are dropped, keeping the first occurrence.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut info: MetaInfo = serde_bencode::from_bytes(data).map_err(|e| {
            ShareError::codec_error_with_source("Failed to decode metainfo", e.to_string())
        })?;

        if info.files.is_empty() {
            return Err(ShareError::codec_error("Metainfo has no files").into());
        }

        let before = info.url_list.len();
        let mut seen = Vec::with_capacity(before);
        info.url_list.retain(|url| {
            if seen.contains(url) {
                false
            } else {
                seen.push(url.clone());
                true
            }
        });
        if info.url_list.len() != before {
            debug!("Dropped {} duplicate provider URLs while decoding", before - info.url_list.len());
        }

        Ok(info)
    }
}

/// Build the overlay key for a `(field, term)` pair
pub fn tag_key(field: &str, term: &str) -> String {
    format!("{}{}{}", field, TAG_SEPARATOR, term)
}

/// Derive tag keys from metadata, in field order
///
/// Fields with empty values produce no tag.
pub fn generate_tags(metadata: &FileMetadata) -> Vec<String> {
    metadata
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(field, value)| tag_key(field, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::id::address;

    fn sample_metadata() -> FileMetadata {
        FileMetadata::new()
            .with("filename", "Pearl Jam - Go.mp3")
            .with("album", "Vs.")
            .with("artist", "Pearl Jam")
            .with("title", "Go")
    }

    #[test]
    fn test_generate_tags_keeps_field_order() {
        let tags = generate_tags(&sample_metadata());
        assert_eq!(
            tags,
            vec![
                "filename|Pearl Jam - Go.mp3",
                "album|Vs.",
                "artist|Pearl Jam",
                "title|Go",
            ]
        );
    }

    #[test]
    fn test_generate_tags_two_fields() {
        let metadata = FileMetadata::new()
            .with("artist", "Golden Earring")
            .with("title", "Radar Love");
        assert_eq!(
            generate_tags(&metadata),
            vec!["artist|Golden Earring", "title|Radar Love"]
        );
    }

    #[test]
    fn test_generate_tags_skips_empty_values() {
        let metadata = FileMetadata::new()
            .with("filename", "")
            .with("artist", "")
            .with("title", "Untitled");
        assert_eq!(generate_tags(&metadata), vec!["title|Untitled"]);
        assert!(generate_tags(&FileMetadata::new()).is_empty());
    }

    #[test]
    fn test_metadata_insert_replaces_in_place() {
        let mut metadata = sample_metadata();
        metadata.insert("album", "Vs. (Remastered)");
        assert_eq!(metadata.len(), 4);
        assert_eq!(metadata.get("album"), Some("Vs. (Remastered)"));
        assert_eq!(metadata.iter().nth(1), Some(("album", "Vs. (Remastered)")));
    }

    #[test]
    fn test_add_provider_suppresses_duplicates() {
        let cid = address(b"go");
        let mut info = MetaInfo::new(sample_metadata(), FileRecord::new("Pearl Jam - Go.mp3", cid), "http://a/");
        assert!(!info.add_provider("http://a/"));
        assert!(info.add_provider("http://b/"));
        assert!(!info.add_provider("http://b/"));
        assert_eq!(info.url_list(), &["http://a/".to_string(), "http://b/".to_string()]);
    }

    #[test]
    fn test_encoding_round_trip_preserves_order() {
        let cid = address(b"radar love");
        let mut info = MetaInfo::new(
            sample_metadata(),
            FileRecord::new("Golden Earring - Radar Love.mp3", cid),
            "http://10.0.0.3:8082/download/",
        );
        info.add_provider("http://10.0.0.1:8080/download/");
        info.add_provider("http://10.0.0.2:8081/download/");
        info.files.push(FileRecord::new("bonus.mp3", address(b"bonus")));

        let decoded = MetaInfo::decode(&info.encode().unwrap()).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.url_list()[0], "http://10.0.0.3:8082/download/");
        assert_eq!(decoded.files[1].name, "bonus.mp3");
        assert_eq!(decoded.metadata.iter().next(), Some(("filename", "Pearl Jam - Go.mp3")));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let cid = address(b"go");
        let info = MetaInfo::new(sample_metadata(), FileRecord::new("Pearl Jam - Go.mp3", cid), "http://a/");
        assert_eq!(info.encode().unwrap(), info.clone().encode().unwrap());
    }

    #[test]
    fn test_decode_drops_foreign_duplicates() {
        let cid = address(b"go");
        let info = MetaInfo {
            metadata: FileMetadata::new(),
            files: vec![FileRecord::new("go.mp3", cid)],
            url_list: vec!["http://a/".into(), "http://b/".into(), "http://a/".into()],
        };
        let decoded = MetaInfo::decode(&info.encode().unwrap()).unwrap();
        assert_eq!(decoded.url_list(), &["http://a/".to_string(), "http://b/".to_string()]);
    }

    #[test]
    fn test_decode_rejects_empty_files() {
        let info = MetaInfo {
            metadata: FileMetadata::new(),
            files: Vec::new(),
            url_list: vec!["http://a/".into()],
        };
        assert!(MetaInfo::decode(&info.encode().unwrap()).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(MetaInfo::decode(b"this is not bencode").is_err());
        assert!(MetaInfo::decode(b"").is_err());
    }
}
