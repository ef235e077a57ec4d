//! Content identifier module
//!
//! Derives a stable identifier from a file's bytes.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Length of a content identifier in bytes (SHA-1, 160 bits)
pub const CONTENT_ID_LEN: usize = 20;

/// Identifier derived from the full byte content of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub [u8; CONTENT_ID_LEN]);

impl ContentId {
    /// Create a new ContentId from raw digest bytes
    pub fn new(id: [u8; CONTENT_ID_LEN]) -> Self {
        Self(id)
    }

    /// Get the ContentId as bytes
    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.0
    }

    /// Get the ContentId as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a ContentId from a hex string
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        hex::decode(hex_str.trim())
            .ok()
            .and_then(|bytes| Self::from_slice(&bytes))
    }

    /// Build a ContentId from a slice of exactly 20 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CONTENT_ID_LEN {
            return None;
        }
        let mut id = [0u8; CONTENT_ID_LEN];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    /// Overlay key under which the metainfo for this content is stored
    pub fn overlay_key(&self) -> Vec<u8> {
        self.to_hex().into_bytes()
    }

    /// Parse the value of a tag record back into a ContentId
    pub fn from_overlay_value(value: &[u8]) -> Option<Self> {
        std::str::from_utf8(value).ok().and_then(Self::from_hex)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

struct ContentIdVisitor;

impl<'de> Visitor<'de> for ContentIdVisitor {
    type Value = ContentId;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a {}-byte content id", CONTENT_ID_LEN)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        ContentId::from_slice(v).ok_or_else(|| E::invalid_length(v.len(), &self))
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(ContentIdVisitor)
    }
}

/// Compute the content identifier of a byte sequence
///
/// Pure and deterministic: identical bytes always yield the same id,
/// including the empty sequence.
pub fn address(bytes: &[u8]) -> ContentId {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Incremental hasher producing the same id as [`address`] for streamed data
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha1,
}

impl ContentHasher {
    /// Create a new hasher
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed a chunk of bytes
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Finish hashing and return the content id
    pub fn finalize(self) -> ContentId {
        ContentId(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic() {
        let data = b"Golden Earring - Radar Love";
        assert_eq!(address(data), address(data));
        assert_ne!(address(data), address(b"Pearl Jam - Go"));
    }

    #[test]
    fn test_address_matches_sha1() {
        // SHA-1 of the empty string
        assert_eq!(address(b"").to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(address(b"abc").to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_streaming_hasher_matches_address() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut hasher = ContentHasher::new();
        for chunk in data.chunks(777) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), address(&data));
    }

    #[test]
    fn test_hex_round_trip() {
        let id = address(b"some file");
        assert_eq!(ContentId::from_hex(&id.to_hex()), Some(id));
        assert_eq!(ContentId::from_hex("abcd"), None);
        assert_eq!(ContentId::from_hex("not hex"), None);
    }

    #[test]
    fn test_overlay_key_and_value() {
        let id = address(b"some file");
        let key = id.overlay_key();
        assert_eq!(key.len(), 40);
        assert_eq!(ContentId::from_overlay_value(&key), Some(id));
        assert_eq!(ContentId::from_overlay_value(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_bencode_serializes_as_byte_string() {
        let id = ContentId::new([7u8; 20]);
        let encoded = serde_bencode::to_bytes(&id).unwrap();
        assert!(encoded.starts_with(b"20:"));
        let decoded: ContentId = serde_bencode::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, id);
    }
}
