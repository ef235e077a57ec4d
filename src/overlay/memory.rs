//! In-memory overlay
//!
//! A single shared map. Several peers holding the same `Arc<MemoryOverlay>`
//! see one consistent index, which is what the multi-peer tests rely on.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::trace;

use crate::overlay::Overlay;

/// Overlay backed by a process-local map
#[derive(Debug, Default)]
pub struct MemoryOverlay {
    entries: RwLock<HashMap<Vec<u8>, Bytes>>,
}

impl MemoryOverlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the overlay holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All stored keys, lossily decoded and sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .map(|k| String::from_utf8_lossy(k).to_string())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Overlay for MemoryOverlay {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: Bytes) -> Result<bool> {
        trace!("Memory overlay put {} ({} bytes)", String::from_utf8_lossy(key), value.len());
        self.entries.write().await.insert(key.to_vec(), value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing() {
        let overlay = MemoryOverlay::new();
        assert!(overlay.get(b"nothing").await.unwrap().is_none());
        assert!(overlay.is_empty().await);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let overlay = MemoryOverlay::new();
        assert!(overlay.put(b"artist|Pearl Jam", Bytes::from_static(b"one")).await.unwrap());
        assert!(overlay.put(b"artist|Pearl Jam", Bytes::from_static(b"two")).await.unwrap());
        assert_eq!(overlay.get(b"artist|Pearl Jam").await.unwrap(), Some(Bytes::from_static(b"two")));
        assert_eq!(overlay.len().await, 1);
        assert_eq!(overlay.keys().await, vec!["artist|Pearl Jam".to_string()]);
    }
}
