//! Indexing service
//!
//! Publishes files into the overlay index.
//!
//! The first publisher of some bytes writes the metainfo record and one tag
//! record per metadata field. Later publishers of the same bytes only append
//! their provider URL to the record's `url-list`. That append is a plain
//! get/modify/put against the overlay: two peers publishing the same content
//! at the same moment can race and the losing URL is dropped. The overlay
//! offers no compare-and-swap, so this service does not pretend otherwise.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::content::{address, generate_tags, ContentId, FileMetadata, FileRecord, MetaInfo};
use crate::error::ShareError;
use crate::metadata::{normalize, MetadataExtractor};
use crate::overlay::{timed_put, try_get, Overlay};

/// Default bound on a single overlay call
pub const DEFAULT_OVERLAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one overlay write scheduled by a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Overlay key that was written
    pub key: String,
    /// Whether the overlay accepted the write
    pub succeeded: bool,
}

/// Result of publishing a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every scheduled write succeeded
    Published {
        cid: ContentId,
        writes: Vec<WriteOutcome>,
    },
    /// The provider was already listed for this content; nothing was written
    AlreadyPublished { cid: ContentId },
    /// At least one write failed, or the existing record could not be read.
    /// Successful writes are not rolled back.
    Failed {
        cid: ContentId,
        writes: Vec<WriteOutcome>,
    },
}

impl PublishOutcome {
    /// Content id of the published file
    pub fn cid(&self) -> ContentId {
        match self {
            PublishOutcome::Published { cid, .. }
            | PublishOutcome::AlreadyPublished { cid }
            | PublishOutcome::Failed { cid, .. } => *cid,
        }
    }

    /// True for `Published` and `AlreadyPublished`
    pub fn is_success(&self) -> bool {
        !matches!(self, PublishOutcome::Failed { .. })
    }

    /// Writes attempted by this publish
    pub fn writes(&self) -> &[WriteOutcome] {
        match self {
            PublishOutcome::Published { writes, .. } | PublishOutcome::Failed { writes, .. } => writes,
            PublishOutcome::AlreadyPublished { .. } => &[],
        }
    }
}

/// Publishes files into the overlay index
pub struct IndexingService {
    overlay: Arc<dyn Overlay>,
    extractor: Arc<dyn MetadataExtractor>,
    timeout: Duration,
}

impl IndexingService {
    /// Create a new indexing service
    pub fn new(overlay: Arc<dyn Overlay>, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self {
            overlay,
            extractor,
            timeout: DEFAULT_OVERLAY_TIMEOUT,
        }
    }

    /// Set the bound on each overlay call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Derive tag keys for metadata
    pub fn generate_tags(&self, metadata: &FileMetadata) -> Vec<String> {
        generate_tags(metadata)
    }

    /// Publish the file at `file_path` as served from `provider_url`
    ///
    /// Returns `Err` only when the local file cannot be read or the existing
    /// record cannot be decoded. Overlay failures are reported through
    /// [`PublishOutcome::Failed`].
    pub async fn publish(&self, file_path: &Path, provider_url: &str) -> Result<PublishOutcome> {
        info!("Publishing {} from {}", file_path.display(), provider_url);

        let data = tokio::fs::read(file_path).await.map_err(|e| {
            error!("Failed to read '{}': {}", file_path.display(), e);
            ShareError::storage_error_full("Failed to read file to publish", file_path.display().to_string(), e.to_string())
        })?;
        let cid = address(&data);
        debug!("Content id of {} ({} bytes): {}", file_path.display(), data.len(), cid);

        let existing = match try_get(self.overlay.as_ref(), &cid.overlay_key(), self.timeout).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Could not read existing metainfo for {}: {}", cid, e);
                return Ok(PublishOutcome::Failed { cid, writes: Vec::new() });
            }
        };

        let writes = match existing {
            None => self.first_publish(file_path, &data, cid, provider_url)?,
            Some(blob) => {
                let mut info = MetaInfo::decode(&blob).map_err(|e| {
                    error!("Existing metainfo for {} is corrupt: {}", cid, e);
                    ShareError::codec_error_with_source("Existing metainfo is undecodable", e.to_string())
                        .with_context(cid.to_hex())
                })?;

                if !info.add_provider(provider_url) {
                    info!("{} already published by {}", cid, provider_url);
                    return Ok(PublishOutcome::AlreadyPublished { cid });
                }

                debug!("Adding provider {} to {} ({} providers)", provider_url, cid, info.url_list().len());
                vec![(cid.to_hex(), Bytes::from(info.encode()?))]
            }
        };

        let outcomes = self.run_writes(writes).await;
        let failed = outcomes.iter().filter(|w| !w.succeeded).count();

        if failed == 0 {
            info!("Published {} ({} writes)", cid, outcomes.len());
            Ok(PublishOutcome::Published { cid, writes: outcomes })
        } else {
            warn!("Publish of {} incomplete: {}/{} writes failed", cid, failed, outcomes.len());
            Ok(PublishOutcome::Failed { cid, writes: outcomes })
        }
    }

    /// Build the metainfo and tag writes for content not yet in the index
    fn first_publish(
        &self,
        file_path: &Path,
        data: &[u8],
        cid: ContentId,
        provider_url: &str,
    ) -> Result<Vec<(String, Bytes)>> {
        let extracted = self.extractor.extract(file_path, data).unwrap_or_else(|e| {
            warn!("Metadata extraction failed for {}: {}", file_path.display(), e);
            FileMetadata::new()
        });
        let metadata = normalize(&extracted);

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ShareError::storage_error_with_path("Path has no file name", file_path.display().to_string()))?;

        let tags = self.generate_tags(&metadata);
        if tags.is_empty() {
            warn!("{} has no metadata; it will only be reachable by content id", name);
        }

        let info = MetaInfo::new(metadata, FileRecord::new(name, cid), provider_url);
        let mut writes = vec![(cid.to_hex(), Bytes::from(info.encode()?))];
        let cid_value = Bytes::from(cid.overlay_key());
        writes.extend(tags.into_iter().map(|tag| (tag, cid_value.clone())));
        Ok(writes)
    }

    /// Execute all writes concurrently and report each one
    async fn run_writes(&self, writes: Vec<(String, Bytes)>) -> Vec<WriteOutcome> {
        let overlay = self.overlay.as_ref();
        let timeout = self.timeout;
        join_all(writes.into_iter().map(|(key, value)| async move {
            let succeeded = timed_put(overlay, key.as_bytes(), value, timeout).await;
            WriteOutcome { key, succeeded }
        }))
        .await
    }
}
