//! Query service
//!
//! Resolves a `(field, term)` search into a metainfo record with two overlay
//! lookups: the tag record gives a content id, the content id gives the
//! record. Tag keys are last-writer-wins, so a term resolves to at most one
//! record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::content::{tag_key, ContentId, MetaInfo};
use crate::overlay::{timed_get, Overlay};
use crate::service::indexing::DEFAULT_OVERLAY_TIMEOUT;

/// Searches the overlay index
pub struct QueryService {
    overlay: Arc<dyn Overlay>,
    timeout: Duration,
}

impl QueryService {
    /// Create a new query service
    pub fn new(overlay: Arc<dyn Overlay>) -> Self {
        Self {
            overlay,
            timeout: DEFAULT_OVERLAY_TIMEOUT,
        }
    }

    /// Set the bound on each overlay call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Look up the record published under `field = term`
    ///
    /// `None` is the normal answer for unknown terms. Overlay failures and
    /// dangling or undecodable records are also reported as `None`.
    pub async fn query(&self, field: &str, term: &str) -> Option<MetaInfo> {
        let key = tag_key(field, term);
        debug!("Querying {}", key);

        let tag_value = match timed_get(self.overlay.as_ref(), key.as_bytes(), self.timeout).await {
            Some(value) => value,
            None => {
                info!("No results for {}", key);
                return None;
            }
        };

        let cid = match ContentId::from_overlay_value(&tag_value) {
            Some(cid) => cid,
            None => {
                warn!("Tag {} holds an invalid content id", key);
                return None;
            }
        };

        let blob = match timed_get(self.overlay.as_ref(), &cid.overlay_key(), self.timeout).await {
            Some(blob) => blob,
            None => {
                warn!("Tag {} points at {} but no metainfo was found", key, cid);
                return None;
            }
        };

        match MetaInfo::decode(&blob) {
            Ok(info) => {
                info!("{} resolved to {} ({} providers)", key, cid, info.url_list().len());
                Some(info)
            }
            Err(e) => {
                warn!("Metainfo for {} is undecodable: {}", cid, e);
                None
            }
        }
    }
}
