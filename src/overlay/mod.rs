//! Overlay module
//!
//! The distributed key/value store is consumed only through the minimal
//! [`Overlay`] capability. Any conforming store can back the peer: the
//! in-process [`MemoryOverlay`] used by tests, or the [`DirectoryOverlay`]
//! shared by several peer processes on one host.

pub mod directory;
pub mod memory;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{trace, warn};

use crate::error::ShareError;

pub use directory::DirectoryOverlay;
pub use memory::MemoryOverlay;

/// Minimal key/value overlay contract
///
/// Keys and values are opaque bytes. The overlay gives best-effort eventual
/// storage with no atomicity across keys and last-writer-wins per key.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Look up a key; `Ok(None)` means the key is absent
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Store a value; `Ok(true)` means the overlay accepted the write
    async fn put(&self, key: &[u8], value: Bytes) -> Result<bool>;
}

/// Run [`Overlay::get`] bounded by `timeout`, keeping miss and failure apart
///
/// A timeout is reported as an error.
pub async fn try_get(overlay: &dyn Overlay, key: &[u8], timeout: Duration) -> Result<Option<Bytes>> {
    let value = tokio::time::timeout(timeout, overlay.get(key))
        .await
        .map_err(|_| {
            ShareError::overlay_error_full(
                format!("Get timed out after {:?}", timeout),
                String::from_utf8_lossy(key).to_string(),
                "timeout",
            )
        })??;
    trace!("Overlay get {} -> {}", String::from_utf8_lossy(key), if value.is_some() { "hit" } else { "miss" });
    Ok(value)
}

/// Run [`Overlay::get`] bounded by `timeout`
///
/// Errors and timeouts are logged and reported as an absent key.
pub async fn timed_get(overlay: &dyn Overlay, key: &[u8], timeout: Duration) -> Option<Bytes> {
    match try_get(overlay, key, timeout).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Overlay get failed for {}: {}", String::from_utf8_lossy(key), e);
            None
        }
    }
}

/// Run [`Overlay::put`] bounded by `timeout`
///
/// Errors and timeouts are logged and reported as a rejected write.
pub async fn timed_put(overlay: &dyn Overlay, key: &[u8], value: Bytes, timeout: Duration) -> bool {
    let printable = String::from_utf8_lossy(key);
    match tokio::time::timeout(timeout, overlay.put(key, value)).await {
        Ok(Ok(accepted)) => {
            if !accepted {
                warn!("Overlay rejected put for {}", printable);
            }
            accepted
        }
        Ok(Err(e)) => {
            warn!("Overlay put failed for {}: {}", printable, e);
            false
        }
        Err(_) => {
            warn!("Overlay put timed out after {:?} for {}", timeout, printable);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Overlay doubles for exercising failure paths

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps an overlay, counting puts and failing those whose key contains `fail_on`
    pub struct FlakyOverlay {
        pub inner: Arc<MemoryOverlay>,
        pub fail_on: Option<String>,
        pub puts: AtomicUsize,
    }

    impl FlakyOverlay {
        pub fn new(inner: Arc<MemoryOverlay>, fail_on: Option<&str>) -> Self {
            Self {
                inner,
                fail_on: fail_on.map(str::to_string),
                puts: AtomicUsize::new(0),
            }
        }

        pub fn put_count(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Overlay for FlakyOverlay {
        async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &[u8], value: Bytes) -> Result<bool> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if let Some(pattern) = &self.fail_on {
                if String::from_utf8_lossy(key).contains(pattern.as_str()) {
                    return Ok(false);
                }
            }
            self.inner.put(key, value).await
        }
    }

    /// Overlay whose calls never complete
    pub struct StalledOverlay;

    #[async_trait]
    impl Overlay for StalledOverlay {
        async fn get(&self, _key: &[u8]) -> Result<Option<Bytes>> {
            std::future::pending().await
        }

        async fn put(&self, _key: &[u8], _value: Bytes) -> Result<bool> {
            std::future::pending().await
        }
    }

    /// Overlay whose calls always error
    pub struct BrokenOverlay;

    #[async_trait]
    impl Overlay for BrokenOverlay {
        async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
            Err(crate::error::ShareError::overlay_error_full(
                "Overlay unreachable",
                String::from_utf8_lossy(key).to_string(),
                "test",
            )
            .into())
        }

        async fn put(&self, key: &[u8], _value: Bytes) -> Result<bool> {
            self.get(key).await.map(|_| false)
        }
    }
}
