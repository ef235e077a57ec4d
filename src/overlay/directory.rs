//! Directory-backed overlay
//!
//! Each key is stored as one file named after the SHA-1 digest of the key,
//! so entry names stay short whatever the key length.
//! Peer processes pointing at the same directory share one index. Writes go
//! through a temporary file and a rename, so readers never observe a
//! half-written value; there is still no atomicity across keys.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::fs;
use tracing::{debug, error, trace};

use crate::content::address;
use crate::error::ShareError;
use crate::overlay::Overlay;

/// Overlay backed by a shared directory
#[derive(Debug, Clone)]
pub struct DirectoryOverlay {
    root: PathBuf,
}

impl DirectoryOverlay {
    /// Open (and create if needed) an overlay directory
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            error!("Failed to create overlay directory '{}': {}", root.display(), e);
            ShareError::storage_error_full("Failed to create overlay directory", root.display().to_string(), e.to_string())
        })?;
        debug!("Opened directory overlay at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of the overlay
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &[u8]) -> PathBuf {
        self.root.join(format!("{}.val", entry_name(key)))
    }
}

#[async_trait]
impl Overlay for DirectoryOverlay {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let path = self.entry_path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShareError::overlay_error_full(
                "Failed to read overlay entry",
                String::from_utf8_lossy(key).to_string(),
                e.to_string(),
            )
            .into()),
        }
    }

    async fn put(&self, key: &[u8], value: Bytes) -> Result<bool> {
        let path = self.entry_path(key);
        let suffix: u64 = rand::thread_rng().gen();
        let tmp_path = self.root.join(format!(".{}.{:016x}.tmp", entry_name(key), suffix));

        if let Err(e) = fs::write(&tmp_path, &value).await {
            error!("Failed to write overlay entry '{}': {}", tmp_path.display(), e);
            return Ok(false);
        }
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            error!("Failed to commit overlay entry '{}': {}", path.display(), e);
            let _ = fs::remove_file(&tmp_path).await;
            return Ok(false);
        }

        trace!("Directory overlay put {} ({} bytes)", String::from_utf8_lossy(key), value.len());
        Ok(true)
    }
}

/// Fixed-length file name for a key
fn entry_name(key: &[u8]) -> String {
    address(key).to_hex()
}
