//! Peer application
//!
//! One running peer: configuration, overlay handle, services and content
//! server. Instances share nothing but the overlay they are given, so
//! several peers can live in one process.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::cli::Config;
use crate::content::{FileRecord, MetaInfo};
use crate::error::ShareError;
use crate::metadata::{Id3Extractor, MetadataExtractor};
use crate::network::{ContentServer, TransferService};
use crate::overlay::Overlay;
use crate::service::{IndexingService, PublishOutcome, QueryService};

/// A single peer instance
pub struct Application {
    config: Config,
    indexing: IndexingService,
    query: QueryService,
    transfer: TransferService,
    server: ContentServer,
    span: Span,
}

impl Application {
    /// Create a peer that extracts ID3 metadata
    pub fn new(config: Config, overlay: Arc<dyn Overlay>) -> Result<Self> {
        Self::with_extractor(config, overlay, Arc::new(Id3Extractor::new()))
    }

    /// Create a peer with a custom metadata extractor
    pub fn with_extractor(
        config: Config,
        overlay: Arc<dyn Overlay>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Self> {
        let span = info_span!("peer", host = %config.host_ip_address, port = config.host_port);
        let indexing = IndexingService::new(overlay.clone(), extractor).with_timeout(config.overlay_timeout());
        let query = QueryService::new(overlay).with_timeout(config.overlay_timeout());
        let transfer = TransferService::with_timeout(config.transfer_timeout())?;

        let prefix = config.host_url_prefix.trim_matches('/').to_string();
        let server = ContentServer::new(
            config.host_ip_address.clone(),
            config.host_port,
            config.host_root_dir.join(&prefix),
            prefix,
        );

        Ok(Self {
            config,
            indexing,
            query,
            transfer,
            server,
            span,
        })
    }

    /// Peer configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start serving published files
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let span = self.span.clone();
        let addr = self.server.start().instrument(span.clone()).await?;
        span.record("port", addr.port());
        span.in_scope(|| info!("Peer started on {}", addr));
        Ok(addr)
    }

    /// Stop serving
    pub async fn stop(&mut self) {
        let span = self.span.clone();
        self.server.stop().instrument(span.clone()).await;
        span.in_scope(|| info!("Peer stopped"));
    }

    /// Base URL this peer advertises in `url-list`
    ///
    /// Reflects the bound port once the peer is started.
    pub fn provider_url(&self) -> String {
        self.server.base_url()
    }

    /// Publish `name` from the content directory
    ///
    /// The file is exposed to the content server first, then indexed with
    /// this peer's provider URL.
    pub async fn publish(&self, name: &str) -> Result<PublishOutcome> {
        async {
            let source = self.content_path(name)?;
            let served = self.expose(name, &source).await?;
            self.indexing.publish(&served, &self.provider_url()).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Publish every regular file in the content directory
    ///
    /// Returns one entry per file; a file that fails locally is logged and
    /// reported as an error entry without stopping the others.
    pub async fn publish_all(&self) -> Result<Vec<(String, Result<PublishOutcome>)>> {
        let dir = &self.config.content_dir;
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            ShareError::storage_error_full("Failed to read content directory", dir.display().to_string(), e.to_string())
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.publish(&name).await;
            if let Err(e) = &outcome {
                warn!("Failed to publish {}: {}", name, e);
            }
            results.push((name, outcome));
        }
        Ok(results)
    }

    /// Search the index by one metadata field
    pub async fn search(&self, field: &str, term: &str) -> Option<MetaInfo> {
        self.query.query(field, term).instrument(self.span.clone()).await
    }

    /// Download files from providers into the download directory
    pub async fn download(&self, url_list: &[String], files: &[FileRecord]) -> HashMap<String, bool> {
        self.transfer
            .fetch(url_list, files, &self.config.download_dir)
            .instrument(self.span.clone())
            .await
    }

    /// Resolve `name` inside the content directory
    fn content_path(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        match candidate.file_name() {
            Some(base) if base == candidate.as_os_str() => Ok(self.config.content_dir.join(base)),
            _ => Err(ShareError::storage_error_with_path("Not a plain file name", name).into()),
        }
    }

    /// Place `source` under the served directory, returning the served path
    async fn expose(&self, name: &str, source: &Path) -> Result<PathBuf> {
        let meta = tokio::fs::metadata(source).await.map_err(|e| {
            ShareError::storage_error_full("Cannot publish missing file", source.display().to_string(), e.to_string())
        })?;
        if !meta.is_file() {
            return Err(ShareError::storage_error_with_path("Not a regular file", source.display().to_string()).into());
        }

        let root = self.server.root_dir();
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            ShareError::storage_error_full("Failed to create serve directory", root.display().to_string(), e.to_string())
        })?;

        let served = root.join(name);
        if same_file(source, &served).await {
            debug!("{} is already in the served directory", source.display());
            return Ok(served);
        }

        match tokio::fs::remove_file(&served).await {
            Ok(()) => debug!("Replacing served copy {}", served.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = tokio::fs::hard_link(source, &served).await {
            debug!("Hard link of {} failed ({}), copying", source.display(), e);
            tokio::fs::copy(source, &served).await.map_err(|e| {
                ShareError::storage_error_full("Failed to expose file", served.display().to_string(), e.to_string())
            })?;
        }
        Ok(served)
    }
}

/// True if both paths exist and resolve to the same file
async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
