//! Transfer service
//!
//! Downloads the files of a metainfo record from its providers. Providers
//! are tried one at a time in `url-list` order; the first complete transfer
//! whose bytes hash to the file's content id wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::content::{ContentHasher, FileRecord};
use crate::error::ShareError;

/// Default bound on connecting and on each stall during a transfer
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size used when writing downloaded bytes to disk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Build the download URL of `name` at a provider's base URL
pub fn file_url(base_url: &str, name: &str) -> Result<Url> {
    let joined = format!("{}{}", base_url, urlencoding::encode(name));
    Url::parse(&joined).map_err(|e| {
        ShareError::transfer_error_full("Invalid provider URL", base_url.to_string(), e.to_string()).into()
    })
}

/// Fetches files from providers over HTTP
///
/// `timeout` bounds connecting, waiting for the response headers and every
/// gap between body chunks. A transfer that keeps making progress is never
/// cut off, however large the file.
#[derive(Debug, Clone)]
pub struct TransferService {
    client: reqwest::Client,
    timeout: Duration,
}

impl TransferService {
    /// Create a transfer service with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TRANSFER_TIMEOUT)
    }

    /// Create a transfer service whose attempts stall out after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ShareError::network_error_full("Failed to build HTTP client", "-", e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Download every file, trying providers in order
    ///
    /// Returns one entry per file name: `true` if some provider delivered
    /// the complete file into `destination_dir`. Bytes are staged in a
    /// temporary file and only replace the destination once verified, so a
    /// failed file leaves whatever was already at its destination untouched.
    pub async fn fetch(
        &self,
        provider_urls: &[String],
        files: &[FileRecord],
        destination_dir: &Path,
    ) -> HashMap<String, bool> {
        info!(
            "Fetching {} file(s) from {} provider(s) into {}",
            files.len(),
            provider_urls.len(),
            destination_dir.display()
        );

        let mut results = HashMap::new();
        if let Err(e) = tokio::fs::create_dir_all(destination_dir).await {
            error!("Failed to create destination '{}': {}", destination_dir.display(), e);
            for file in files {
                results.insert(file.name.clone(), false);
            }
            return results;
        }

        for file in files {
            let ok = self.fetch_file(provider_urls, file, destination_dir).await;
            results.insert(file.name.clone(), ok);
        }
        results
    }

    async fn fetch_file(&self, provider_urls: &[String], file: &FileRecord, destination_dir: &Path) -> bool {
        let dest = match destination_path(destination_dir, &file.name) {
            Some(dest) => dest,
            None => {
                warn!("Refusing to download unsafe file name {:?}", file.name);
                return false;
            }
        };
        let suffix: u64 = rand::thread_rng().gen();
        let staging = destination_dir.join(format!(".{}.{:016x}.part", file.cid, suffix));

        let mut delivered = false;
        for (i, provider) in provider_urls.iter().enumerate() {
            debug!("Trying provider {}/{} for {}: {}", i + 1, provider_urls.len(), file.name, provider);
            match self.attempt(provider, file, &staging).await {
                Ok(bytes) => match tokio::fs::rename(&staging, &dest).await {
                    Ok(()) => {
                        info!("Downloaded {} ({} bytes) from {}", file.name, bytes, provider);
                        delivered = true;
                        break;
                    }
                    Err(e) => {
                        error!("Failed to move {} into place at {}: {}", file.name, dest.display(), e);
                        break;
                    }
                },
                Err(e) => {
                    warn!("Provider {} failed for {}: {}", provider, file.name, e);
                }
            }
        }

        if !delivered {
            error!("All {} provider(s) failed for {}", provider_urls.len(), file.name);
            match tokio::fs::remove_file(&staging).await {
                Ok(()) => debug!("Removed partial download {}", staging.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove partial download {}: {}", staging.display(), e),
            }
        }
        delivered
    }

    /// One attempt against one provider, writing into `staging`
    ///
    /// Returns the number of bytes written.
    async fn attempt(&self, provider: &str, file: &FileRecord, staging: &Path) -> Result<u64> {
        let url = file_url(provider, &file.name)?;
        let mut response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                ShareError::transfer_error_with_provider(format!("No response within {:?}", self.timeout), provider)
            })?
            .map_err(ShareError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShareError::transfer_error_with_provider(format!("Unexpected status {}", status), provider).into());
        }
        let expected_len = response.content_length();

        let handle = File::create(staging).await.map_err(|e| {
            ShareError::storage_error_full("Failed to open destination", staging.display().to_string(), e.to_string())
        })?;
        let mut out = BufWriter::with_capacity(CHUNK_SIZE, handle);
        let mut hasher = ContentHasher::new();
        let mut written = 0u64;

        loop {
            let chunk = tokio::time::timeout(self.timeout, response.chunk())
                .await
                .map_err(|_| {
                    ShareError::transfer_error_with_provider(
                        format!("Transfer stalled for {:?} after {} bytes", self.timeout, written),
                        provider,
                    )
                })?
                .map_err(ShareError::from)?;
            let Some(chunk) = chunk else { break };
            trace!("Received {} bytes of {}", chunk.len(), file.name);
            hasher.update(&chunk);
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        drop(out);

        if let Some(expected) = expected_len {
            if written != expected {
                return Err(ShareError::transfer_error_with_provider(
                    format!("Truncated transfer: {} of {} bytes", written, expected),
                    provider,
                )
                .into());
            }
        }

        let cid = hasher.finalize();
        if cid != file.cid {
            return Err(ShareError::transfer_error_with_provider(
                format!("Content id mismatch: expected {}, got {}", file.cid, cid),
                provider,
            )
            .into());
        }

        Ok(written)
    }
}

/// Resolve the destination of `name`, rejecting anything but a plain file name
fn destination_path(destination_dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    match candidate.file_name() {
        Some(base) if base == candidate.as_os_str() => Some(destination_dir.join(base)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::address;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BAD_URL: &str = "http://127.0.0.1:1/download/";

    fn service() -> TransferService {
        TransferService::with_timeout(Duration::from_secs(5)).unwrap()
    }

    async fn provider_with(name_path: &str, body: &[u8]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(name_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_file_url_encodes_name() {
        let url = file_url("http://0.0.0.0:8080/download/", "Pearl Jam - Go.mp3").unwrap();
        assert_eq!(url.as_str(), "http://0.0.0.0:8080/download/Pearl%20Jam%20-%20Go.mp3");
        assert!(file_url("not a url/", "x").is_err());
    }

    #[test]
    fn test_destination_path_rejects_traversal() {
        let dir = Path::new("/tmp/downloads");
        assert_eq!(destination_path(dir, "song.mp3"), Some(dir.join("song.mp3")));
        assert_eq!(destination_path(dir, "../etc/passwd"), None);
        assert_eq!(destination_path(dir, "a/b.mp3"), None);
        assert_eq!(destination_path(dir, ""), None);
    }

    #[tokio::test]
    async fn test_failover_to_second_provider() {
        let body = vec![42u8; 200_000];
        let good = provider_with("/download/Radar%20Love.mp3", &body).await;
        let dir = tempfile::tempdir().unwrap();

        let providers = vec![BAD_URL.to_string(), format!("{}/download/", good.uri())];
        let files = vec![FileRecord::new("Radar Love.mp3", address(&body))];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("Radar Love.mp3"), Some(&true));
        let written = tokio::fs::metadata(dir.path().join("Radar Love.mp3")).await.unwrap();
        assert_eq!(written.len(), body.len() as u64);
    }

    #[tokio::test]
    async fn test_all_providers_fail_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let providers = vec![BAD_URL.to_string()];
        let files = vec![FileRecord::new("go.mp3", address(b"go"))];

        let results = service().fetch(&providers, &files, dir.path()).await;
        assert_eq!(results.get("go.mp3"), Some(&false));
        assert!(!dir.path().join("go.mp3").exists());
    }

    #[tokio::test]
    async fn test_non_success_status_moves_on() {
        let missing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&missing)
            .await;
        let good = provider_with("/files/go.mp3", b"go bytes").await;
        let dir = tempfile::tempdir().unwrap();

        let providers = vec![format!("{}/files/", missing.uri()), format!("{}/files/", good.uri())];
        let files = vec![FileRecord::new("go.mp3", address(b"go bytes"))];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("go.mp3"), Some(&true));
        assert_eq!(tokio::fs::read(dir.path().join("go.mp3")).await.unwrap(), b"go bytes");
    }

    #[tokio::test]
    async fn test_wrong_content_is_rejected_and_removed() {
        let liar = provider_with("/download/go.mp3", b"something else").await;
        let dir = tempfile::tempdir().unwrap();

        let providers = vec![format!("{}/download/", liar.uri())];
        let files = vec![FileRecord::new("go.mp3", address(b"go bytes"))];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("go.mp3"), Some(&false));
        assert!(!dir.path().join("go.mp3").exists());
    }

    #[tokio::test]
    async fn test_files_are_independent() {
        let server = provider_with("/download/a.mp3", b"aaa").await;
        let dir = tempfile::tempdir().unwrap();

        let providers = vec![format!("{}/download/", server.uri())];
        let files = vec![
            FileRecord::new("a.mp3", address(b"aaa")),
            FileRecord::new("b.mp3", address(b"bbb")),
        ];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("a.mp3"), Some(&true));
        assert_eq!(results.get("b.mp3"), Some(&false));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"late".to_vec()).set_delay(Duration::from_secs(5)))
            .mount(&slow)
            .await;
        let good = provider_with("/d/x.mp3", b"late").await;
        let dir = tempfile::tempdir().unwrap();

        let service = TransferService::with_timeout(Duration::from_millis(200)).unwrap();
        let providers = vec![format!("{}/d/", slow.uri()), format!("{}/d/", good.uri())];
        let files = vec![FileRecord::new("x.mp3", address(b"late"))];
        let results = service.fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("x.mp3"), Some(&true));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("go.mp3"), b"go bytes").await.unwrap();

        let providers = vec![BAD_URL.to_string()];
        let files = vec![FileRecord::new("go.mp3", address(b"go bytes"))];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("go.mp3"), Some(&false));
        assert_eq!(tokio::fs::read(dir.path().join("go.mp3")).await.unwrap(), b"go bytes");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_content_keeps_existing_file() {
        let liar = provider_with("/download/go.mp3", b"something else").await;
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("go.mp3"), b"earlier download").await.unwrap();

        let providers = vec![format!("{}/download/", liar.uri())];
        let files = vec![FileRecord::new("go.mp3", address(b"go bytes"))];
        let results = service().fetch(&providers, &files, dir.path()).await;

        assert_eq!(results.get("go.mp3"), Some(&false));
        assert_eq!(tokio::fs::read(dir.path().join("go.mp3")).await.unwrap(), b"earlier download");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    /// Serve `chunks` pieces of 1000 bytes, one every 100 ms
    async fn trickle_server(chunks: u8) -> String {
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/d/:name",
            get(move || async move {
                let stream = futures::stream::unfold(0u8, move |i| async move {
                    if i == chunks {
                        return None;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Some((Ok::<_, std::io::Error>(bytes::Bytes::from(vec![i; 1000])), i + 1))
                });
                axum::body::Body::from_stream(stream)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/d/", addr)
    }

    #[tokio::test]
    async fn test_steady_transfer_outlasting_timeout() {
        let body: Vec<u8> = (0..6u8).flat_map(|i| vec![i; 1000]).collect();
        let provider = trickle_server(6).await;
        let dir = tempfile::tempdir().unwrap();

        let service = TransferService::with_timeout(Duration::from_millis(350)).unwrap();
        let files = vec![FileRecord::new("long.mp3", address(&body))];
        let results = service.fetch(&[provider], &files, dir.path()).await;

        assert_eq!(results.get("long.mp3"), Some(&true));
        assert_eq!(tokio::fs::read(dir.path().join("long.mp3")).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![FileRecord::new("a.mp3", address(b"a"))];
        let results = service().fetch(&[], &files, dir.path()).await;
        assert_eq!(results.get("a.mp3"), Some(&false));
    }
}
