//! Content server
//!
//! Serves published files to other peers over HTTP under
//! `/<url_prefix>/<file name>`, plus a `/health` endpoint.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::ShareError;

/// HTTP server exposing this peer's published files
pub struct ContentServer {
    host_ip: String,
    port: u16,
    root_dir: PathBuf,
    url_prefix: String,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ContentServer {
    /// Create a server; nothing is bound until [`ContentServer::start`]
    pub fn new(host_ip: impl Into<String>, port: u16, root_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            port,
            root_dir: root_dir.into(),
            url_prefix: url_prefix.into().trim_matches('/').to_string(),
            local_addr: None,
            shutdown: None,
            task: None,
        }
    }

    /// Directory whose files are served
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Base URL other peers use to download from this server
    ///
    /// Uses the configured host and the bound port once started, so an
    /// ephemeral port is advertised correctly.
    pub fn base_url(&self) -> String {
        let port = self.local_addr.map(|a| a.port()).unwrap_or(self.port);
        if self.url_prefix.is_empty() {
            format!("http://{}:{}/", self.host_ip, port)
        } else {
            format!("http://{}:{}/{}/", self.host_ip, port, self.url_prefix)
        }
    }

    /// Build the HTTP routes
    pub fn router(&self) -> Router {
        let files = ServeDir::new(&self.root_dir);
        let router = Router::new().route("/health", get(health));
        let router = if self.url_prefix.is_empty() {
            router.fallback_service(files)
        } else {
            router.nest_service(&format!("/{}", self.url_prefix), files)
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// Bind and start serving in the background
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            warn!("Content server already running on {}", addr);
            return Ok(addr);
        }

        tokio::fs::create_dir_all(&self.root_dir).await.map_err(|e| {
            error!("Failed to create serve directory '{}': {}", self.root_dir.display(), e);
            ShareError::storage_error_full("Failed to create serve directory", self.root_dir.display().to_string(), e.to_string())
        })?;

        let bind = format!("{}:{}", self.host_ip, self.port);
        let listener = tokio::net::TcpListener::bind(&bind).await.map_err(|e| {
            error!("Failed to bind content server to {}: {}", bind, e);
            ShareError::network_error_full("Failed to bind content server", bind.clone(), e.to_string())
        })?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        let app = self.router();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("Content server terminated: {}", e);
            }
        });

        info!("Serving {} on http://{}/{}/", self.root_dir.display(), local_addr, self.url_prefix);
        self.local_addr = Some(local_addr);
        self.shutdown = Some(tx);
        self.task = Some(task);
        Ok(local_addr)
    }

    /// Stop serving and wait for the server task to finish
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Content server task failed: {}", e);
            }
            debug!("Content server stopped");
        }
        self.local_addr = None;
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_before_start() {
        let server = ContentServer::new("0.0.0.0", 8080, "http_root", "/download/");
        assert_eq!(server.base_url(), "http://0.0.0.0:8080/download/");
        assert!(!server.is_running());
    }

    #[test]
    fn test_base_url_without_prefix() {
        let server = ContentServer::new("10.0.0.5", 9000, "http_root", "");
        assert_eq!(server.base_url(), "http://10.0.0.5:9000/");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = ContentServer::new("127.0.0.1", 0, dir.path(), "download");
        let addr = server.start().await.unwrap();

        let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "status": "OK" }));

        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_serves_files_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![7u8; 4096];
        tokio::fs::write(dir.path().join("Pearl Jam - Go.mp3"), &body).await.unwrap();

        let mut server = ContentServer::new("127.0.0.1", 0, dir.path(), "download");
        server.start().await.unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));

        let url = format!("{}{}", server.base_url(), urlencoding::encode("Pearl Jam - Go.mp3"));
        let resp = reqwest::get(url).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap().to_str().unwrap(),
            "audio/mpeg"
        );
        assert_eq!(resp.bytes().await.unwrap().to_vec(), body);

        let missing = reqwest::get(format!("{}nope.mp3", server.base_url())).await.unwrap();
        assert_eq!(missing.status(), 404);

        server.stop().await;
    }
}
