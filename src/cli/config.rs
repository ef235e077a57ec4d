//! CLI configuration module
//!
//! Loads the peer configuration from a JSON file and applies CLI overrides.
//! Keys follow the upper-case style of the peer `config.json`; unknown keys
//! are ignored.

use crate::cli::args::CliArgs;
use crate::error::ShareError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Config {
    /// Directory holding files that can be shared
    pub content_dir: PathBuf,
    /// Address advertised to other peers and bound by the content server
    pub host_ip_address: String,
    /// Content server port
    pub host_port: u16,
    /// Directory the content server serves from
    pub host_root_dir: PathBuf,
    /// URL path prefix of served files
    pub host_url_prefix: String,
    /// Shared overlay store
    pub overlay_dir: PathBuf,
    /// Where downloads are written
    pub download_dir: PathBuf,
    /// Bound on each overlay call, in seconds
    pub overlay_timeout_secs: u64,
    /// Bound on connecting and on each stall of a transfer, in seconds
    pub transfer_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            host_ip_address: "0.0.0.0".to_string(),
            host_port: 8080,
            host_root_dir: PathBuf::from("http_root"),
            host_url_prefix: "download".to_string(),
            overlay_dir: PathBuf::from("overlay"),
            download_dir: PathBuf::from("downloads"),
            overlay_timeout_secs: 10,
            transfer_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let data = std::fs::read(path).map_err(|e| {
            ShareError::storage_error_full("Failed to read config file", path.display().to_string(), e.to_string())
        })?;
        let config: Config = serde_json::from_slice(&data).map_err(|e| {
            ShareError::config_error(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Create configuration from CLI arguments
    ///
    /// Starts from the config file if one was given, otherwise from the
    /// defaults, then applies every flag that was set.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = &args.content_dir {
            config.content_dir = dir.clone();
        }
        if let Some(host) = &args.host {
            config.host_ip_address = host.clone();
        }
        if let Some(port) = args.port {
            config.host_port = port;
        }
        if let Some(dir) = &args.overlay_dir {
            config.overlay_dir = dir.clone();
        }
        if let Some(dir) = &args.download_dir {
            config.download_dir = dir.clone();
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host_ip_address.trim().is_empty() {
            return Err(ShareError::config_error_with_field("Host address cannot be empty", "HOST_IP_ADDRESS").into());
        }

        if self.host_port == 0 {
            return Err(ShareError::config_error_with_field("Port must be non-zero", "HOST_PORT").into());
        }

        if self.host_url_prefix.trim_matches('/').is_empty() {
            return Err(ShareError::config_error_with_field("URL prefix cannot be empty", "HOST_URL_PREFIX").into());
        }

        if self.host_url_prefix.trim_matches('/').contains('/') {
            return Err(ShareError::config_error_with_field("URL prefix must be a single path segment", "HOST_URL_PREFIX").into());
        }

        for (field, dir) in [
            ("CONTENT_DIR", &self.content_dir),
            ("HOST_ROOT_DIR", &self.host_root_dir),
            ("OVERLAY_DIR", &self.overlay_dir),
            ("DOWNLOAD_DIR", &self.download_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ShareError::config_error_with_field("Directory cannot be empty", field).into());
            }
        }

        let served_dir = self.host_root_dir.join(self.host_url_prefix.trim_matches('/'));
        if resolve(&self.content_dir) == resolve(&served_dir) {
            return Err(ShareError::config_error_with_field(
                "Content directory cannot be the served directory",
                "CONTENT_DIR",
            )
            .into());
        }

        if self.overlay_timeout_secs == 0 {
            return Err(ShareError::config_error_with_field("Timeout must be at least 1 second", "OVERLAY_TIMEOUT_SECS").into());
        }

        if self.transfer_timeout_secs == 0 {
            return Err(ShareError::config_error_with_field("Timeout must be at least 1 second", "TRANSFER_TIMEOUT_SECS").into());
        }

        Ok(())
    }

    /// Get the listen address of the content server
    pub fn get_listen_addr(&self) -> String {
        format!("{}:{}", self.host_ip_address, self.host_port)
    }

    /// Bound on each overlay call
    pub fn overlay_timeout(&self) -> Duration {
        Duration::from_secs(self.overlay_timeout_secs)
    }

    /// Bound on connecting and on each stall of a transfer
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Canonical form of `path` when it exists, the path itself otherwise
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
