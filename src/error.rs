//! Error types for the file sharing peer
//!
//! This module defines the error type shared by the overlay, indexing,
//! query and transfer components.

use std::fmt;

/// Error type for file sharing operations
#[derive(Debug, Clone)]
pub enum ShareError {
    /// Metainfo encoding/decoding errors
    CodecError {
        message: String,
        source: Option<String>,
    },

    /// Key/value overlay errors
    OverlayError {
        message: String,
        key: Option<String>,
        source: Option<String>,
    },

    /// File I/O and storage errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Byte transfer errors against a single provider
    TransferError {
        message: String,
        provider: Option<String>,
        source: Option<String>,
    },

    /// Metadata extraction errors
    MetadataError {
        message: String,
        path: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Network errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },
}

impl ShareError {
    /// Create a new CodecError
    pub fn codec_error(message: impl Into<String>) -> Self {
        ShareError::CodecError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new CodecError with source
    pub fn codec_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::CodecError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new OverlayError
    pub fn overlay_error(message: impl Into<String>) -> Self {
        ShareError::OverlayError {
            message: message.into(),
            key: None,
            source: None,
        }
    }

    /// Create a new OverlayError with key and source
    pub fn overlay_error_full(message: impl Into<String>, key: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::OverlayError {
            message: message.into(),
            key: Some(key.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new StorageError
    pub fn storage_error(message: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new StorageError with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new TransferError
    pub fn transfer_error(message: impl Into<String>) -> Self {
        ShareError::TransferError {
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Create a new TransferError with provider
    pub fn transfer_error_with_provider(message: impl Into<String>, provider: impl Into<String>) -> Self {
        ShareError::TransferError {
            message: message.into(),
            provider: Some(provider.into()),
            source: None,
        }
    }

    /// Create a new TransferError with provider and source
    pub fn transfer_error_full(message: impl Into<String>, provider: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::TransferError {
            message: message.into(),
            provider: Some(provider.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new MetadataError with path
    pub fn metadata_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        ShareError::MetadataError {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        ShareError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        ShareError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        ShareError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            ShareError::CodecError { source, .. }
            | ShareError::OverlayError { source, .. }
            | ShareError::StorageError { source, .. }
            | ShareError::TransferError { source, .. }
            | ShareError::NetworkError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::CodecError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Codec error: {} (source: {})", message, src)
                } else {
                    write!(f, "Codec error: {}", message)
                }
            }
            ShareError::OverlayError { message, key, source } => {
                match (key, source) {
                    (Some(k), Some(s)) => write!(f, "Overlay error: {} (key: {}, source: {})", message, k, s),
                    (Some(k), None) => write!(f, "Overlay error: {} (key: {})", message, k),
                    (None, Some(s)) => write!(f, "Overlay error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Overlay error: {}", message),
                }
            }
            ShareError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            ShareError::TransferError { message, provider, source } => {
                match (provider, source) {
                    (Some(p), Some(s)) => write!(f, "Transfer error: {} (provider: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Transfer error: {} (provider: {})", message, p),
                    (None, Some(s)) => write!(f, "Transfer error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Transfer error: {}", message),
                }
            }
            ShareError::MetadataError { message, path } => {
                if let Some(p) = path {
                    write!(f, "Metadata error: {} (path: {})", message, p)
                } else {
                    write!(f, "Metadata error: {}", message)
                }
            }
            ShareError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            ShareError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
        }
    }
}

impl std::error::Error for ShareError {}

// Implement From traits for common error types

impl From<std::io::Error> for ShareError {
    fn from(err: std::io::Error) -> Self {
        ShareError::storage_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_bencode::Error> for ShareError {
    fn from(err: serde_bencode::Error) -> Self {
        ShareError::codec_error_with_source("Failed to process bencode data", err.to_string())
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(err: serde_json::Error) -> Self {
        ShareError::config_error(format!("Failed to parse JSON data: {}", err))
    }
}

impl From<reqwest::Error> for ShareError {
    fn from(err: reqwest::Error) -> Self {
        let provider = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
        ShareError::transfer_error_full("HTTP request failed", provider, err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ShareError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        ShareError::network_error("Operation timed out")
    }
}
