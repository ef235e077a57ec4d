//! Network module
//!
//! Moves file bytes between peers: serving published files and fetching
//! them from providers.

pub mod server;
pub mod transfer;

pub use server::ContentServer;
pub use transfer::{file_url, TransferService, CHUNK_SIZE, DEFAULT_TRANSFER_TIMEOUT};
