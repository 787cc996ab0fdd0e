//! Shared window store abstraction and its backends.

mod memory;
mod redis;

pub use self::memory::MemoryWindowStore;
pub use self::redis::RedisWindowStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::quota::WindowRecord;

/// Errors surfaced by a window store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation did not complete within the configured deadline
    #[error("store operation timed out")]
    Timeout,

    /// The store could not be reached or the connection failed mid-operation
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The stored record could not be decoded
    #[error("malformed window record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Abstraction over the shared store holding one window record per client.
///
/// This trait abstracts over the Redis-backed store and the in-memory store
/// so the quota engine can work with either. No quota logic lives behind it:
/// implementations only load and replace whole records.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Load the window record for a client identifier, if one exists.
    ///
    /// Absence is not an error; it means the client has no active window.
    async fn load(&self, client_id: &str) -> Result<Option<WindowRecord>, StoreError>;

    /// Replace the window record for a client identifier.
    async fn store(&self, client_id: &str, record: &WindowRecord) -> Result<(), StoreError>;

    /// Whether the store is currently reachable.
    async fn is_ready(&self) -> bool;
}
