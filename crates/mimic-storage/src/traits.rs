//! Record store abstraction
//!
//! This module defines the `Store` trait that all record backends must implement.

use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Keyed record store.
///
/// Each method is atomic with respect to a single record: `update` runs its
/// closure while holding exclusive access to that record, so a read-modify-write
/// cannot interleave with another writer on the same key.
#[async_trait]
pub trait Store<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Fetch a snapshot of the record stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<V>>;

    /// Insert or replace the record stored under `key`.
    async fn put(&self, key: &str, value: V) -> StorageResult<()>;

    /// Apply `apply` to the record under `key` in place.
    ///
    /// Returns `false` without calling `apply` when the key is absent.
    async fn update(
        &self,
        key: &str,
        apply: &mut (dyn for<'r> FnMut(&'r mut V) + Send),
    ) -> StorageResult<bool>;

    /// Remove and return the record under `key`.
    async fn delete(&self, key: &str) -> StorageResult<Option<V>>;

    /// Snapshot of every record, in no particular order.
    async fn scan(&self) -> StorageResult<Vec<(String, V)>>;

    /// Number of stored records.
    async fn len(&self) -> StorageResult<usize> {
        Ok(self.scan().await?.len())
    }
}
