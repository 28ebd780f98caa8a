//! Mimic Storage Library
//!
//! Record stores for uploads, generation tasks, and conversations, plus the
//! on-disk store for uploaded and generated media files.
//!
//! Records live behind the [`Store`] trait (`get`, `put`, `update`, `delete`,
//! `scan`). [`MemoryStore`] is the process-memory backend; callers hold an
//! `Arc<dyn Store<V>>` so a persistent backend can replace it without changes.
//!
//! Media files are laid out as `{root}/{kind}/{id}{ext}` where `kind` is one of
//! `image`, `voice`, or `video`. Ids and extensions must not contain path
//! separators or `..`.

#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-local")]
pub use local::LocalFileStore;
pub use memory::MemoryStore;
pub use traits::{Store, StorageError, StorageResult};
