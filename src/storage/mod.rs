//! Storage layer abstractions for the pose index.
//!
//! The index persists two artifacts, the gallery and the tree skeleton,
//! behind a trait so the service does not care where they live.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PoseIndex                               │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │    IndexStorage     │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                    ▲         ▲                              │
//! │                    │         │                              │
//! │         ┌─────────┴─┐   ┌───┴───────────┐                  │
//! │         │FileStorage│   │ MemoryStorage │                  │
//! │         └───────────┘   └───────────────┘                  │
//! │           (prod)          (embedded/test)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage moves bytes and records; it does not validate galleries or
//! decode trees. That happens in the service, against the configured
//! joint count and metric.

pub mod file;
pub mod memory;
pub mod schema;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use schema::{TREE_FORMAT_VERSION, TREE_MAGIC};

use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::types::PoseRecord;

/// Storage backend trait for the pose index.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The service serializes its own
/// writes; implementations only need to protect against other processes
/// (or other handles) touching the same artifacts.
///
/// # Example
///
/// ```rust,ignore
/// use posemirror::storage::{IndexStorage, FileStorage};
///
/// let storage = FileStorage::open("./gallery", &config)?;
/// let records = storage.load_gallery()?;
/// println!("{} reference poses", records.len());
/// ```
pub trait IndexStorage: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the storage directory, if applicable.
    ///
    /// In-memory implementations have no path.
    fn path(&self) -> Option<&Path>;

    /// Releases the backend.
    ///
    /// Every write is complete when its call returns, so there is nothing
    /// to flush; this exists so backends with buffered state can report
    /// failures.
    fn close(self: Box<Self>) -> Result<()>;

    // =========================================================================
    // Gallery
    // =========================================================================

    /// Reads every gallery record in stored order.
    ///
    /// # Errors
    ///
    /// - `StorageError::GalleryNotFound` if no gallery has been stored
    /// - `StorageError::Corrupted` if the stored gallery cannot be parsed
    /// - `StorageError::Io` on read failure
    fn load_gallery(&self) -> Result<Vec<PoseRecord>>;

    /// Replaces the stored gallery wholesale.
    ///
    /// # Errors
    ///
    /// - `StorageError::StorageLocked` if another writer holds the lock
    /// - `StorageError::Io` on write failure
    fn save_gallery(&self, records: &[PoseRecord]) -> Result<()>;

    // =========================================================================
    // Tree
    // =========================================================================

    /// Reads the encoded tree.
    ///
    /// # Errors
    ///
    /// - `PoseIndexError::IndexNotFound` if no tree has been stored
    /// - `StorageError::Corrupted` if the file exceeds the configured size cap
    /// - `StorageError::Io` on read failure
    fn load_tree(&self) -> Result<Vec<u8>>;

    /// Replaces the stored tree.
    ///
    /// # Errors
    ///
    /// - `StorageError::StorageLocked` if another writer holds the lock
    /// - `StorageError::Io` on write failure
    fn save_tree(&self, bytes: &[u8]) -> Result<()>;
}

/// Opens file-backed storage in the given directory.
///
/// This is a convenience function that creates a [`FileStorage`] instance.
/// The directory is created on the first write, not here.
///
/// # Errors
///
/// Returns an error if `dir` exists but is not a directory.
pub fn open_storage(dir: impl AsRef<Path>, config: &Config) -> Result<Box<dyn IndexStorage>> {
    let storage = FileStorage::open(dir, config)?;
    Ok(Box::new(storage))
}
