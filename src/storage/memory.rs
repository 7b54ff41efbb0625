//! In-process storage.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::IndexStorage;
use crate::config::Config;
use crate::error::{PoseIndexError, Result, StorageError};
use crate::types::PoseRecord;

/// Storage that keeps both artifacts in memory.
///
/// Useful for embedding a prepared gallery without touching disk, and for
/// tests. Missing artifacts are reported with the same errors as
/// [`FileStorage`](super::FileStorage), using the configured file names as
/// paths.
#[derive(Debug)]
pub struct MemoryStorage {
    gallery: Mutex<Option<Vec<PoseRecord>>>,
    tree: Mutex<Option<Vec<u8>>>,
    gallery_name: PathBuf,
    tree_name: PathBuf,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new(config: &Config) -> Self {
        Self {
            gallery: Mutex::new(None),
            tree: Mutex::new(None),
            gallery_name: PathBuf::from(&config.gallery_file),
            tree_name: PathBuf::from(&config.tree_file),
        }
    }

    /// Creates storage pre-seeded with a gallery.
    pub fn with_gallery(config: &Config, records: Vec<PoseRecord>) -> Self {
        Self {
            gallery: Mutex::new(Some(records)),
            ..Self::new(config)
        }
    }

    fn slot<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
        mutex
            .lock()
            .map_err(|_| PoseIndexError::runtime("Memory storage lock poisoned"))
    }
}

impl IndexStorage for MemoryStorage {
    fn path(&self) -> Option<&Path> {
        None
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn load_gallery(&self) -> Result<Vec<PoseRecord>> {
        Self::slot(&self.gallery)?
            .clone()
            .ok_or_else(|| StorageError::GalleryNotFound(self.gallery_name.clone()).into())
    }

    fn save_gallery(&self, records: &[PoseRecord]) -> Result<()> {
        *Self::slot(&self.gallery)? = Some(records.to_vec());
        Ok(())
    }

    fn load_tree(&self) -> Result<Vec<u8>> {
        Self::slot(&self.tree)?
            .clone()
            .ok_or_else(|| PoseIndexError::IndexNotFound(self.tree_name.clone()))
    }

    fn save_tree(&self, bytes: &[u8]) -> Result<()> {
        *Self::slot(&self.tree)? = Some(bytes.to_vec());
        Ok(())
    }
}
