//! File-backed storage.
//!
//! # File Layout
//!
//! Opening storage at `./gallery` uses:
//! - `./gallery/posedata.json` - Gallery records (JSON array)
//! - `./gallery/prebuild-vptree.bin` - Encoded tree skeleton
//! - `./gallery/.posemirror.lock` - Advisory lock taken for each write
//!
//! Writes go to a hidden temporary file in the same directory and are
//! renamed over the target, so readers see either the old or the new
//! artifact in full.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use super::schema::LOCK_FILE;
use super::IndexStorage;
use crate::config::{Config, SyncMode};
use crate::error::{PoseIndexError, Result, StorageError};
use crate::types::PoseRecord;

/// Storage over a directory of plain files.
///
/// # Thread Safety
///
/// `FileStorage` is `Send + Sync` and holds no open handles between calls.
/// Each write takes an exclusive advisory lock on the lock file; a write
/// that finds the lock held fails with `StorageError::StorageLocked`
/// instead of waiting.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    gallery_path: PathBuf,
    tree_path: PathBuf,
    sync_mode: SyncMode,
    max_tree_file_bytes: u64,
}

/// Held for the duration of one write.
struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl FileStorage {
    /// Opens storage rooted at `dir`.
    ///
    /// Nothing is read or created; the directory is created on first write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if `dir` exists and is not a directory.
    #[instrument(skip(dir, config), fields(path = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if dir.exists() && !dir.is_dir() {
            return Err(StorageError::io(
                dir,
                io::Error::other("storage path is not a directory"),
            )
            .into());
        }

        debug!(exists = dir.exists(), "Opening file storage");

        Ok(Self {
            gallery_path: dir.join(&config.gallery_file),
            tree_path: dir.join(&config.tree_file),
            dir,
            sync_mode: config.sync_mode,
            max_tree_file_bytes: config.max_tree_file_bytes,
        })
    }

    /// Full path of the gallery file.
    pub fn gallery_path(&self) -> &Path {
        &self.gallery_path
    }

    /// Full path of the tree file.
    pub fn tree_path(&self) -> &Path {
        &self.tree_path
    }

    fn lock(&self) -> Result<WriterLock> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(WriterLock { file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                warn!("Storage directory locked by another writer");
                Err(StorageError::StorageLocked.into())
            }
            Err(e) => Err(StorageError::io(&path, e).into()),
        }
    }

    /// Writes `bytes` to `target` via a temporary file and rename.
    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        let _lock = self.lock()?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self.dir.join(format!(".{}.tmp", file_name));

        let written = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            if !self.sync_mode.is_fast() {
                file.sync_all()?;
            }
            fs::rename(&tmp, target)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::io(target, e).into());
        }

        if self.sync_mode.is_paranoid() {
            sync_dir(&self.dir)?;
        }

        debug!(
            path = %target.display(),
            bytes = bytes.len(),
            sync_mode = ?self.sync_mode,
            "Artifact written"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StorageError::io(dir, e).into())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

impl IndexStorage for FileStorage {
    fn path(&self) -> Option<&Path> {
        Some(&self.dir)
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!(path = %self.dir.display(), "File storage closed");
        Ok(())
    }

    fn load_gallery(&self) -> Result<Vec<PoseRecord>> {
        let bytes = match fs::read(&self.gallery_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::GalleryNotFound(self.gallery_path.clone()).into());
            }
            Err(e) => return Err(StorageError::io(&self.gallery_path, e).into()),
        };

        let records: Vec<PoseRecord> = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %self.gallery_path.display(), error = %e, "Unreadable gallery file");
            StorageError::corrupted(format!(
                "gallery {}: {}",
                self.gallery_path.display(),
                e
            ))
        })?;

        debug!(records = records.len(), "Gallery loaded");
        Ok(records)
    }

    fn save_gallery(&self, records: &[PoseRecord]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        self.write_atomic(&self.gallery_path, &bytes)
    }

    fn load_tree(&self) -> Result<Vec<u8>> {
        let len = match fs::metadata(&self.tree_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PoseIndexError::IndexNotFound(self.tree_path.clone()));
            }
            Err(e) => return Err(StorageError::io(&self.tree_path, e).into()),
        };
        if len > self.max_tree_file_bytes {
            warn!(
                bytes = len,
                limit = self.max_tree_file_bytes,
                "Tree file exceeds size cap"
            );
            return Err(StorageError::corrupted(format!(
                "tree file is {} bytes, limit is {}",
                len, self.max_tree_file_bytes
            ))
            .into());
        }

        let bytes = fs::read(&self.tree_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PoseIndexError::IndexNotFound(self.tree_path.clone())
            } else {
                StorageError::io(&self.tree_path, e).into()
            }
        })?;
        debug!(bytes = bytes.len(), "Tree file read");
        Ok(bytes)
    }

    fn save_tree(&self, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.tree_path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn records() -> Vec<PoseRecord> {
        vec![
            PoseRecord::new("a.jpg", vec![0.1, 0.2], vec![0.9]),
            PoseRecord::new("b.jpg", vec![0.3, 0.4], vec![0.5]),
        ]
    }

    #[test]
    fn test_open_does_not_create_anything() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("gallery");
        let _storage = FileStorage::open(&root, &Config::default()).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_gallery_round_trip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("g"), &Config::default()).unwrap();
        storage.save_gallery(&records()).unwrap();
        assert_eq!(storage.load_gallery().unwrap(), records());

        let json = std::fs::read_to_string(storage.gallery_path()).unwrap();
        assert!(json.contains("\"vectorXY\""));
    }

    #[test]
    fn test_missing_gallery() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), &Config::default()).unwrap();
        let err = storage.load_gallery().unwrap_err();
        assert!(matches!(
            err,
            PoseIndexError::Storage(StorageError::GalleryNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_gallery_is_corrupted() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), &Config::default()).unwrap();
        std::fs::write(storage.gallery_path(), b"[{\"image\": 3}").unwrap();
        assert!(matches!(
            storage.load_gallery().unwrap_err(),
            PoseIndexError::Storage(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn test_missing_tree() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), &Config::default()).unwrap();
        let err = storage.load_tree().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_tree_round_trip_and_overwrite() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), &Config::default()).unwrap();
        storage.save_tree(b"first").unwrap();
        storage.save_tree(b"second").unwrap();
        assert_eq!(storage.load_tree().unwrap(), b"second");

        // No temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_oversized_tree_rejected() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_tree_file_bytes: 4,
            ..Default::default()
        };
        let storage = FileStorage::open(dir.path(), &config).unwrap();
        storage.save_tree(b"too large").unwrap();
        assert!(matches!(
            storage.load_tree().unwrap_err(),
            PoseIndexError::Storage(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn test_locked_directory() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), &Config::default()).unwrap();

        let holder = File::create(dir.path().join(LOCK_FILE)).unwrap();
        fs2::FileExt::lock_exclusive(&holder).unwrap();

        let err = storage.save_tree(b"bytes").unwrap_err();
        assert!(matches!(
            err,
            PoseIndexError::Storage(StorageError::StorageLocked)
        ));

        fs2::FileExt::unlock(&holder).unwrap();
        storage.save_tree(b"bytes").unwrap();
    }

    #[test]
    fn test_sync_modes_write() {
        for sync_mode in [SyncMode::Fast, SyncMode::Normal, SyncMode::Paranoid] {
            let dir = tempdir().unwrap();
            let config = Config {
                sync_mode,
                ..Default::default()
            };
            let storage = FileStorage::open(dir.path(), &config).unwrap();
            storage.save_gallery(&records()).unwrap();
            assert_eq!(storage.load_gallery().unwrap().len(), 2);
        }
    }
}
