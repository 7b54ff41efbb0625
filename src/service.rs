//! PoseIndex instance management and lifecycle.
//!
//! [`PoseIndex`] owns the storage backend and the currently published
//! [`IndexSnapshot`]. It is the only place where state changes.
//!
//! # Concurrency
//!
//! ```text
//!   query() ──► ArcSwapOption::load_full() ──► Arc<IndexSnapshot> ──► search
//!                       ▲  (never blocks)
//!                       │ store()
//!   build_index() ┐     │
//!   load_index()  ├──► writer Mutex ──► gallery cache ──► new snapshot
//!   save_index()  │
//!   submit_gallery┘
//! ```
//!
//! Writers are serialized by one mutex and publish a fully built snapshot
//! with a single atomic store. Readers take an `Arc` to whatever is
//! published when they start and keep it for the whole query.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, LoadPolicy};
use crate::error::{PoseIndexError, Result};
use crate::gallery::{validate_query, Gallery};
use crate::index::{
    decode_tree, encode_tree, IndexSnapshot, MetricKind, PoseMatch, SnapshotInfo, SnapshotSource,
    VpTree,
};
use crate::storage::{open_storage, IndexStorage};
use crate::types::{PoseRecord, PoseVector};

/// State guarded by the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    /// Generation of the last published snapshot (0 before the first).
    last_generation: u64,
}

/// The main pose index handle.
///
/// Create an instance with [`PoseIndex::open()`] (file-backed) or
/// [`PoseIndex::with_storage()`], then publish a snapshot with
/// [`build_index()`](Self::build_index) or [`load_index()`](Self::load_index)
/// before querying.
///
/// `PoseIndex` is `Send + Sync`; share it across threads with `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use posemirror::{Config, PoseIndex, PoseVector};
///
/// # fn main() -> posemirror::Result<()> {
/// let index = PoseIndex::open("./gallery", Config::default())?;
/// index.build_index()?;
/// index.save_index()?;
///
/// let live = PoseVector::new(vec![0.5; 34], vec![0.9; 17]);
/// for m in index.query(&live, 5)? {
///     println!("{} ({:.3})", m.identifier, m.distance);
/// }
/// # Ok(())
/// # }
/// ```
pub struct PoseIndex {
    /// Storage backend (files or memory).
    storage: Box<dyn IndexStorage>,

    /// Configuration used to open this index.
    config: Config,

    /// The published snapshot, if any.
    current: ArcSwapOption<IndexSnapshot>,

    /// Last gallery read from storage. Dropped on `submit_gallery`.
    gallery_cache: ArcSwapOption<Gallery>,

    /// Serializes build, load, save and gallery writes.
    writer: Mutex<WriterState>,
}

impl std::fmt::Debug for PoseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseIndex")
            .field("config", &self.config)
            .field("path", &self.storage.path())
            .field(
                "generation",
                &self.current.load_full().map(|s| s.generation()),
            )
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a [`PoseIndex`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexStats {
    /// The published snapshot, if any.
    pub snapshot: Option<SnapshotInfo>,
    /// Whether a gallery is cached in memory.
    pub gallery_cached: bool,
    /// Configured metric.
    pub metric: MetricKind,
    /// Configured joint count.
    pub joint_count: usize,
    /// Configured query-time load policy.
    pub load_policy: LoadPolicy,
}

impl PoseIndex {
    /// Opens a file-backed index in the directory `dir`.
    ///
    /// No artifact is read: the gallery is read on the first build, load
    /// or [`gallery()`](Self::gallery) call, and the tree only by
    /// [`load_index()`](Self::load_index).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`Config::validate`])
    /// - `dir` exists and is not a directory
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use posemirror::{Config, LoadPolicy, PoseIndex};
    ///
    /// // Restore the persisted tree on the first query
    /// let index = PoseIndex::open("./gallery", Config {
    ///     load_policy: LoadPolicy::OnFirstQuery,
    ///     ..Default::default()
    /// })?;
    /// # Ok::<(), posemirror::PoseIndexError>(())
    /// ```
    #[instrument(skip(dir, config), fields(path = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate().map_err(PoseIndexError::from)?;

        info!("Opening PoseIndex");

        let storage = open_storage(&dir, &config)?;
        let index = Self::assemble(storage, config);

        info!(
            joint_count = index.config.joint_count,
            metric = %index.config.metric,
            load_policy = ?index.config.load_policy,
            sync_mode = ?index.config.sync_mode,
            "PoseIndex opened successfully"
        );
        Ok(index)
    }

    /// Creates an index over an existing storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_storage(storage: Box<dyn IndexStorage>, config: Config) -> Result<Self> {
        config.validate().map_err(PoseIndexError::from)?;
        Ok(Self::assemble(storage, config))
    }

    fn assemble(storage: Box<dyn IndexStorage>, config: Config) -> Self {
        Self {
            storage,
            config,
            current: ArcSwapOption::empty(),
            gallery_cache: ArcSwapOption::empty(),
            writer: Mutex::new(WriterState::default()),
        }
    }

    /// Closes the index and its storage backend.
    ///
    /// Consumes the handle. In-flight readers holding a snapshot `Arc`
    /// keep it valid until they drop it.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing PoseIndex");
        self.storage.close()?;
        info!("PoseIndex closed successfully");
        Ok(())
    }

    /// Returns the configuration this index was opened with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the storage directory, if the backend has one.
    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.storage.path()
    }

    // =========================================================================
    // Gallery
    // =========================================================================

    /// Returns the stored gallery, reading it from storage if it is not
    /// cached.
    ///
    /// This is the gallery the next [`build_index()`](Self::build_index)
    /// will use, which may differ from the one the published snapshot
    /// searches after a [`submit_gallery()`](Self::submit_gallery).
    ///
    /// # Errors
    ///
    /// - `StorageError::GalleryNotFound` if no gallery has been stored
    /// - a validation error if the stored gallery does not fit the config
    pub fn gallery(&self) -> Result<Arc<Gallery>> {
        if let Some(gallery) = self.gallery_cache.load_full() {
            return Ok(gallery);
        }
        let _writer = self.writer()?;
        self.cached_gallery()
    }

    /// Validates `records` and replaces the stored gallery with them.
    ///
    /// Drops the in-memory gallery cache. The published snapshot is left
    /// alone and keeps answering queries until the next build or load.
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// - a validation error if any record is malformed or identifiers repeat
    /// - a storage error if the write fails
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn submit_gallery(&self, records: Vec<PoseRecord>) -> Result<usize> {
        let gallery = Gallery::new(records, self.config.joint_count)?;

        let _writer = self.writer()?;
        self.storage.save_gallery(gallery.records())?;
        self.gallery_cache.store(None);

        info!(records = gallery.len(), "Gallery replaced");
        Ok(gallery.len())
    }

    // =========================================================================
    // Index lifecycle
    // =========================================================================

    /// Builds a tree over the stored gallery and publishes it.
    ///
    /// Never reads the tree file.
    ///
    /// # Errors
    ///
    /// - [`PoseIndexError::EmptyGallery`] if the gallery has no records
    /// - `StorageError::GalleryNotFound` if no gallery has been stored
    ///
    /// On error the previously published snapshot is left untouched.
    #[instrument(skip(self))]
    pub fn build_index(&self) -> Result<SnapshotInfo> {
        let mut writer = self.writer()?;
        self.build_locked(&mut writer)
    }

    /// Reads the tree file, validates it against the stored gallery and
    /// publishes the pair.
    ///
    /// # Errors
    ///
    /// - [`PoseIndexError::IndexNotFound`] if there is no tree file
    /// - [`PoseIndexError::IndexCorpusMismatch`] if the tree does not fit
    ///   the gallery
    /// - a storage error if the tree file is corrupted, from another format
    ///   version, or built with another metric
    ///
    /// On error the previously published snapshot is left untouched.
    #[instrument(skip(self))]
    pub fn load_index(&self) -> Result<SnapshotInfo> {
        let mut writer = self.writer()?;
        self.load_locked(&mut writer)
    }

    /// Writes the published tree to storage, building one first if nothing
    /// is published.
    ///
    /// # Errors
    ///
    /// - [`PoseIndexError::IndexCorpusMismatch`] if the gallery was replaced
    ///   since the snapshot was published (the tree would not fit it)
    /// - any error from [`build_index()`](Self::build_index) when a build is needed
    /// - a storage error if the write fails
    #[instrument(skip(self))]
    pub fn save_index(&self) -> Result<SnapshotInfo> {
        let mut writer = self.writer()?;

        let snapshot = match self.current.load_full() {
            Some(snapshot) => snapshot,
            None => {
                debug!("No snapshot published, building before save");
                self.build_locked(&mut writer)?;
                self.current.load_full().ok_or(PoseIndexError::IndexNotBuilt)?
            }
        };

        let stored = self.cached_gallery()?;
        if !Arc::ptr_eq(&stored, &snapshot.gallery_arc()) && *stored != *snapshot.gallery() {
            warn!(
                generation = snapshot.generation(),
                "Published snapshot predates the stored gallery"
            );
            return Err(PoseIndexError::corpus_mismatch(
                "published snapshot was built from a replaced gallery; rebuild before saving",
                stored.len(),
            ));
        }

        let bytes = encode_tree(snapshot.tree())?;
        self.storage.save_tree(&bytes)?;

        info!(
            generation = snapshot.generation(),
            bytes = bytes.len(),
            "Index saved"
        );
        Ok(snapshot.info())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the `min(k, gallery size)` gallery records nearest to
    /// `query`, ascending by distance, ties broken by gallery position.
    ///
    /// The whole query runs against the snapshot published when it starts.
    ///
    /// # Errors
    ///
    /// - [`PoseIndexError::IndexNotBuilt`] if nothing is published (and the
    ///   load policy does not allow loading)
    /// - [`PoseIndexError::InvalidQueryVector`] on a shape mismatch
    /// - a validation error if `k == 0` or a value is out of range
    /// - under [`LoadPolicy::OnFirstQuery`], any error from
    ///   [`load_index()`](Self::load_index)
    #[instrument(level = "debug", skip(self, query))]
    pub fn query(&self, query: &PoseVector, k: usize) -> Result<Vec<PoseMatch>> {
        let snapshot = self.current_or_load()?;
        validate_query(query, snapshot.gallery().joint_count())?;
        snapshot.search(query, k)
    }

    /// Returns the published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.load_full()
    }

    /// Returns a summary of the index state.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            snapshot: self.current.load_full().map(|s| s.info()),
            gallery_cached: self.gallery_cache.load().is_some(),
            metric: self.config.metric,
            joint_count: self.config.joint_count,
            load_policy: self.config.load_policy,
        }
    }

    // =========================================================================
    // Internals (callers hold the writer lock)
    // =========================================================================

    fn writer(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.writer
            .lock()
            .map_err(|_| PoseIndexError::runtime("Index writer lock poisoned"))
    }

    /// Returns the cached gallery or reads and caches it.
    ///
    /// Only called with the writer lock held, so a concurrent
    /// `submit_gallery` cannot be overwritten by a stale read.
    fn cached_gallery(&self) -> Result<Arc<Gallery>> {
        if let Some(gallery) = self.gallery_cache.load_full() {
            return Ok(gallery);
        }
        let records = self.storage.load_gallery()?;
        let gallery = Arc::new(Gallery::new(records, self.config.joint_count)?);
        debug!(records = gallery.len(), "Gallery cached");
        self.gallery_cache.store(Some(Arc::clone(&gallery)));
        Ok(gallery)
    }

    fn build_locked(&self, writer: &mut WriterState) -> Result<SnapshotInfo> {
        let gallery = self.cached_gallery()?;
        let tree = VpTree::build(&gallery, self.config.metric.metric()).inspect_err(|e| {
            warn!(error = %e, "Index build failed");
        })?;
        Ok(self.publish(writer, gallery, tree, SnapshotSource::Built))
    }

    fn load_locked(&self, writer: &mut WriterState) -> Result<SnapshotInfo> {
        let gallery = self.cached_gallery()?;
        let bytes = self.storage.load_tree()?;
        let tree = decode_tree(&bytes, &gallery, self.config.metric).inspect_err(|e| {
            warn!(error = %e, "Persisted index rejected");
        })?;
        Ok(self.publish(writer, gallery, tree, SnapshotSource::Loaded))
    }

    fn publish(
        &self,
        writer: &mut WriterState,
        gallery: Arc<Gallery>,
        tree: VpTree,
        source: SnapshotSource,
    ) -> SnapshotInfo {
        writer.last_generation += 1;
        let snapshot = Arc::new(IndexSnapshot::new(
            gallery,
            tree,
            writer.last_generation,
            source,
        ));
        let info = snapshot.info();
        self.current.store(Some(snapshot));

        info!(
            generation = info.generation,
            source = ?info.source,
            records = info.record_count,
            depth = info.depth,
            "Index snapshot published"
        );
        info
    }

    fn current_or_load(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.current.load_full() {
            return Ok(snapshot);
        }
        if !self.config.load_policy.loads_on_query() {
            return Err(PoseIndexError::IndexNotBuilt);
        }

        let mut writer = self.writer()?;
        // Another query may have loaded while we waited for the lock.
        if let Some(snapshot) = self.current.load_full() {
            return Ok(snapshot);
        }
        debug!("Loading persisted index on first query");
        self.load_locked(&mut writer)?;
        self.current.load_full().ok_or(PoseIndexError::IndexNotBuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use tempfile::tempdir;

    fn records(n: usize) -> Vec<PoseRecord> {
        (0..n)
            .map(|i| {
                let x = i as f32 / n as f32;
                PoseRecord::new(format!("pose-{}.jpg", i), vec![x, 1.0 - x], vec![1.0])
            })
            .collect()
    }

    fn memory_index(n: usize) -> PoseIndex {
        let config = Config::with_joint_count(1);
        let storage = MemoryStorage::with_gallery(&config, records(n));
        PoseIndex::with_storage(Box::new(storage), config).unwrap()
    }

    #[test]
    fn test_open_touches_nothing() {
        let dir = tempdir().unwrap();
        let index = PoseIndex::open(dir.path(), Config::default()).unwrap();
        assert!(index.snapshot().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        index.close().unwrap();
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let err = PoseIndex::open(dir.path(), Config::with_joint_count(0)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_query_before_build() {
        let index = memory_index(3);
        let err = index
            .query(&PoseVector::new(vec![0.0, 0.0], vec![1.0]), 1)
            .unwrap_err();
        assert!(err.is_not_built());
    }

    #[test]
    fn test_build_then_query() {
        let index = memory_index(10);
        let info = index.build_index().unwrap();
        assert_eq!(info.generation, 1);
        assert_eq!(info.record_count, 10);
        assert_eq!(info.source, SnapshotSource::Built);

        let results = index
            .query(&PoseVector::new(vec![0.3, 0.7], vec![1.0]), 1)
            .unwrap();
        assert_eq!(results[0].identifier, "pose-3.jpg");
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn test_generations_increase() {
        let index = memory_index(4);
        assert_eq!(index.build_index().unwrap().generation, 1);
        assert_eq!(index.save_index().unwrap().generation, 1);
        assert_eq!(index.load_index().unwrap().generation, 2);
        assert_eq!(index.build_index().unwrap().generation, 3);
    }

    #[test]
    fn test_stats() {
        let index = memory_index(4);
        let before = index.stats();
        assert!(before.snapshot.is_none());
        assert!(!before.gallery_cached);

        index.build_index().unwrap();
        let after = index.stats();
        assert!(after.gallery_cached);
        assert_eq!(after.snapshot.unwrap().node_count, 4);
        assert_eq!(after.joint_count, 1);
    }

    #[test]
    fn test_debug_output() {
        let index = memory_index(2);
        let debug = format!("{:?}", index);
        assert!(debug.contains("PoseIndex"));
        assert!(debug.contains("generation"));
    }

    #[test]
    fn test_pose_index_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PoseIndex>();
    }
}
