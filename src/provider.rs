//! Async access to a [`PoseIndex`].
//!
//! The index itself is synchronous: builds and searches are CPU-bound and
//! artifact I/O is blocking. Async callers (an HTTP layer, typically) go
//! through [`PoseMatcher`], whose [`AsyncPoseIndex`] implementation runs
//! every call on tokio's blocking pool so the reactor is never stalled.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use posemirror::{AsyncPoseIndex, PoseMatcher};
//!
//! let matcher = AsyncPoseIndex::new(Arc::new(index));
//! let matches = matcher.query(live_pose, 5).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PoseIndexError, Result};
use crate::index::{PoseMatch, SnapshotInfo};
use crate::service::PoseIndex;
use crate::types::{PoseRecord, PoseVector};

/// Object-safe async interface to the pose index operations.
#[async_trait]
pub trait PoseMatcher: Send + Sync {
    /// Returns the nearest gallery records to `query`.
    async fn query(&self, query: PoseVector, k: usize) -> Result<Vec<PoseMatch>>;

    /// Builds and publishes a new tree over the stored gallery.
    async fn build_index(&self) -> Result<SnapshotInfo>;

    /// Loads and publishes the persisted tree.
    async fn load_index(&self) -> Result<SnapshotInfo>;

    /// Persists the published tree, building first if needed.
    async fn save_index(&self) -> Result<SnapshotInfo>;

    /// Replaces the stored gallery.
    async fn submit_gallery(&self, records: Vec<PoseRecord>) -> Result<usize>;

    /// Returns every record of the stored gallery.
    async fn gallery(&self) -> Result<Vec<PoseRecord>>;
}

/// [`PoseMatcher`] backed by a shared [`PoseIndex`].
#[derive(Clone, Debug)]
pub struct AsyncPoseIndex {
    inner: Arc<PoseIndex>,
}

impl AsyncPoseIndex {
    /// Wraps a shared index.
    pub fn new(inner: Arc<PoseIndex>) -> Self {
        Self { inner }
    }

    /// Returns the wrapped index.
    pub fn inner(&self) -> &Arc<PoseIndex> {
        &self.inner
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PoseIndex) -> Result<T> + Send + 'static,
    {
        let index = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&index))
            .await
            .map_err(|e| PoseIndexError::runtime(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl PoseMatcher for AsyncPoseIndex {
    async fn query(&self, query: PoseVector, k: usize) -> Result<Vec<PoseMatch>> {
        self.blocking(move |index| index.query(&query, k)).await
    }

    async fn build_index(&self) -> Result<SnapshotInfo> {
        self.blocking(PoseIndex::build_index).await
    }

    async fn load_index(&self) -> Result<SnapshotInfo> {
        self.blocking(PoseIndex::load_index).await
    }

    async fn save_index(&self) -> Result<SnapshotInfo> {
        self.blocking(PoseIndex::save_index).await
    }

    async fn submit_gallery(&self, records: Vec<PoseRecord>) -> Result<usize> {
        self.blocking(move |index| index.submit_gallery(records))
            .await
    }

    async fn gallery(&self) -> Result<Vec<PoseRecord>> {
        self.blocking(|index| index.gallery().map(|g| g.records().to_vec()))
            .await
    }
}
