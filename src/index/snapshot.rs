//! The published (gallery, tree) pair.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::gallery::Gallery;
use crate::index::metric::MetricKind;
use crate::index::search::{search, PoseMatch};
use crate::index::tree::VpTree;
use crate::types::{PoseVector, Timestamp};

/// How a snapshot's tree came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SnapshotSource {
    /// Built in memory by `build_index`.
    Built,
    /// Decoded from the tree file by `load_index`.
    Loaded,
}

/// An immutable gallery together with the tree built over it.
///
/// Snapshots are published whole and never modified. A query holds an
/// `Arc<IndexSnapshot>` for its entire duration, so it can never observe
/// a gallery from one publication paired with a tree from another.
#[derive(Debug)]
pub struct IndexSnapshot {
    gallery: Arc<Gallery>,
    tree: VpTree,
    generation: u64,
    source: SnapshotSource,
    published_at: Timestamp,
}

impl IndexSnapshot {
    pub(crate) fn new(
        gallery: Arc<Gallery>,
        tree: VpTree,
        generation: u64,
        source: SnapshotSource,
    ) -> Self {
        Self {
            gallery,
            tree,
            generation,
            source,
            published_at: Timestamp::now(),
        }
    }

    /// The gallery this snapshot searches.
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Shared handle to the gallery.
    pub fn gallery_arc(&self) -> Arc<Gallery> {
        Arc::clone(&self.gallery)
    }

    /// The tree over [`gallery`](Self::gallery).
    pub fn tree(&self) -> &VpTree {
        &self.tree
    }

    /// Publication counter; strictly increasing within one `PoseIndex`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the tree was built or loaded.
    pub fn source(&self) -> SnapshotSource {
        self.source
    }

    /// When the snapshot was published.
    pub fn published_at(&self) -> Timestamp {
        self.published_at
    }

    /// Runs a k-NN query against this snapshot with the metric its tree was
    /// built with.
    pub fn search(&self, query: &PoseVector, k: usize) -> Result<Vec<PoseMatch>> {
        search(
            &self.tree,
            &self.gallery,
            self.tree.metric().metric(),
            query.view(),
            k,
        )
    }

    /// Summary suitable for logging or a status endpoint.
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            generation: self.generation,
            source: self.source,
            record_count: self.gallery.len(),
            node_count: self.tree.len(),
            depth: self.tree.depth(),
            metric: self.tree.metric(),
            published_at: self.published_at,
        }
    }
}

/// Serializable summary of an [`IndexSnapshot`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotInfo {
    /// Publication counter.
    pub generation: u64,
    /// Whether the tree was built or loaded.
    pub source: SnapshotSource,
    /// Number of gallery records.
    pub record_count: usize,
    /// Number of tree nodes.
    pub node_count: usize,
    /// Longest root-to-leaf path.
    pub depth: usize,
    /// Metric the tree was built with.
    pub metric: MetricKind,
    /// When the snapshot was published.
    pub published_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::metric::WeightedDistance;
    use crate::types::PoseRecord;

    #[test]
    fn test_snapshot_search_and_info() {
        let records = (0..8)
            .map(|i| PoseRecord::new(format!("r{}", i), vec![i as f32, 0.0], vec![1.0]))
            .collect();
        let gallery = Arc::new(Gallery::new(records, 1).unwrap());
        let tree = VpTree::build(&gallery, &WeightedDistance).unwrap();
        let snapshot = IndexSnapshot::new(gallery, tree, 3, SnapshotSource::Built);

        let results = snapshot
            .search(&PoseVector::new(vec![5.1, 0.0], vec![1.0]), 2)
            .unwrap();
        assert_eq!(results[0].identifier, "r5");
        assert_eq!(results[1].identifier, "r6");

        let info = snapshot.info();
        assert_eq!(info.generation, 3);
        assert_eq!(info.record_count, 8);
        assert_eq!(info.node_count, 8);
        assert_eq!(info.source, SnapshotSource::Built);
        assert_eq!(info.metric, MetricKind::Weighted);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["source"], "Built");
    }
}
