//! Pose similarity index: metrics, VP-tree construction, persistence and
//! k-NN search.
//!
//! # Data Flow
//!
//! ```text
//! Gallery ──► VpTree::build(metric) ──► encode_tree ──► tree file
//!                    │                                      │
//!                    ▼                                      ▼
//!              IndexSnapshot ◄──────────── decode_tree(gallery, metric)
//!                    │
//!                    ▼
//!          search(query, k) ──► Vec<PoseMatch>
//! ```
//!
//! Every function here is pure over its inputs; publication and locking
//! live in [`PoseIndex`](crate::PoseIndex).

pub mod codec;
pub mod metric;
pub mod search;
pub mod snapshot;
pub mod tree;

pub use codec::{decode_tree, encode_tree};
pub use metric::{CosineDistance, MetricKind, PoseMetric, WeightedDistance};
pub use search::{linear_scan, search, search_with_stats, PoseMatch, SearchStats};
pub use snapshot::{IndexSnapshot, SnapshotInfo, SnapshotSource};
pub use tree::{NodeId, VpNode, VpTree};
