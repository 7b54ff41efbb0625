//! # PoseMirror Index
//!
//! Pose similarity index: matches a live body pose against a gallery of
//! reference poses and returns the most similar reference images.
//!
//! The gallery is indexed with a vantage-point tree so a query visits a
//! fraction of the records instead of scanning all of them. Trees can be
//! rebuilt or reloaded while queries are being served; every query runs
//! against one consistent (gallery, tree) snapshot.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use posemirror::{Config, PoseIndex, PoseRecord, PoseVector};
//!
//! # fn main() -> posemirror::Result<()> {
//! let index = PoseIndex::open("./gallery", Config::with_joint_count(2))?;
//!
//! // Replace the gallery (normally done by the ingestion tooling)
//! index.submit_gallery(vec![
//!     PoseRecord::new("tree-pose.jpg", vec![0.1, 0.2, 0.3, 0.4], vec![0.9, 0.8]),
//!     PoseRecord::new("warrior-2.jpg", vec![0.5, 0.6, 0.7, 0.8], vec![1.0, 0.7]),
//! ])?;
//!
//! // Build, persist, and query
//! index.build_index()?;
//! index.save_index()?;
//! let live = PoseVector::new(vec![0.12, 0.2, 0.3, 0.41], vec![0.8, 0.9]);
//! let best = index.query(&live, 1)?;
//! assert_eq!(best[0].identifier, "tree-pose.jpg");
//!
//! index.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Gallery
//!
//! An ordered list of [`PoseRecord`]s. The tree refers to records only by
//! position, so a gallery and its tree are always published together.
//!
//! ### Metric
//!
//! [`WeightedDistance`] (default) weights each joint by the confidence of
//! the gallery record; [`CosineDistance`] compares coordinate directions.
//! The gallery record is always the first argument.
//!
//! ### Snapshot
//!
//! An [`IndexSnapshot`] pairs a gallery with the tree built over it.
//! Snapshots are immutable and published with a single atomic swap.
//!
//! ## Thread Safety
//!
//! `PoseIndex` is `Send + Sync` and can be shared across threads using `Arc`.
//! Queries never block; builds, loads and saves are serialized.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod provider;
mod service;
mod types;

pub mod gallery;
pub mod index;
pub mod storage;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main index interface
pub use service::{IndexStats, PoseIndex};

// Async boundary
pub use provider::{AsyncPoseIndex, PoseMatcher};

// Configuration
pub use config::{Config, LoadPolicy, SyncMode};

// Error handling
pub use error::{PoseIndexError, Result, StorageError, ValidationError};

// Core types
pub use types::{PoseRecord, PoseVector, PoseView, Timestamp};

// Gallery and index
pub use gallery::Gallery;
pub use index::{
    CosineDistance, IndexSnapshot, MetricKind, PoseMatch, PoseMetric, SnapshotInfo,
    SnapshotSource, VpTree, WeightedDistance,
};

// Storage (for advanced users)
pub use storage::{FileStorage, IndexStorage, MemoryStorage};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common usage.
///
/// ```rust
/// use posemirror::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, LoadPolicy, SyncMode};
    pub use crate::error::{PoseIndexError, Result};
    pub use crate::index::{MetricKind, PoseMatch};
    pub use crate::service::PoseIndex;
    pub use crate::types::{PoseRecord, PoseVector};
}
