//! Configuration types for the pose index.
//!
//! The [`Config`] struct controls index behavior including:
//! - Pose shape (number of joints per record)
//! - Distance metric used to build and search the tree
//! - Whether queries may load a persisted tree on demand
//! - Artifact file names and write durability
//!
//! # Example
//! ```rust
//! use posemirror::{Config, LoadPolicy, MetricKind, SyncMode};
//!
//! // Use defaults (17 PoseNet joints, confidence-weighted metric)
//! let config = Config::default();
//!
//! // Customize for a server that restores its index lazily
//! let config = Config {
//!     load_policy: LoadPolicy::OnFirstQuery,
//!     sync_mode: SyncMode::Paranoid,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::index::MetricKind;
use crate::storage::schema::{
    DEFAULT_GALLERY_FILE, DEFAULT_JOINT_COUNT, DEFAULT_MAX_TREE_FILE_BYTES, DEFAULT_TREE_FILE,
    MAX_JOINT_COUNT,
};

/// Index configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use posemirror::Config;
///
/// let config = Config {
///     joint_count: 13,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of joints K in every pose.
    ///
    /// Records carry `2 * K` coordinates and `K` confidences.
    /// Default: 17 (the PoseNet keypoint set)
    pub joint_count: usize,

    /// Distance metric used for both tree construction and search.
    pub metric: MetricKind,

    /// What a query does when no snapshot has been published yet.
    pub load_policy: LoadPolicy,

    /// Durability mode for artifact writes.
    pub sync_mode: SyncMode,

    /// File name of the gallery artifact inside the storage directory.
    pub gallery_file: String,

    /// File name of the tree artifact inside the storage directory.
    pub tree_file: String,

    /// Upper bound on the size of a tree file accepted by `load_index`.
    pub max_tree_file_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            joint_count: DEFAULT_JOINT_COUNT,
            metric: MetricKind::Weighted,
            // Explicit is the safe default - a query never touches disk
            load_policy: LoadPolicy::Explicit,
            sync_mode: SyncMode::Normal,
            gallery_file: DEFAULT_GALLERY_FILE.to_string(),
            tree_file: DEFAULT_TREE_FILE.to_string(),
            max_tree_file_bytes: DEFAULT_MAX_TREE_FILE_BYTES,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config for poses with the given number of joints.
    ///
    /// # Example
    /// ```rust
    /// use posemirror::Config;
    ///
    /// // MoveNet-style upper body only
    /// let config = Config::with_joint_count(9);
    /// assert_eq!(config.coordinate_len(), 18);
    /// ```
    pub fn with_joint_count(joint_count: usize) -> Self {
        Self {
            joint_count,
            ..Default::default()
        }
    }

    /// Creates a Config that searches with the given metric.
    pub fn with_metric(metric: MetricKind) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `PoseIndex::open()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `joint_count` is 0 or exceeds the supported maximum
    /// - an artifact file name is empty, contains a path separator, or
    ///   both artifacts share a name
    /// - `max_tree_file_bytes` is 0
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.joint_count == 0 {
            return Err(ValidationError::invalid_field(
                "joint_count",
                "must be greater than 0",
            ));
        }
        if self.joint_count > MAX_JOINT_COUNT {
            return Err(ValidationError::invalid_field(
                "joint_count",
                format!("must not exceed {}", MAX_JOINT_COUNT),
            ));
        }

        validate_file_name("gallery_file", &self.gallery_file)?;
        validate_file_name("tree_file", &self.tree_file)?;
        if self.gallery_file == self.tree_file {
            return Err(ValidationError::invalid_field(
                "tree_file",
                "must differ from gallery_file",
            ));
        }

        if self.max_tree_file_bytes == 0 {
            return Err(ValidationError::invalid_field(
                "max_tree_file_bytes",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the expected coordinate vector length (`2 * joint_count`).
    #[inline]
    pub fn coordinate_len(&self) -> usize {
        self.joint_count * 2
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::required_field(field));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ValidationError::invalid_field(
            field,
            format!("must be a plain file name, got '{}'", name),
        ));
    }
    Ok(())
}

/// Behavior of `query` before any snapshot exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPolicy {
    /// Queries fail with `IndexNotBuilt` until `build_index` or
    /// `load_index` has published a snapshot.
    #[default]
    Explicit,

    /// The first query loads the persisted tree (never rebuilds it).
    ///
    /// A failed load is returned as that query's error; the next query
    /// tries again.
    OnFirstQuery,
}

impl LoadPolicy {
    /// Returns true if queries may load the persisted tree.
    pub fn loads_on_query(&self) -> bool {
        matches!(self, Self::OnFirstQuery)
    }
}

/// Durability mode for artifact writes.
///
/// Artifacts are always written to a temporary file and renamed into
/// place; this controls how much is flushed before the rename.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync the file contents before the rename.
    ///
    /// This is the default and recommended setting. A crash leaves either
    /// the old or the new artifact, never a truncated one.
    #[default]
    Normal,

    /// Skip fsync entirely (faster writes, may lose the newest artifact on crash).
    ///
    /// Use for tests and throwaway galleries.
    Fast,

    /// Sync the file and its parent directory (slowest, maximum durability).
    Paranoid,
}

impl SyncMode {
    /// Returns true if this mode also syncs the directory entry.
    pub fn is_paranoid(&self) -> bool {
        matches!(self, Self::Paranoid)
    }

    /// Returns true if this mode skips fsync.
    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }
}
