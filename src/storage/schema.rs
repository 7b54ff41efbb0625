//! Artifact layout definitions and limits.
//!
//! Two artifacts live side by side in the storage directory:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ posedata.json (gallery)                                      │
//! │   JSON array, one object per record, in gallery order:       │
//! │   { "image": str, "vectorXY": [f32; 2K],                     │
//! │     "vectorConfidence": [f32; K] }                           │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ prebuild-vptree.bin (tree skeleton)                          │
//! │   magic "PMVPTREE" | u32 LE format version | bincode body    │
//! │   body: record_count, metric, nodes[vantage, threshold,      │
//! │         inside?, outside?]                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tree refers to records purely by gallery position, so the two files
//! are only meaningful as a pair. The gallery is replaced wholesale on
//! ingestion; the tree is replaced on every `save_index`.

/// Magic bytes at the start of every tree file.
pub const TREE_MAGIC: &[u8; 8] = b"PMVPTREE";

/// Current tree file format version.
///
/// Increment this when making breaking changes to the tree body.
/// Files with a different version are refused on load.
pub const TREE_FORMAT_VERSION: u32 = 1;

/// Default gallery file name.
pub const DEFAULT_GALLERY_FILE: &str = "posedata.json";

/// Default tree file name.
pub const DEFAULT_TREE_FILE: &str = "prebuild-vptree.bin";

/// Advisory lock file taken by writers.
pub const LOCK_FILE: &str = ".posemirror.lock";

/// Default joint count (PoseNet keypoints).
pub const DEFAULT_JOINT_COUNT: usize = 17;

/// Maximum supported joint count.
pub const MAX_JOINT_COUNT: usize = 256;

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 512;

/// Default cap on accepted tree file size (256 MiB).
pub const DEFAULT_MAX_TREE_FILE_BYTES: u64 = 256 * 1024 * 1024;
