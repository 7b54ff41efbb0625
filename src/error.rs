//! Error types for the pose index.
//!
//! The index uses a hierarchical error system:
//! - `PoseIndexError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use posemirror::{PoseIndex, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let index = PoseIndex::open("./gallery", Config::default())?;
//!     index.build_index()?;
//!     index.save_index()?;
//!     Ok(())
//! }
//! ```
//!
//! None of these errors are retried internally. A failed build or load
//! leaves the previously published snapshot in place.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pose index operations.
pub type Result<T> = std::result::Result<T, PoseIndexError>;

/// Top-level error enum for all pose index operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum PoseIndexError {
    /// Storage layer error (I/O, corruption, locking).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// A build was requested over a gallery with no records.
    #[error("Cannot build an index over an empty gallery")]
    EmptyGallery,

    /// A query arrived before any snapshot was built or loaded.
    #[error("Index not built: call build_index() or load_index() first")]
    IndexNotBuilt,

    /// The persisted tree file does not exist.
    #[error("Index file not found: {0}")]
    IndexNotFound(PathBuf),

    /// The tree does not fit the gallery it is being paired with.
    #[error("Index does not match gallery: {reason} (gallery size {gallery_size})")]
    IndexCorpusMismatch {
        /// What failed to line up.
        reason: String,
        /// Number of records in the gallery the tree was checked against.
        gallery_size: usize,
    },

    /// Query vector dimensionality differs from the gallery's.
    #[error("Invalid query vector: {field} has length {got}, expected {expected}")]
    InvalidQueryVector {
        /// Which half of the vector is wrong (`coordinates` or `confidence`).
        field: &'static str,
        /// Expected length for the current gallery.
        expected: usize,
        /// Actual length provided.
        got: usize,
    },

    /// Internal runtime failure: a poisoned lock, or a blocking task that
    /// could not be joined.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl PoseIndexError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a corpus mismatch error.
    pub fn corpus_mismatch(reason: impl Into<String>, gallery_size: usize) -> Self {
        Self::IndexCorpusMismatch {
            reason: reason.into(),
            gallery_size,
        }
    }

    /// Creates an invalid query vector error.
    pub fn invalid_query(field: &'static str, expected: usize, got: usize) -> Self {
        Self::InvalidQueryVector {
            field,
            expected,
            got,
        }
    }

    /// Creates a runtime error with the given message.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Returns true if no snapshot was available for the operation.
    pub fn is_not_built(&self) -> bool {
        matches!(self, Self::IndexNotBuilt)
    }

    /// Returns true if the tree file is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IndexNotFound(_))
    }

    /// Returns true if a tree and gallery were found to be incompatible.
    pub fn is_corpus_mismatch(&self) -> bool {
        matches!(self, Self::IndexCorpusMismatch { .. })
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems reading or writing the gallery and tree
/// artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Read or write failure on an artifact.
    #[error("I/O failure on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Artifact contents are malformed.
    #[error("Artifact corrupted: {0}")]
    Corrupted(String),

    /// Gallery file not found at expected path.
    #[error("Gallery not found: {0}")]
    GalleryNotFound(PathBuf),

    /// Another process holds the writer lock.
    #[error("Storage is locked by another writer")]
    StorageLocked,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tree file was written by an incompatible format version.
    #[error("Tree format version mismatch: expected {expected}, found {found}")]
    FormatVersionMismatch {
        /// Format version this build understands.
        expected: u32,
        /// Format version found in the file.
        found: u32,
    },

    /// Tree file was built with a different distance metric.
    #[error("Metric mismatch: index configured for {expected}, file built with {found}")]
    MetricMismatch {
        /// Metric configured for this index.
        expected: String,
        /// Metric recorded in the tree file.
        found: String,
    },
}

impl StorageError {
    /// Creates an I/O error bound to the path being accessed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}

// Convert bincode errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to PoseIndexError for convenience
impl From<bincode::Error> for PoseIndexError {
    fn from(err: bincode::Error) -> Self {
        PoseIndexError::Storage(StorageError::from(err))
    }
}

impl From<serde_json::Error> for PoseIndexError {
    fn from(err: serde_json::Error) -> Self {
        PoseIndexError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A pose vector has the wrong number of components.
    #[error("Invalid vector shape for {field}: expected {expected}, got {got}")]
    InvalidVectorShape {
        /// Which vector is malformed.
        field: String,
        /// Expected component count.
        expected: usize,
        /// Actual component count.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// Two gallery records share an identifier.
    #[error("Duplicate identifier '{identifier}' at positions {first} and {second}")]
    DuplicateIdentifier {
        /// The repeated identifier.
        identifier: String,
        /// Position of the first occurrence.
        first: usize,
        /// Position of the repeat.
        second: usize,
    },
}

impl ValidationError {
    /// Creates a vector shape error.
    pub fn vector_shape(field: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::InvalidVectorShape {
            field: field.into(),
            expected,
            got,
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a duplicate identifier error.
    pub fn duplicate_identifier(identifier: impl Into<String>, first: usize, second: usize) -> Self {
        Self::DuplicateIdentifier {
            identifier: identifier.into(),
            first,
            second,
        }
    }
}
