//! Core type definitions for poses and timestamps.
//!
//! A pose is two parallel vectors: `2 * K` normalized coordinates laid out
//! as `[x0, y0, x1, y1, ...]` and `K` per-joint confidences in `[0, 1]`.
//! The JSON field names (`image`, `vectorXY`, `vectorConfidence`) match the
//! gallery files produced by the ingestion tooling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference pose stored in a gallery.
///
/// Records are immutable once a gallery has been built from them.
///
/// # Example
/// ```
/// use posemirror::PoseRecord;
///
/// let record = PoseRecord::new("warrior-2.jpg", vec![0.1, 0.2], vec![0.9]);
/// assert_eq!(record.joint_count(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    /// Unique name of the reference image within its gallery.
    #[serde(rename = "image")]
    pub identifier: String,

    /// Interleaved `(x, y)` joint positions.
    #[serde(rename = "vectorXY")]
    pub coordinates: Vec<f32>,

    /// Per-joint detection confidence.
    #[serde(rename = "vectorConfidence")]
    pub confidence: Vec<f32>,
}

impl PoseRecord {
    /// Creates a record from its parts.
    pub fn new(identifier: impl Into<String>, coordinates: Vec<f32>, confidence: Vec<f32>) -> Self {
        Self {
            identifier: identifier.into(),
            coordinates,
            confidence,
        }
    }

    /// Returns a borrowed view for distance computations.
    #[inline]
    pub fn view(&self) -> PoseView<'_> {
        PoseView::new(&self.coordinates, &self.confidence)
    }

    /// Number of joints, judged by the confidence vector.
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.confidence.len()
    }
}

/// A pose without an identifier, typically a live query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseVector {
    /// Interleaved `(x, y)` joint positions.
    #[serde(rename = "vectorXY")]
    pub coordinates: Vec<f32>,

    /// Per-joint detection confidence.
    #[serde(rename = "vectorConfidence")]
    pub confidence: Vec<f32>,
}

impl PoseVector {
    /// Creates a query vector from its parts.
    pub fn new(coordinates: Vec<f32>, confidence: Vec<f32>) -> Self {
        Self {
            coordinates,
            confidence,
        }
    }

    /// Returns a borrowed view for distance computations.
    #[inline]
    pub fn view(&self) -> PoseView<'_> {
        PoseView::new(&self.coordinates, &self.confidence)
    }
}

impl From<&PoseRecord> for PoseVector {
    fn from(record: &PoseRecord) -> Self {
        Self::new(record.coordinates.clone(), record.confidence.clone())
    }
}

/// Borrowed coordinates and confidences of one pose.
#[derive(Clone, Copy, Debug)]
pub struct PoseView<'a> {
    /// Interleaved `(x, y)` joint positions.
    pub coordinates: &'a [f32],
    /// Per-joint detection confidence.
    pub confidence: &'a [f32],
}

impl<'a> PoseView<'a> {
    /// Creates a view over two slices.
    #[inline]
    pub const fn new(coordinates: &'a [f32], confidence: &'a [f32]) -> Self {
        Self {
            coordinates,
            confidence,
        }
    }
}

/// Unix timestamp in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch, returns a timestamp
    /// of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
