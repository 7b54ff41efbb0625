//! Gallery management module.
//!
//! A **gallery** is the ordered collection of reference poses that queries
//! are matched against. Position is load-bearing: trees refer to records
//! only by their index in the gallery, so a gallery and the tree built over
//! it are always published together (see [`IndexSnapshot`]).
//!
//! [`IndexSnapshot`]: crate::IndexSnapshot

mod validation;

pub(crate) use validation::validate_query;

use crate::error::Result;
use crate::types::{PoseRecord, PoseView};

/// An ordered, validated, immutable sequence of [`PoseRecord`]s.
///
/// Every record has exactly `joint_count` joints and a unique identifier.
/// Construct with [`Gallery::new`]; there is no way to mutate a gallery in
/// place, ingestion replaces it wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct Gallery {
    records: Vec<PoseRecord>,
    joint_count: usize,
}

impl Gallery {
    /// Validates `records` and wraps them as a gallery.
    ///
    /// An empty gallery is valid here; it is only rejected when an index
    /// is built over it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any record has the wrong shape,
    /// out-of-range values, or a repeated identifier.
    pub fn new(records: Vec<PoseRecord>, joint_count: usize) -> Result<Self> {
        validation::validate_records(&records, joint_count)?;
        Ok(Self {
            records,
            joint_count,
        })
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the gallery has no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Joint count shared by every record.
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Returns the record at `position`, if any.
    #[inline]
    pub fn get(&self, position: usize) -> Option<&PoseRecord> {
        self.records.get(position)
    }

    /// Returns all records in gallery order.
    #[inline]
    pub fn records(&self) -> &[PoseRecord] {
        &self.records
    }

    /// Iterates records in gallery order.
    pub fn iter(&self) -> impl Iterator<Item = &PoseRecord> {
        self.records.iter()
    }

    /// Returns the position of the record with the given identifier.
    pub fn position_of(&self, identifier: &str) -> Option<usize> {
        self.records.iter().position(|r| r.identifier == identifier)
    }

    /// Borrowed view of the record at `position`.
    ///
    /// Callers guarantee `position < len()`; trees are validated against
    /// the gallery before they are ever searched.
    #[inline]
    pub(crate) fn view(&self, position: usize) -> PoseView<'_> {
        self.records[position].view()
    }

    /// Consumes the gallery, returning its records.
    pub fn into_records(self) -> Vec<PoseRecord> {
        self.records
    }
}
