//! Input validation for gallery records and query vectors.
//!
//! Validates [`PoseRecord`]s before they become part of a [`Gallery`] and
//! query vectors before they reach the search. All size constraints are
//! defined as constants in [`crate::storage::schema`].
//!
//! # Validation Layers
//!
//! ```text
//! Gallery::new()
//!     └── validate_records()        ← identifier uniqueness
//!             └── validate_record() ← per-record shape and ranges
//!
//! PoseIndex::query()
//!     └── validate_query()          ← shape against the snapshot's gallery
//! ```
//!
//! [`Gallery`]: super::Gallery

use std::collections::HashMap;

use crate::error::{PoseIndexError, ValidationError};
use crate::storage::schema::MAX_IDENTIFIER_LENGTH;
use crate::types::{PoseRecord, PoseVector};

/// Validates a single record at `position`.
///
/// # Rules
///
/// | Field | Constraint |
/// |-------|------------|
/// | `identifier` | Non-empty, max 512 bytes |
/// | `coordinates` | Exactly `2 * joint_count` finite values |
/// | `confidence` | Exactly `joint_count` values in 0.0–1.0 |
pub(crate) fn validate_record(
    record: &PoseRecord,
    position: usize,
    joint_count: usize,
) -> Result<(), ValidationError> {
    if record.identifier.is_empty() {
        return Err(ValidationError::required_field(format!(
            "records[{}].identifier",
            position
        )));
    }

    if record.identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::invalid_field(
            format!("records[{}].identifier", position),
            format!(
                "exceeds max length of {} bytes (got {})",
                MAX_IDENTIFIER_LENGTH,
                record.identifier.len()
            ),
        ));
    }

    if record.coordinates.len() != joint_count * 2 {
        return Err(ValidationError::vector_shape(
            format!("records[{}].coordinates", position),
            joint_count * 2,
            record.coordinates.len(),
        ));
    }

    if record.confidence.len() != joint_count {
        return Err(ValidationError::vector_shape(
            format!("records[{}].confidence", position),
            joint_count,
            record.confidence.len(),
        ));
    }

    check_coordinates(&record.coordinates, || {
        format!("records[{}].coordinates", position)
    })?;
    check_confidence(&record.confidence, || {
        format!("records[{}].confidence", position)
    })?;

    Ok(())
}

/// Validates every record and rejects repeated identifiers.
pub(crate) fn validate_records(
    records: &[PoseRecord],
    joint_count: usize,
) -> Result<(), ValidationError> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(records.len());

    for (position, record) in records.iter().enumerate() {
        validate_record(record, position, joint_count)?;

        if let Some(&first) = seen.get(record.identifier.as_str()) {
            return Err(ValidationError::duplicate_identifier(
                record.identifier.clone(),
                first,
                position,
            ));
        }
        seen.insert(record.identifier.as_str(), position);
    }

    Ok(())
}

/// Validates a query vector against a gallery's joint count.
///
/// Wrong lengths are reported as [`PoseIndexError::InvalidQueryVector`];
/// non-finite or out-of-range values as validation errors.
pub(crate) fn validate_query(query: &PoseVector, joint_count: usize) -> Result<(), PoseIndexError> {
    if query.coordinates.len() != joint_count * 2 {
        return Err(PoseIndexError::invalid_query(
            "coordinates",
            joint_count * 2,
            query.coordinates.len(),
        ));
    }
    if query.confidence.len() != joint_count {
        return Err(PoseIndexError::invalid_query(
            "confidence",
            joint_count,
            query.confidence.len(),
        ));
    }

    check_coordinates(&query.coordinates, || "query.coordinates".to_string())?;
    check_confidence(&query.confidence, || "query.confidence".to_string())?;

    Ok(())
}

fn check_coordinates(
    values: &[f32],
    field: impl Fn() -> String,
) -> Result<(), ValidationError> {
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::invalid_field(
            field(),
            format!("value at index {} is not finite", i),
        ));
    }
    Ok(())
}

fn check_confidence(values: &[f32], field: impl Fn() -> String) -> Result<(), ValidationError> {
    if let Some(i) = values.iter().position(|v| !(0.0..=1.0).contains(v)) {
        return Err(ValidationError::invalid_field(
            field(),
            format!(
                "value at index {} must be between 0.0 and 1.0, got {}",
                i, values[i]
            ),
        ));
    }
    Ok(())
}
