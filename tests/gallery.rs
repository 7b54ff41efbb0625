//! Integration tests for gallery ingestion.
//!
//! Covers validation on submit, the gallery file format shared with the
//! ingestion tooling, and the rule that a submitted gallery only takes
//! effect at the next build.

use posemirror::{Config, PoseIndex, PoseIndexError, PoseRecord, PoseVector, SyncMode, ValidationError};
use tempfile::tempdir;

fn two_joint_config() -> Config {
    Config {
        sync_mode: SyncMode::Fast,
        ..Config::with_joint_count(2)
    }
}

fn record(id: &str, x: f32) -> PoseRecord {
    PoseRecord::new(id, vec![x, x, x, x], vec![1.0, 1.0])
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_submit_rejects_bad_shape() {
    let dir = tempdir().unwrap();
    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();

    let bad = PoseRecord::new("short.jpg", vec![0.1, 0.2, 0.3], vec![1.0, 1.0]);
    let err = index.submit_gallery(vec![record("ok.jpg", 0.1), bad]).unwrap_err();
    assert!(matches!(
        err,
        PoseIndexError::Validation(ValidationError::InvalidVectorShape {
            expected: 4,
            got: 3,
            ..
        })
    ));

    // Nothing was written
    assert!(!dir.path().join("posedata.json").exists());
}

#[test]
fn test_submit_rejects_duplicate_identifiers() {
    let dir = tempdir().unwrap();
    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();

    let err = index
        .submit_gallery(vec![record("a.jpg", 0.1), record("b.jpg", 0.2), record("a.jpg", 0.3)])
        .unwrap_err();
    assert!(matches!(
        err,
        PoseIndexError::Validation(ValidationError::DuplicateIdentifier {
            first: 0,
            second: 2,
            ..
        })
    ));
}

#[test]
fn test_submit_rejects_out_of_range_confidence() {
    let dir = tempdir().unwrap();
    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();

    let bad = PoseRecord::new("a.jpg", vec![0.1; 4], vec![1.0, 1.5]);
    assert!(index.submit_gallery(vec![bad]).unwrap_err().is_validation());
}

// ============================================================================
// Replacement semantics
// ============================================================================

#[test]
fn test_submit_does_not_touch_published_snapshot() {
    let dir = tempdir().unwrap();
    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
    index
        .submit_gallery(vec![record("old-a.jpg", 0.1), record("old-b.jpg", 0.9)])
        .unwrap();
    let first = index.build_index().unwrap();

    let count = index
        .submit_gallery(vec![record("new-a.jpg", 0.1), record("new-b.jpg", 0.5), record("new-c.jpg", 0.9)])
        .unwrap();
    assert_eq!(count, 3);

    // Queries still answer from the old snapshot
    let pose = PoseVector::new(vec![0.1; 4], vec![1.0, 1.0]);
    assert_eq!(index.query(&pose, 1).unwrap()[0].identifier, "old-a.jpg");
    assert_eq!(index.snapshot().unwrap().generation(), first.generation);

    // The stored gallery is already the new one
    let stored = index.gallery().unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.get(1).unwrap().identifier, "new-b.jpg");

    // The next build switches over
    let second = index.build_index().unwrap();
    assert_eq!(second.record_count, 3);
    assert!(second.generation > first.generation);
    assert_eq!(index.query(&pose, 1).unwrap()[0].identifier, "new-a.jpg");
}

#[test]
fn test_gallery_survives_reopen() {
    let dir = tempdir().unwrap();
    let records = vec![record("a.jpg", 0.1), record("b.jpg", 0.2)];
    {
        let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
        index.submit_gallery(records.clone()).unwrap();
        index.close().unwrap();
    }

    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
    assert_eq!(index.gallery().unwrap().records(), records.as_slice());
}

#[test]
fn test_stored_gallery_with_wrong_joint_count() {
    let dir = tempdir().unwrap();
    {
        let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
        index.submit_gallery(vec![record("a.jpg", 0.1)]).unwrap();
    }

    let index = PoseIndex::open(
        dir.path(),
        Config {
            sync_mode: SyncMode::Fast,
            ..Config::with_joint_count(3)
        },
    )
    .unwrap();
    assert!(index.build_index().unwrap_err().is_validation());
}

// ============================================================================
// File format
// ============================================================================

#[test]
fn test_reads_ingestion_gallery_file() {
    let dir = tempdir().unwrap();
    let json = r#"[
        {"image": "mountain.jpg", "vectorXY": [0.1, 0.2, 0.3, 0.4], "vectorConfidence": [0.9, 0.8]},
        {"image": "warrior-2.jpg", "vectorXY": [0.5, 0.6, 0.7, 0.8], "vectorConfidence": [1.0, 0.0]}
    ]"#;
    std::fs::write(dir.path().join("posedata.json"), json).unwrap();

    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
    let gallery = index.gallery().unwrap();
    assert_eq!(gallery.len(), 2);
    assert_eq!(gallery.get(0).unwrap().identifier, "mountain.jpg");
    assert_eq!(gallery.get(1).unwrap().confidence, vec![1.0, 0.0]);

    index.build_index().unwrap();
    let pose = PoseVector::new(vec![0.5, 0.6, 0.7, 0.8], vec![1.0, 1.0]);
    let best = index.query(&pose, 1).unwrap();
    assert_eq!(best[0].identifier, "warrior-2.jpg");
    assert_eq!(best[0].distance, 0.0);
}

#[test]
fn test_written_gallery_uses_ingestion_field_names() {
    let dir = tempdir().unwrap();
    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
    index.submit_gallery(vec![record("a.jpg", 0.25)]).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("posedata.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &value[0];
    assert_eq!(first["image"], "a.jpg");
    assert_eq!(first["vectorXY"].as_array().unwrap().len(), 4);
    assert_eq!(first["vectorConfidence"].as_array().unwrap().len(), 2);
}

#[test]
fn test_malformed_gallery_file_is_corrupted() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("posedata.json"), b"{ not json").unwrap();

    let index = PoseIndex::open(dir.path(), two_joint_config()).unwrap();
    let err = index.gallery().unwrap_err();
    assert!(err.is_storage());
}
