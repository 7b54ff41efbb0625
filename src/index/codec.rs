//! Binary encoding of the tree skeleton.
//!
//! A tree file carries only structure: vantage positions, thresholds and
//! child links. It never duplicates gallery vectors, so it is validated
//! against the gallery it is paired with on every load.
//!
//! ```text
//! offset  size  field
//! 0       8     magic "PMVPTREE"
//! 8       4     format version (u32 LE)
//! 12      ..    bincode body (fixed-width ints, little endian)
//!               record_count: u64
//!               metric:       MetricKind
//!               nodes:        [VpNode]
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PoseIndexError, Result, StorageError};
use crate::gallery::Gallery;
use crate::index::metric::MetricKind;
use crate::index::tree::{VpNode, VpTree};
use crate::storage::schema::{TREE_FORMAT_VERSION, TREE_MAGIC};

const HEADER_LEN: usize = TREE_MAGIC.len() + 4;

#[derive(Serialize)]
struct TreeBodyRef<'a> {
    record_count: u64,
    metric: MetricKind,
    nodes: &'a [VpNode],
}

#[derive(Deserialize)]
struct TreeBody {
    record_count: u64,
    metric: MetricKind,
    nodes: Vec<VpNode>,
}

/// Serializes a tree's skeleton.
pub fn encode_tree(tree: &VpTree) -> Result<Vec<u8>> {
    let body = TreeBodyRef {
        record_count: tree.record_count() as u64,
        metric: tree.metric(),
        nodes: tree.nodes(),
    };
    let encoded = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .serialize(&body)?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + encoded.len());
    bytes.extend_from_slice(TREE_MAGIC);
    bytes.extend_from_slice(&TREE_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&encoded);
    Ok(bytes)
}

/// Deserializes a tree and validates it against `gallery`, searched with
/// `metric`.
///
/// Distances are never recomputed; the stored thresholds are trusted once
/// the structure checks pass. The tree's bound scales are derived from the
/// gallery's confidences.
///
/// # Errors
///
/// Checked in this order:
/// 1. bad magic or truncated header → `StorageError::Corrupted`;
///    unknown version → `StorageError::FormatVersionMismatch`
/// 2. undecodable body → `StorageError::Corrupted`
/// 3. an empty gallery → [`PoseIndexError::EmptyGallery`];
///    a vantage position `>= gallery.len()` → `IndexCorpusMismatch`
/// 4. stored record count `!= gallery_size` → `IndexCorpusMismatch`
/// 5. stored metric differs from `metric` → `StorageError::MetricMismatch`
/// 6. malformed structure (dangling or shared children, unreachable
///    nodes, repeated vantage points, bad thresholds) →
///    `StorageError::Corrupted`
pub fn decode_tree(bytes: &[u8], gallery: &Gallery, metric: MetricKind) -> Result<VpTree> {
    let body = decode_body(bytes)?;
    let gallery_size = gallery.len();

    if gallery.is_empty() {
        warn!(nodes = body.nodes.len(), "Tree paired with an empty gallery");
        return Err(PoseIndexError::EmptyGallery);
    }

    if let Some(node) = body
        .nodes
        .iter()
        .find(|n| n.vantage as usize >= gallery_size)
    {
        warn!(
            vantage = node.vantage,
            gallery_size, "Tree references a record outside the gallery"
        );
        return Err(PoseIndexError::corpus_mismatch(
            format!("vantage index {} out of range", node.vantage),
            gallery_size,
        ));
    }

    if body.record_count != gallery_size as u64 {
        warn!(
            record_count = body.record_count,
            gallery_size, "Tree was built over a different gallery"
        );
        return Err(PoseIndexError::corpus_mismatch(
            format!("tree was built over {} records", body.record_count),
            gallery_size,
        ));
    }

    if body.metric != metric {
        return Err(StorageError::MetricMismatch {
            expected: metric.to_string(),
            found: body.metric.to_string(),
        }
        .into());
    }

    check_structure(&body.nodes, gallery_size)?;

    Ok(VpTree::from_parts(body.nodes, gallery_size, body.metric).with_bound_scales(gallery))
}

fn decode_body(bytes: &[u8]) -> std::result::Result<TreeBody, StorageError> {
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::corrupted(format!(
            "tree file truncated: {} bytes",
            bytes.len()
        )));
    }
    let (magic, rest) = bytes.split_at(TREE_MAGIC.len());
    if magic != TREE_MAGIC {
        return Err(StorageError::corrupted("not a tree file (bad magic)"));
    }
    let (version, body) = rest.split_at(4);
    let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
    if version != TREE_FORMAT_VERSION {
        return Err(StorageError::FormatVersionMismatch {
            expected: TREE_FORMAT_VERSION,
            found: version,
        });
    }

    // The limit stops a forged length prefix from allocating more than the
    // file could possibly hold.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(body.len() as u64)
        .reject_trailing_bytes()
        .deserialize::<TreeBody>(body)
        .map_err(|e| StorageError::corrupted(format!("tree body: {}", e)))
}

fn check_structure(nodes: &[VpNode], gallery_size: usize) -> std::result::Result<(), StorageError> {
    if nodes.is_empty() {
        return Err(StorageError::corrupted("tree has no nodes"));
    }
    if nodes.len() != gallery_size {
        return Err(StorageError::corrupted(format!(
            "tree has {} nodes for {} records",
            nodes.len(),
            gallery_size
        )));
    }

    let mut reached = vec![false; nodes.len()];
    let mut vantage_seen = vec![false; gallery_size];
    let mut stack = vec![0usize];
    reached[0] = true;

    while let Some(id) = stack.pop() {
        let node = &nodes[id];

        if !node.threshold.is_finite() || node.threshold < 0.0 {
            return Err(StorageError::corrupted(format!(
                "node {} has invalid threshold {}",
                id, node.threshold
            )));
        }

        let vantage = node.vantage as usize;
        if vantage_seen[vantage] {
            return Err(StorageError::corrupted(format!(
                "record {} is the vantage point of more than one node",
                vantage
            )));
        }
        vantage_seen[vantage] = true;

        for child in [node.inside, node.outside].into_iter().flatten() {
            let child = child as usize;
            if child >= nodes.len() {
                return Err(StorageError::corrupted(format!(
                    "node {} links to missing node {}",
                    id, child
                )));
            }
            if reached[child] {
                return Err(StorageError::corrupted(format!(
                    "node {} is linked more than once",
                    child
                )));
            }
            reached[child] = true;
            stack.push(child);
        }
    }

    if let Some(orphan) = reached.iter().position(|&r| !r) {
        return Err(StorageError::corrupted(format!(
            "node {} is unreachable from the root",
            orphan
        )));
    }

    Ok(())
}
