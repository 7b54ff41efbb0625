//! Branch-and-bound k-nearest-neighbor search over a [`VpTree`].
//!
//! The search keeps the best `k` candidates in a bounded max-heap keyed by
//! `(distance, gallery position)`. At every node the query is measured
//! against the vantage point, then each child is visited unless the
//! triangle-inequality bound proves nothing inside it can beat the current
//! worst candidate:
//!
//! ```text
//! inside  subtree: D(x, q) >= ρ · (d - threshold)
//! outside subtree: D(x, q) >= ρ · (threshold - d)
//! ```
//!
//! where `ρ` is the child's [bound scale](VpTree::bound_scale), covering
//! records whose confidences weigh joints differently from the vantage
//! point. [`linear_scan`] computes the same ranking by brute force and the
//! two always agree.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::{PoseIndexError, Result, ValidationError};
use crate::gallery::Gallery;
use crate::index::metric::PoseMetric;
use crate::index::tree::{NodeId, VpTree};
use crate::types::PoseView;

/// Relative slack applied to the pruning bound.
///
/// Floating-point rounding can break the triangle inequality by a few ulps
/// when points are collinear; the slack only ever causes extra visits.
const PRUNE_SLACK: f64 = 1e-9;

/// One ranked search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseMatch {
    /// Identifier of the matched gallery record.
    pub identifier: String,
    /// Position of the record in its gallery.
    pub index: usize,
    /// `D(record, query)`.
    pub distance: f64,
}

/// Work counters from a single search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Number of metric evaluations performed.
    pub distance_evaluations: usize,
    /// Number of subtrees skipped by the pruning bound.
    pub pruned_branches: usize,
}

/// A scored gallery position. Orders by distance, then position.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    distance: f64,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

/// The `k` smallest candidates seen so far.
struct BestK {
    heap: BinaryHeap<Candidate>,
    k: usize,
}

impl BestK {
    fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
            k,
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Distance a candidate must not exceed to enter the result.
    fn worst(&self) -> f64 {
        if self.heap.len() < self.k {
            f64::INFINITY
        } else {
            self.heap.peek().map_or(f64::INFINITY, |c| c.distance)
        }
    }

    fn into_matches(self, gallery: &Gallery) -> Vec<PoseMatch> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .filter_map(|c| {
                gallery.get(c.index as usize).map(|record| PoseMatch {
                    identifier: record.identifier.clone(),
                    index: c.index as usize,
                    distance: c.distance,
                })
            })
            .collect()
    }
}

/// Returns the `min(k, gallery.len())` records nearest to `query`,
/// ascending by distance with ties broken by gallery position.
///
/// # Errors
///
/// - `ValidationError::InvalidField` if `k == 0`
/// - [`PoseIndexError::InvalidQueryVector`] if the query shape differs from
///   the gallery's
/// - [`PoseIndexError::IndexCorpusMismatch`] if the tree was not built over
///   a gallery of this size
/// - [`PoseIndexError::Config`] if `metric` is not the metric the tree was
///   built with
pub fn search(
    tree: &VpTree,
    gallery: &Gallery,
    metric: &dyn PoseMetric,
    query: PoseView<'_>,
    k: usize,
) -> Result<Vec<PoseMatch>> {
    search_with_stats(tree, gallery, metric, query, k).map(|(matches, _)| matches)
}

/// Like [`search`], also returning how much work the search did.
pub fn search_with_stats(
    tree: &VpTree,
    gallery: &Gallery,
    metric: &dyn PoseMetric,
    query: PoseView<'_>,
    k: usize,
) -> Result<(Vec<PoseMatch>, SearchStats)> {
    check_k(k)?;
    check_query_shape(gallery, query)?;
    if tree.record_count() != gallery.len() {
        return Err(PoseIndexError::corpus_mismatch(
            format!("tree was built over {} records", tree.record_count()),
            gallery.len(),
        ));
    }
    if tree.metric() != metric.kind() {
        return Err(PoseIndexError::config(format!(
            "tree was built with the {} metric, searched with {}",
            tree.metric(),
            metric.kind()
        )));
    }

    let mut best = BestK::new(k);
    let mut stats = SearchStats::default();

    // (node, lower bound on D(x, query) for every x in its subtree)
    let mut stack: Vec<(NodeId, f64)> = vec![(0, f64::NEG_INFINITY)];

    while let Some((id, gap)) = stack.pop() {
        let worst = best.worst();
        if gap > worst + worst.abs() * PRUNE_SLACK {
            stats.pruned_branches += 1;
            continue;
        }

        let node = tree.node(id);
        let d = metric.distance(gallery.view(node.vantage as usize), query)?;
        stats.distance_evaluations += 1;
        best.offer(Candidate {
            distance: d,
            index: node.vantage,
        });

        let inside = node
            .inside
            .map(|child| (child, tree.bound_scale(child) * (d - node.threshold)));
        let outside = node
            .outside
            .map(|child| (child, tree.bound_scale(child) * (node.threshold - d)));

        // Push the farther side first so the nearer side is explored first
        // and tightens the bound sooner.
        let (near, far) = if d <= node.threshold {
            (inside, outside)
        } else {
            (outside, inside)
        };
        stack.extend(far);
        stack.extend(near);
    }

    Ok((best.into_matches(gallery), stats))
}

/// Brute-force reference ranking: computes `D(record, query)` for every
/// record and keeps the `k` smallest.
///
/// An empty gallery yields an empty result.
pub fn linear_scan(
    gallery: &Gallery,
    metric: &dyn PoseMetric,
    query: PoseView<'_>,
    k: usize,
) -> Result<Vec<PoseMatch>> {
    check_k(k)?;
    check_query_shape(gallery, query)?;

    let mut best = BestK::new(k);
    for position in 0..gallery.len() {
        let distance = metric.distance(gallery.view(position), query)?;
        best.offer(Candidate {
            distance,
            index: position as u32,
        });
    }
    Ok(best.into_matches(gallery))
}

fn check_k(k: usize) -> std::result::Result<(), ValidationError> {
    if k == 0 {
        return Err(ValidationError::invalid_field("k", "must be at least 1"));
    }
    Ok(())
}

fn check_query_shape(gallery: &Gallery, query: PoseView<'_>) -> Result<()> {
    let joints = gallery.joint_count();
    if query.coordinates.len() != joints * 2 {
        return Err(PoseIndexError::invalid_query(
            "coordinates",
            joints * 2,
            query.coordinates.len(),
        ));
    }
    if query.confidence.len() != joints {
        return Err(PoseIndexError::invalid_query(
            "confidence",
            joints,
            query.confidence.len(),
        ));
    }
    Ok(())
}
