//! Vantage-point tree construction.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; the root is node 0.
//! Each node stores one gallery position (its vantage point), the median
//! distance from that vantage point to the rest of its subset, and up to two
//! children:
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │ vantage v, threshold μ│
//!                 └──────────┬───────────┘
//!            D(v, x) ≤ μ     │     D(v, x) > μ
//!          ┌─────────────────┴────────────────┐
//!     ┌────┴────┐                        ┌────┴────┐
//!     │ inside  │                        │ outside │
//!     └─────────┘                        └─────────┘
//! ```
//!
//! Every gallery position is the vantage point of exactly one node, so a
//! tree over N records has exactly N nodes.
//!
//! # Bound scales
//!
//! A threshold is measured with the metric as seen from the vantage point.
//! Under [`WeightedDistance`] every record weighs joints by its own
//! confidences, so a bound derived at vantage `v` only transfers to a
//! record `x` below it after scaling by `ρ = min_j w_x,j / w_v,j`. Each
//! node keeps the smallest such factor over its subtree, relative to its
//! parent's vantage point. Scales are derived from gallery confidences
//! alone (no distances), so a loaded tree gets them back without
//! touching the tree file.
//!
//! [`WeightedDistance`]: crate::index::WeightedDistance

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PoseIndexError, Result, ValidationError};
use crate::gallery::Gallery;
use crate::index::metric::{joint_weights, MetricKind, PoseMetric};

/// Index of a node in the tree arena.
pub type NodeId = u32;

/// One partition step of the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VpNode {
    /// Gallery position of this node's vantage point.
    pub vantage: u32,
    /// Median distance from the vantage point to the rest of the subset.
    /// Zero for leaves.
    pub threshold: f64,
    /// Child covering points with `distance <= threshold`.
    pub inside: Option<NodeId>,
    /// Child covering points with `distance > threshold`.
    pub outside: Option<NodeId>,
}

impl VpNode {
    fn leaf(vantage: u32) -> Self {
        Self {
            vantage,
            threshold: 0.0,
            inside: None,
            outside: None,
        }
    }

    /// Returns true if the node has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.inside.is_none() && self.outside.is_none()
    }
}

/// An immutable vantage-point tree over one gallery.
///
/// The tree holds no vector data; it is only meaningful together with the
/// gallery it was built from (same length, same order).
#[derive(Clone, Debug, PartialEq)]
pub struct VpTree {
    nodes: Vec<VpNode>,
    record_count: usize,
    metric: MetricKind,
    /// Per node, the factor applied to a pruning bound computed at its
    /// parent. Empty until bound to a gallery.
    bound_scales: Vec<f64>,
}

/// A subset of gallery positions waiting to become the node at `slot`.
struct Pending {
    slot: usize,
    subset: Vec<u32>,
}

impl VpTree {
    /// Builds a tree over every record in `gallery`.
    ///
    /// The vantage point of each subset is its lowest gallery position.
    /// The threshold is the lower median of the distances from the vantage
    /// point to the other members; members at exactly the threshold go
    /// inside. The same gallery and metric always produce the same tree.
    ///
    /// # Errors
    ///
    /// - [`PoseIndexError::EmptyGallery`] if the gallery has no records
    /// - a validation error if the metric rejects a pair of records
    pub fn build(gallery: &Gallery, metric: &dyn PoseMetric) -> Result<Self> {
        let n = gallery.len();
        if n == 0 {
            return Err(PoseIndexError::EmptyGallery);
        }
        if n > u32::MAX as usize {
            return Err(ValidationError::invalid_field(
                "gallery",
                format!("{} records exceeds the supported maximum of {}", n, u32::MAX),
            )
            .into());
        }

        let placeholder = VpNode::leaf(0);
        let mut nodes: Vec<VpNode> = Vec::with_capacity(n);
        nodes.push(placeholder.clone());

        // Explicit stack: galleries full of duplicate poses degenerate into
        // chains as deep as the gallery is long.
        let mut stack = vec![Pending {
            slot: 0,
            subset: (0..n as u32).collect(),
        }];

        while let Some(Pending { slot, subset }) = stack.pop() {
            let Some((&vantage, rest)) = subset.split_first() else {
                continue;
            };
            if rest.is_empty() {
                nodes[slot] = VpNode::leaf(vantage);
                continue;
            }

            let reference = gallery.view(vantage as usize);
            let mut scored = rest
                .iter()
                .map(|&i| Ok((metric.distance(reference, gallery.view(i as usize))?, i)))
                .collect::<Result<Vec<(f64, u32)>>>()?;
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let threshold = scored[(scored.len() - 1) / 2].0;
            let split = scored.partition_point(|&(d, _)| d <= threshold);

            let mut inside: Vec<u32> = scored[..split].iter().map(|&(_, i)| i).collect();
            let mut outside: Vec<u32> = scored[split..].iter().map(|&(_, i)| i).collect();
            inside.sort_unstable();
            outside.sort_unstable();

            let mut child = |subset: Vec<u32>, nodes: &mut Vec<VpNode>| -> Option<NodeId> {
                if subset.is_empty() {
                    return None;
                }
                let id = nodes.len();
                nodes.push(placeholder.clone());
                stack.push(Pending { slot: id, subset });
                Some(id as NodeId)
            };
            let inside_id = child(inside, &mut nodes);
            let outside_id = child(outside, &mut nodes);

            nodes[slot] = VpNode {
                vantage,
                threshold,
                inside: inside_id,
                outside: outside_id,
            };
        }

        let bound_scales = bound_scales(&nodes, gallery, metric.kind());
        let tree = Self {
            nodes,
            record_count: n,
            metric: metric.kind(),
            bound_scales,
        };
        debug!(
            records = n,
            depth = tree.depth(),
            metric = %tree.metric,
            "VP-tree built"
        );
        Ok(tree)
    }

    /// Assembles a tree from decoded parts. Until
    /// [`with_bound_scales`](Self::with_bound_scales) is called every scale
    /// reads as 0, which disables pruning.
    pub(crate) fn from_parts(nodes: Vec<VpNode>, record_count: usize, metric: MetricKind) -> Self {
        Self {
            nodes,
            record_count,
            metric,
            bound_scales: Vec::new(),
        }
    }

    /// Derives the bound scales from `gallery`.
    ///
    /// The structure must already be validated against `gallery`: a single
    /// root-reachable tree whose vantage points are all in range.
    pub(crate) fn with_bound_scales(mut self, gallery: &Gallery) -> Self {
        self.bound_scales = bound_scales(&self.nodes, gallery, self.metric);
        self
    }

    /// Factor applied to a pruning bound computed at the parent of `id`.
    ///
    /// A record `x` below `id` is at least `scale * bound` from the query
    /// whenever the parent's metric puts it at least `bound` away.
    #[inline]
    pub fn bound_scale(&self, id: NodeId) -> f64 {
        self.bound_scales.get(id as usize).copied().unwrap_or(0.0)
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> &VpNode {
        &self.nodes[0]
    }

    /// The node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &VpNode {
        &self.nodes[id as usize]
    }

    /// All nodes in arena order.
    #[inline]
    pub fn nodes(&self) -> &[VpNode] {
        &self.nodes
    }

    /// Number of nodes (equal to the record count).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least one node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of gallery records the tree was built over.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Metric the thresholds were computed with.
    #[inline]
    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut queue = VecDeque::from([(0 as NodeId, 1usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            deepest = deepest.max(depth);
            let node = self.node(id);
            for child in [node.inside, node.outside].into_iter().flatten() {
                queue.push_back((child, depth + 1));
            }
        }
        deepest
    }
}

/// Computes the scale of every node relative to its parent.
///
/// For the weighted metric this is `min_j m_c,j / w_v,j` over joints the
/// parent weighs, where `w_v` are the parent vantage's normalized weights
/// and `m_c` the per-joint minimum of normalized weights over the child's
/// subtree. The cosine metric does not depend on the reference, so every
/// scale is 1.
fn bound_scales(nodes: &[VpNode], gallery: &Gallery, metric: MetricKind) -> Vec<f64> {
    let joints = gallery.joint_count();
    if metric == MetricKind::Cosine || joints == 0 || nodes.is_empty() {
        return vec![1.0; nodes.len()];
    }

    // Preorder from the root; reversed it visits children before parents.
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<NodeId> = vec![0];
    while let Some(id) = stack.pop() {
        order.push(id);
        let node = &nodes[id as usize];
        stack.extend([node.inside, node.outside].into_iter().flatten());
    }

    let weights_of = |id: NodeId| joint_weights(gallery.view(nodes[id as usize].vantage as usize).confidence);

    let mut mins = vec![0.0f64; nodes.len() * joints];
    for &id in order.iter().rev() {
        let base = id as usize * joints;
        mins[base..base + joints].copy_from_slice(&weights_of(id));

        let node = &nodes[id as usize];
        for child in [node.inside, node.outside].into_iter().flatten() {
            let child_base = child as usize * joints;
            for j in 0..joints {
                mins[base + j] = mins[base + j].min(mins[child_base + j]);
            }
        }
    }

    let mut scales = vec![0.0f64; nodes.len()];
    scales[0] = 1.0;
    for &id in &order {
        let node = &nodes[id as usize];
        if node.is_leaf() {
            continue;
        }
        let parent = weights_of(id);
        for child in [node.inside, node.outside].into_iter().flatten() {
            let child_base = child as usize * joints;
            scales[child as usize] = parent
                .iter()
                .enumerate()
                .filter(|&(_, &w)| w > 0.0)
                .map(|(j, &w)| mins[child_base + j] / w)
                .fold(f64::INFINITY, f64::min)
                .min(1.0);
        }
    }
    scales
}
