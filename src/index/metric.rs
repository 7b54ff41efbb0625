//! Pose distance metrics.
//!
//! Every metric takes a **reference** pose (a gallery record) first and a
//! **query** second. The weighted metric reads its weights from the
//! reference only, so the argument order is part of the contract: tree
//! construction calls `distance(vantage, other)`, search calls
//! `distance(vantage, query)`, and the linear scan calls
//! `distance(record, query)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::types::PoseView;

/// A dissimilarity function between two poses.
///
/// Implementations must be pure, deterministic, and return a finite value
/// `>= 0` for any pair of equally shaped, finite poses.
pub trait PoseMetric: Send + Sync {
    /// Identifies the metric in persisted trees.
    fn kind(&self) -> MetricKind;

    /// Distance from `reference` to `query`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidVectorShape` if the two poses have
    /// different coordinate or confidence lengths, or if a pose's
    /// coordinates are not exactly twice its confidences.
    fn distance(&self, reference: PoseView<'_>, query: PoseView<'_>) -> Result<f64>;
}

/// Selects one of the built-in metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Confidence-weighted mean absolute joint displacement.
    #[default]
    Weighted,

    /// Chord distance between coordinate vectors on the unit sphere.
    Cosine,
}

impl MetricKind {
    /// Returns the metric implementation for this kind.
    pub fn metric(&self) -> &'static dyn PoseMetric {
        match self {
            Self::Weighted => &WeightedDistance,
            Self::Cosine => &CosineDistance,
        }
    }

    /// Stable lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::Cosine => "cosine",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Confidence-weighted distance.
///
/// ```text
/// D(ref, query) = Σ_j c_j · (|ref.x_j − query.x_j| + |ref.y_j − query.y_j|) / Σ_j c_j
/// ```
///
/// with `c = ref.confidence`. Joints the reference pose is unsure about
/// contribute little; the query's own confidences are ignored. When every
/// reference confidence is zero, all joints are weighted equally.
///
/// Not symmetric. For a fixed reference it is a weighted L1 distance, so it
/// obeys the triangle inequality among poses compared under the same
/// weights. Between two references `x` and `v` the distances differ at
/// most by the smallest per-joint weight ratio: `D(x, q) >= ρ · D_v(x, q)`
/// with `ρ = min_j w_x,j / w_v,j`, which is what keeps tree search exact
/// over galleries with per-record confidences.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedDistance;

impl PoseMetric for WeightedDistance {
    fn kind(&self) -> MetricKind {
        MetricKind::Weighted
    }

    fn distance(&self, reference: PoseView<'_>, query: PoseView<'_>) -> Result<f64> {
        check_shapes(reference, query)?;

        let joints = reference.confidence.len();
        if joints == 0 {
            return Ok(0.0);
        }

        let total: f64 = reference.confidence.iter().map(|&c| f64::from(c)).sum();
        let displacement = reference
            .coordinates
            .chunks_exact(2)
            .zip(query.coordinates.chunks_exact(2))
            .map(|(r, p)| {
                (f64::from(r[0]) - f64::from(p[0])).abs() + (f64::from(r[1]) - f64::from(p[1])).abs()
            });

        if total > 0.0 {
            let weighted: f64 = displacement
                .zip(reference.confidence.iter())
                .map(|(d, &c)| f64::from(c) * d)
                .sum();
            Ok(weighted / total)
        } else {
            Ok(displacement.sum::<f64>() / joints as f64)
        }
    }
}

/// Normalized joint weights [`WeightedDistance`] applies when `confidence`
/// belongs to the reference pose. They sum to 1 unless `confidence` is
/// empty.
pub(crate) fn joint_weights(confidence: &[f32]) -> Vec<f64> {
    let total: f64 = confidence.iter().map(|&c| f64::from(c)).sum();
    if total > 0.0 {
        confidence.iter().map(|&c| f64::from(c) / total).collect()
    } else {
        vec![1.0 / confidence.len() as f64; confidence.len()]
    }
}

/// Cosine-based distance on coordinates only.
///
/// ```text
/// D(a, b) = sqrt(2 · (1 − cos(a.xy, b.xy)))
/// ```
///
/// Symmetric and a true metric (the Euclidean distance between the
/// normalized vectors). Confidences are ignored. Two zero vectors are at
/// distance 0; a zero vector is at `√2` from everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct CosineDistance;

impl PoseMetric for CosineDistance {
    fn kind(&self) -> MetricKind {
        MetricKind::Cosine
    }

    fn distance(&self, reference: PoseView<'_>, query: PoseView<'_>) -> Result<f64> {
        check_shapes(reference, query)?;

        let mut dot = 0.0f64;
        let mut norm_r = 0.0f64;
        let mut norm_p = 0.0f64;
        for (&r, &p) in reference.coordinates.iter().zip(query.coordinates) {
            let (r, p) = (f64::from(r), f64::from(p));
            dot += r * p;
            norm_r += r * r;
            norm_p += p * p;
        }

        match (norm_r == 0.0, norm_p == 0.0) {
            (true, true) => Ok(0.0),
            (true, false) | (false, true) => Ok(std::f64::consts::SQRT_2),
            (false, false) => {
                let cosine = (dot / (norm_r.sqrt() * norm_p.sqrt())).clamp(-1.0, 1.0);
                Ok((2.0 * (1.0 - cosine)).max(0.0).sqrt())
            }
        }
    }
}

fn check_shapes(reference: PoseView<'_>, query: PoseView<'_>) -> std::result::Result<(), ValidationError> {
    if reference.coordinates.len() != reference.confidence.len() * 2 {
        return Err(ValidationError::vector_shape(
            "reference.coordinates",
            reference.confidence.len() * 2,
            reference.coordinates.len(),
        ));
    }
    if query.coordinates.len() != reference.coordinates.len() {
        return Err(ValidationError::vector_shape(
            "query.coordinates",
            reference.coordinates.len(),
            query.coordinates.len(),
        ));
    }
    if query.confidence.len() != reference.confidence.len() {
        return Err(ValidationError::vector_shape(
            "query.confidence",
            reference.confidence.len(),
            query.confidence.len(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(xy: &'a [f32], c: &'a [f32]) -> PoseView<'a> {
        PoseView::new(xy, c)
    }

    #[test]
    fn test_weighted_identical_is_zero() {
        let xy = [0.1, 0.2, 0.3, 0.4];
        let c = [0.9, 0.2];
        let d = WeightedDistance.distance(view(&xy, &c), view(&xy, &c)).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_weighted_formula() {
        // joint 0 moves by (1, 0), joint 1 by (0, 2)
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0, 2.0];
        let c = [0.75, 0.25];
        let d = WeightedDistance.distance(view(&a, &c), view(&b, &[1.0, 1.0])).unwrap();
        // (0.75 * 1 + 0.25 * 2) / 1.0
        assert!((d - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_uses_reference_confidence_only() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0, 2.0];
        let ca = [1.0, 0.0];
        let cb = [0.0, 1.0];
        let ab = WeightedDistance.distance(view(&a, &ca), view(&b, &cb)).unwrap();
        let ba = WeightedDistance.distance(view(&b, &cb), view(&a, &ca)).unwrap();
        assert!((ab - 1.0).abs() < 1e-12);
        assert!((ba - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_zero_confidence_falls_back_to_uniform() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0, 3.0];
        let zero = [0.0, 0.0];
        let d = WeightedDistance.distance(view(&a, &zero), view(&b, &zero)).unwrap();
        assert!((d - 2.0).abs() < 1e-12);
        assert!(d.is_finite());
    }

    #[test]
    fn test_weighted_shape_mismatch() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [0.0, 0.0];
        let c = [1.0, 1.0];
        let err = WeightedDistance
            .distance(view(&a, &c), view(&b, &[1.0]))
            .unwrap_err();
        assert!(err.is_validation());

        let odd = [0.0, 0.0, 0.0];
        assert!(WeightedDistance
            .distance(view(&odd, &c), view(&odd, &c))
            .is_err());
    }

    #[test]
    fn test_cosine_properties() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let neg = [-1.0, 0.0];
        let c = [1.0];

        let same = CosineDistance.distance(view(&a, &c), view(&a, &c)).unwrap();
        assert!(same < 1e-6);

        let orthogonal = CosineDistance.distance(view(&a, &c), view(&b, &c)).unwrap();
        assert!((orthogonal - std::f64::consts::SQRT_2).abs() < 1e-12);

        let opposite = CosineDistance.distance(view(&a, &c), view(&neg, &c)).unwrap();
        assert!((opposite - 2.0).abs() < 1e-12);

        let ba = CosineDistance.distance(view(&b, &c), view(&a, &c)).unwrap();
        assert_eq!(orthogonal, ba);
    }

    #[test]
    fn test_cosine_ignores_scale() {
        let a = [1.0, 2.0];
        let b = [2.0, 4.0];
        let c = [0.5];
        let d = CosineDistance.distance(view(&a, &c), view(&b, &c)).unwrap();
        assert!(d < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vectors() {
        let zero = [0.0, 0.0];
        let a = [1.0, 0.0];
        let c = [1.0];
        assert_eq!(
            CosineDistance.distance(view(&zero, &c), view(&zero, &c)).unwrap(),
            0.0
        );
        assert_eq!(
            CosineDistance.distance(view(&zero, &c), view(&a, &c)).unwrap(),
            std::f64::consts::SQRT_2
        );
    }

    #[test]
    fn test_joint_weights_are_normalized() {
        let w = joint_weights(&[0.5, 1.5, 0.0]);
        assert_eq!(w, vec![0.25, 0.75, 0.0]);

        let uniform = joint_weights(&[0.0, 0.0]);
        assert_eq!(uniform, vec![0.5, 0.5]);
    }

    #[test]
    fn test_metric_kind_dispatch() {
        assert_eq!(MetricKind::Weighted.metric().kind(), MetricKind::Weighted);
        assert_eq!(MetricKind::Cosine.metric().kind(), MetricKind::Cosine);
        assert_eq!(MetricKind::Cosine.to_string(), "cosine");
        assert_eq!(MetricKind::default(), MetricKind::Weighted);
    }
}
