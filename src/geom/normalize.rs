//! Planar coordinate normalization ahead of triangulation.
//!
//! The Delaunay primitive performs no input sanitization, so coordinates are
//! centered on the bounding-box midpoint and rescaled into a range where its
//! orientation predicates stay well-conditioned.

use serde::Serialize;

use super::core::{GroundBounds, GroundPoint, Tolerance};

const LARGE_SPREAD: f64 = 1e6;
const SMALL_SPREAD: f64 = 1e-3;
const EXTREME_ASPECT: f64 = 1e-6;

/// The centering offset and uniform scale applied to (x, z).
///
/// Kept for diagnostics only; meshes are assembled from un-normalized points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizationTransform {
    pub offset_x: f64,
    pub offset_z: f64,
    pub scale: f64,
}

impl NormalizationTransform {
    #[must_use]
    pub fn apply(&self, x: f64, z: f64) -> (f64, f64) {
        ((x - self.offset_x) * self.scale, (z - self.offset_z) * self.scale)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCoordinates {
    /// Flat `[x0, z0, x1, z1, ...]` buffer in point order.
    pub coords: Vec<f64>,
    pub transform: NormalizationTransform,
    /// Points whose normalized coordinates overflowed and were zeroed.
    pub overflowed: usize,
}

impl NormalizedCoordinates {
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.coords.len() / 2
    }
}

/// Pick the uniform scale for a bounding box.
#[must_use]
pub fn choose_scale(bounds: &GroundBounds, tol: Tolerance) -> f64 {
    let max_spread = bounds.max_spread();
    let mut scale = if max_spread > LARGE_SPREAD {
        1e-6
    } else if max_spread > 0.0 && max_spread < SMALL_SPREAD {
        1e3
    } else {
        1.0
    };

    if max_spread > 0.0 {
        let aspect = bounds.min_spread() / max_spread;
        if aspect < EXTREME_ASPECT {
            scale *= 1.0 + aspect;
        }

        let normalized_spread = max_spread * scale;
        if normalized_spread < tol.eps {
            scale *= tol.eps / normalized_spread;
        }
    }

    scale
}

#[inline]
fn snap(value: f64) -> f64 {
    if Tolerance::SNAP.approx_zero_f64(value) { 0.0 } else { value }
}

/// Center and scale the planar projection of `points`.
#[must_use]
pub fn normalize(points: &[GroundPoint], bounds: &GroundBounds, tol: Tolerance) -> NormalizedCoordinates {
    let (offset_x, offset_z) = bounds.center();
    let transform = NormalizationTransform {
        offset_x,
        offset_z,
        scale: choose_scale(bounds, tol),
    };

    let mut coords = Vec::with_capacity(points.len() * 2);
    let mut overflowed = 0;
    for p in points {
        let (x, z) = transform.apply(p.x, p.z);
        if x.is_finite() && z.is_finite() {
            coords.push(snap(x));
            coords.push(snap(z));
        } else {
            overflowed += 1;
            coords.push(0.0);
            coords.push(0.0);
        }
    }

    if overflowed > 0 {
        log::warn!("normalize: {overflowed} points overflowed and were reset to the origin");
    }

    NormalizedCoordinates {
        coords,
        transform,
        overflowed,
    }
}
