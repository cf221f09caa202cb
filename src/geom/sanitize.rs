//! Point intake and spatial-hash deduplication.
//!
//! Only identity filtering happens here. Non-finite coordinates pass through
//! untouched and are partitioned out later by the conditioner, so the
//! conditioner can report exactly which kind of invalid value was present.

use std::collections::HashSet;

use super::core::{GroundPoint, Tolerance};
use super::error::{GroundMeshError, GroundMeshResult};

/// Points that survived deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedPoints {
    pub points: Vec<GroundPoint>,
    /// `original_indices[i]` is the caller-buffer index of `points[i]`.
    pub original_indices: Vec<usize>,
    pub duplicate_count: usize,
}

/// Read `count` points from a flat xyz buffer.
///
/// When `heights` is given, entry `i` replaces the `y` of point `i` if it is
/// present and finite.
pub fn points_from_buffer(
    positions: &[f64],
    count: usize,
    heights: Option<&[f64]>,
) -> GroundMeshResult<Vec<GroundPoint>> {
    let expected = count.saturating_mul(3);
    if positions.len() < expected {
        return Err(GroundMeshError::BufferTooShort {
            expected,
            actual: positions.len(),
        });
    }

    let points = positions[..expected]
        .chunks_exact(3)
        .enumerate()
        .map(|(i, xyz)| {
            let y = heights
                .and_then(|h| h.get(i).copied())
                .filter(|h| h.is_finite())
                .unwrap_or(xyz[1]);
            GroundPoint::new(xyz[0], y, xyz[2], i)
        })
        .collect();

    Ok(points)
}

/// Same as [`points_from_buffer`] for single-precision buffers.
pub fn points_from_f32_buffer(
    positions: &[f32],
    count: usize,
    heights: Option<&[f32]>,
) -> GroundMeshResult<Vec<GroundPoint>> {
    let positions: Vec<f64> = positions.iter().map(|&v| f64::from(v)).collect();
    let heights: Option<Vec<f64>> = heights.map(|h| h.iter().map(|&v| f64::from(v)).collect());
    points_from_buffer(&positions, count, heights.as_deref())
}

/// Drop every point whose `(floor(x/eps), floor(z/eps))` cell is already taken.
///
/// The first point in a cell wins; later ones are discarded, never averaged.
/// Input order is preserved, so running this twice is a no-op.
#[must_use]
pub fn deduplicate(points: &[GroundPoint], tol: Tolerance) -> SanitizedPoints {
    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(points.len());
    let mut kept = Vec::with_capacity(points.len());

    for point in points {
        match point.planar_cell(tol.eps) {
            Some(cell) => {
                if seen.insert(cell) {
                    kept.push(*point);
                }
            }
            None => kept.push(*point),
        }
    }

    let duplicate_count = points.len() - kept.len();
    let original_indices = kept.iter().map(|p| p.original_index).collect();

    SanitizedPoints {
        points: kept,
        original_indices,
        duplicate_count,
    }
}

/// Read, deduplicate and check the minimum point count in one go.
pub fn sanitize(
    positions: &[f64],
    count: usize,
    heights: Option<&[f64]>,
    tol: Tolerance,
) -> GroundMeshResult<SanitizedPoints> {
    let points = points_from_buffer(positions, count, heights)?;
    let sanitized = deduplicate(&points, tol);

    log::debug!(
        "sanitize: {} points read, {} duplicates removed",
        points.len(),
        sanitized.duplicate_count
    );

    if sanitized.points.len() < 3 {
        return Err(GroundMeshError::insufficient(
            sanitized.points.len(),
            "deduplication",
        ));
    }

    Ok(sanitized)
}
