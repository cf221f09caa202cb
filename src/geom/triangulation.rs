//! Adapter around the external 2D Delaunay primitive.
//!
//! The primitive is trusted for nothing: every call is retried across numeric
//! representations of the same coordinates, and every result is checked for
//! index range and buffer shape before it is accepted.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;

use super::core::{GroundBounds, GroundPoint, Tolerance};
use super::error::{GroundMeshError, GroundMeshResult, TriangulationFailureKind};
use super::normalize::{NormalizedCoordinates, normalize};

const ROUNDING_GRID: f64 = 1e9;

/// Raw output of a Delaunay primitive, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTriangulation {
    /// Flat vertex-index triples.
    pub triangles: Vec<usize>,
    /// Half-edge adjacency, when the primitive exposes it.
    pub halfedges: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// A 2D Delaunay triangulation primitive.
///
/// `coords` is a flat `[x0, y0, x1, y1, ...]` buffer; returned indices refer
/// to point positions in that buffer.
pub trait DelaunayBackend {
    fn triangulate(&self, coords: &[f64]) -> Result<RawTriangulation, BackendError>;
}

/// [`DelaunayBackend`] backed by the `delaunator` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelaunatorBackend;

impl DelaunayBackend for DelaunatorBackend {
    fn triangulate(&self, coords: &[f64]) -> Result<RawTriangulation, BackendError> {
        if coords.len() % 2 != 0 {
            return Err(BackendError(format!(
                "coordinate buffer length {} is not a multiple of 2",
                coords.len()
            )));
        }

        let points: Vec<delaunator::Point> = coords
            .chunks_exact(2)
            .map(|c| delaunator::Point { x: c[0], y: c[1] })
            .collect();

        let triangulation = catch_unwind(AssertUnwindSafe(|| delaunator::triangulate(&points)))
            .map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "delaunator panicked".to_string());
                BackendError(message)
            })?;

        Ok(RawTriangulation {
            triangles: triangulation.triangles,
            halfedges: Some(triangulation.halfedges),
        })
    }
}

/// Numeric forms of the same coordinates handed to the primitive in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinateRepresentation {
    /// Coordinates as computed.
    Float64,
    /// Coordinates rounded through single precision.
    Float32,
    /// Coordinates snapped to a fixed decimal grid.
    Rounded,
}

impl CoordinateRepresentation {
    pub const ALL: [Self; 3] = [Self::Float64, Self::Float32, Self::Rounded];

    #[must_use]
    pub fn encode(self, coords: &[f64]) -> Vec<f64> {
        match self {
            Self::Float64 => coords.to_vec(),
            Self::Float32 => coords.iter().map(|&c| f64::from(c as f32)).collect(),
            Self::Rounded => coords
                .iter()
                .map(|&c| (c * ROUNDING_GRID).round() / ROUNDING_GRID)
                .collect(),
        }
    }
}

/// Outcome of one triangulation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TriangulationResult {
    Success {
        triangles: Vec<[u32; 3]>,
        point_count: usize,
        representation: CoordinateRepresentation,
    },
    Empty {
        point_count: usize,
        reason: String,
    },
    Error {
        point_count: usize,
        message: String,
        kind: TriangulationFailureKind,
    },
}

impl TriangulationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            Self::Success { point_count, .. }
            | Self::Empty { point_count, .. }
            | Self::Error { point_count, .. } => *point_count,
        }
    }

    /// `None` for a successful attempt.
    #[must_use]
    pub fn failure_kind(&self) -> Option<TriangulationFailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Empty { .. } => Some(TriangulationFailureKind::EmptyResult),
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Success { triangles, .. } => format!("{} triangles", triangles.len()),
            Self::Empty { reason, .. } => reason.clone(),
            Self::Error { message, .. } => message.clone(),
        }
    }

    /// Map a single attempt onto the error taxonomy.
    pub fn into_result(self) -> GroundMeshResult<Vec<[u32; 3]>> {
        match self {
            Self::Success { triangles, .. } => Ok(triangles),
            Self::Empty { point_count, reason } => {
                Err(GroundMeshError::TriangulationEmptyResult { point_count, reason })
            }
            Self::Error {
                point_count,
                message,
                kind: TriangulationFailureKind::EngineFailure,
            } => Err(GroundMeshError::TriangulationEngineFailure { point_count, message }),
            Self::Error {
                point_count,
                message,
                kind: TriangulationFailureKind::Malformed,
            } => Err(GroundMeshError::TriangulationMalformed { point_count, message }),
            Self::Error {
                message,
                kind: TriangulationFailureKind::Conditioning | TriangulationFailureKind::EmptyResult,
                ..
            } => Err(GroundMeshError::degenerate(message, None)),
        }
    }
}

/// Check the primitive's output against its contract.
#[must_use]
pub fn validate_triangulation(
    raw: RawTriangulation,
    point_count: usize,
    representation: CoordinateRepresentation,
) -> TriangulationResult {
    let malformed = |message: String| TriangulationResult::Error {
        point_count,
        message,
        kind: TriangulationFailureKind::Malformed,
    };

    if raw.triangles.len() % 3 != 0 {
        return malformed(format!(
            "triangle buffer length {} is not a multiple of 3",
            raw.triangles.len()
        ));
    }
    if let Some(&bad) = raw.triangles.iter().find(|&&i| i >= point_count) {
        return malformed(format!("triangle index {bad} out of range for {point_count} points"));
    }
    if let Some(halfedges) = &raw.halfedges {
        if halfedges.len() != raw.triangles.len() {
            return malformed(format!(
                "half-edge buffer length {} does not match triangle buffer length {}",
                halfedges.len(),
                raw.triangles.len()
            ));
        }
    }
    if raw.triangles.is_empty() {
        return TriangulationResult::Empty {
            point_count,
            reason: "primitive returned no triangles".to_string(),
        };
    }

    let triangles = raw
        .triangles
        .chunks_exact(3)
        .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
        .collect();

    TriangulationResult::Success {
        triangles,
        point_count,
        representation,
    }
}

/// Triangulate normalized coordinates, trying each representation in turn.
///
/// Stops at the first representation for which the primitive does not raise.
pub fn triangulate_normalized<B: DelaunayBackend + ?Sized>(
    backend: &B,
    normalized: &NormalizedCoordinates,
) -> TriangulationResult {
    let point_count = normalized.point_count();
    let mut failures = Vec::new();

    for representation in CoordinateRepresentation::ALL {
        let encoded = representation.encode(&normalized.coords);
        match backend.triangulate(&encoded) {
            Ok(raw) => {
                log::debug!(
                    "triangulate: {representation:?} accepted by primitive, {} indices",
                    raw.triangles.len()
                );
                return validate_triangulation(raw, point_count, representation);
            }
            Err(err) => {
                log::warn!("triangulate: primitive raised for {representation:?}: {err}");
                failures.push(format!("{representation:?}: {err}"));
            }
        }
    }

    TriangulationResult::Error {
        point_count,
        message: failures.join("; "),
        kind: TriangulationFailureKind::EngineFailure,
    }
}

/// Last-resort triangulation with the bounding-box corners added.
///
/// The four corners are appended after `points`, the combined set is
/// triangulated, and every triangle touching a corner is discarded.
pub fn triangulate_with_corner_fallback<B: DelaunayBackend + ?Sized>(
    backend: &B,
    points: &[GroundPoint],
    tol: Tolerance,
) -> TriangulationResult {
    let point_count = points.len();
    let Some(bounds) = GroundBounds::from_points(points) else {
        return TriangulationResult::Error {
            point_count,
            message: "no finite points for corner fallback".to_string(),
            kind: TriangulationFailureKind::Conditioning,
        };
    };

    let mut augmented = points.to_vec();
    augmented.extend(
        bounds
            .corners()
            .iter()
            .map(|&(x, z)| GroundPoint::new(x, 0.0, z, usize::MAX)),
    );

    let normalized = normalize(&augmented, &bounds, tol);
    match triangulate_normalized(backend, &normalized) {
        TriangulationResult::Success {
            triangles,
            representation,
            ..
        } => {
            let total = triangles.len();
            let kept: Vec<[u32; 3]> = triangles
                .into_iter()
                .filter(|t| t.iter().all(|&i| (i as usize) < point_count))
                .collect();
            log::debug!(
                "triangulate: corner fallback kept {} of {total} triangles",
                kept.len()
            );
            if kept.is_empty() {
                TriangulationResult::Empty {
                    point_count,
                    reason: "every fallback triangle referenced a bounding-box corner".to_string(),
                }
            } else {
                TriangulationResult::Success {
                    triangles: kept,
                    point_count,
                    representation,
                }
            }
        }
        TriangulationResult::Empty { reason, .. } => TriangulationResult::Empty { point_count, reason },
        TriangulationResult::Error { message, kind, .. } => TriangulationResult::Error {
            point_count,
            message,
            kind,
        },
    }
}
