//! Exhaustive triple enumeration for small arbitrary point sets.
//!
//! This path does not project onto a ground plane and offers no planarity or
//! manifold guarantee: the output is an overlapping set of triangles whose
//! area exceeds a threshold. Use it for exploratory inspection of point sets
//! that are not ground-like.

use serde::{Deserialize, Serialize};

use super::core::GroundPoint;
use super::error::{GroundMeshError, GroundMeshResult};
use super::mesh::{GroundMesh, build_mesh};
use super::normals::compute_vertex_normals;
use super::sanitize::points_from_buffer;

pub const MAX_POINTS_FOR_MESH: usize = 1_000;
pub const MAX_TRIANGLES: usize = 10_000;
pub const MIN_TRIANGLE_AREA: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExhaustiveOptions {
    /// Inputs above this size are strided down before enumeration.
    pub max_points_for_mesh: usize,
    /// Enumeration stops once this many faces were accepted.
    pub max_triangles: usize,
    /// Faces at or below this area are rejected.
    pub min_area: f64,
}

impl Default for ExhaustiveOptions {
    fn default() -> Self {
        Self {
            max_points_for_mesh: MAX_POINTS_FOR_MESH,
            max_triangles: MAX_TRIANGLES,
            min_area: MIN_TRIANGLE_AREA,
        }
    }
}

impl ExhaustiveOptions {
    #[must_use]
    pub fn with_max_points_for_mesh(mut self, max_points: usize) -> Self {
        self.max_points_for_mesh = max_points.max(3);
        self
    }

    #[must_use]
    pub fn with_max_triangles(mut self, max_triangles: usize) -> Self {
        self.max_triangles = max_triangles;
        self
    }

    #[must_use]
    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.min_area = min_area;
        self
    }
}

/// Keep every k-th point, with k the smallest stride that fits `cap`.
#[must_use]
pub fn stride_down(points: &[GroundPoint], cap: usize) -> Vec<GroundPoint> {
    let cap = cap.max(1);
    if points.len() <= cap {
        return points.to_vec();
    }
    let stride = points.len().div_ceil(cap);
    points.iter().step_by(stride).copied().collect()
}

/// Half the length of the cross product of the triangle's edges.
#[must_use]
pub fn triangle_area(a: &GroundPoint, b: &GroundPoint, c: &GroundPoint) -> f64 {
    let a = a.to_vec3();
    (b.to_vec3() - a).cross(c.to_vec3() - a).length() * 0.5
}

/// Every index triple `i < j < k` whose area exceeds `min_area`, in
/// lexicographic order, stopping at `max_triangles`.
#[must_use]
pub fn enumerate_triangles(points: &[GroundPoint], max_triangles: usize, min_area: f64) -> Vec<[u32; 3]> {
    let n = points.len();
    let mut triangles = Vec::new();

    'outer: for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                if triangles.len() >= max_triangles {
                    break 'outer;
                }
                if triangle_area(&points[i], &points[j], &points[k]) > min_area {
                    triangles.push([i as u32, j as u32, k as u32]);
                }
            }
        }
    }

    triangles
}

/// Build a mesh from every sufficiently large triangle over `points`.
pub fn exhaustive_triangulate(points: &[GroundPoint], options: &ExhaustiveOptions) -> GroundMeshResult<GroundMesh> {
    let finite: Vec<GroundPoint> = points.iter().copied().filter(GroundPoint::is_finite).collect();
    if finite.len() < 3 {
        return Err(GroundMeshError::insufficient(finite.len(), "exhaustive filtering"));
    }

    let sampled = stride_down(&finite, options.max_points_for_mesh);
    let triangles = enumerate_triangles(&sampled, options.max_triangles, options.min_area);
    log::debug!(
        "exhaustive: {} of {} points, {} faces accepted",
        sampled.len(),
        finite.len(),
        triangles.len()
    );

    if triangles.is_empty() {
        return Err(GroundMeshError::TriangulationEmptyResult {
            point_count: sampled.len(),
            reason: format!("no triple exceeds area {}", options.min_area),
        });
    }
    if triangles.len() >= options.max_triangles {
        log::warn!("exhaustive: triangle cap {} reached", options.max_triangles);
    }

    let normals = compute_vertex_normals(&sampled, &triangles);
    let mesh = build_mesh(&sampled, &triangles, &normals.normals);
    mesh.validate()
        .map_err(|message| GroundMeshError::TriangulationMalformed {
            point_count: sampled.len(),
            message,
        })?;
    Ok(mesh)
}

/// [`exhaustive_triangulate`] over a flat xyz buffer.
pub fn exhaustive_mesh(positions: &[f64], count: usize, options: &ExhaustiveOptions) -> GroundMeshResult<GroundMesh> {
    let points = points_from_buffer(positions, count, None)?;
    exhaustive_triangulate(&points, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<GroundPoint> {
        vec![
            GroundPoint::new(0.0, 0.0, 0.0, 0),
            GroundPoint::new(1.0, 0.0, 0.0, 1),
            GroundPoint::new(0.0, 1.0, 0.0, 2),
            GroundPoint::new(0.0, 0.0, 1.0, 3),
        ]
    }

    #[test]
    fn test_tetrahedron_has_four_faces() {
        let mesh = exhaustive_triangulate(&tetrahedron(), &ExhaustiveOptions::default()).unwrap();
        assert_eq!(mesh.vertex_count, 4);
        assert_eq!(mesh.triangle_count(), 4);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_small_triangles_rejected() {
        let points = vec![
            GroundPoint::new(0.0, 0.0, 0.0, 0),
            GroundPoint::new(0.01, 0.0, 0.0, 1),
            GroundPoint::new(0.0, 0.01, 0.0, 2),
        ];
        let result = exhaustive_triangulate(&points, &ExhaustiveOptions::default());
        assert!(matches!(result, Err(GroundMeshError::TriangulationEmptyResult { .. })));
    }

    #[test]
    fn test_triangle_cap() {
        let points: Vec<GroundPoint> = (0..20)
            .map(|i| {
                let t = i as f64;
                GroundPoint::new(t.cos() * 5.0, t * 0.3, t.sin() * 5.0, i)
            })
            .collect();
        let options = ExhaustiveOptions::default().with_max_triangles(25);
        let mesh = exhaustive_triangulate(&points, &options).unwrap();
        assert_eq!(mesh.triangle_count(), 25);
    }

    #[test]
    fn test_stride_down_fits_cap() {
        let points: Vec<GroundPoint> = (0..2500).map(|i| GroundPoint::new(i as f64, 0.0, 0.0, i)).collect();
        let strided = stride_down(&points, 1000);
        assert!(strided.len() <= 1000);
        assert_eq!(strided[0].original_index, 0);
        assert_eq!(strided[1].original_index, 3);
        assert_eq!(stride_down(&points[..10], 1000).len(), 10);
    }

    #[test]
    fn test_insufficient_finite_points() {
        let points = vec![
            GroundPoint::new(0.0, 0.0, 0.0, 0),
            GroundPoint::new(f64::NAN, 0.0, 0.0, 1),
            GroundPoint::new(1.0, 1.0, 1.0, 2),
        ];
        let result = exhaustive_triangulate(&points, &ExhaustiveOptions::default());
        assert!(matches!(
            result,
            Err(GroundMeshError::InsufficientPoints { remaining: 2, .. })
        ));
    }

    #[test]
    fn test_exhaustive_mesh_from_buffer() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let mesh = exhaustive_mesh(&positions, 3, &ExhaustiveOptions::default()).unwrap();
        assert_eq!(mesh.index_count, 3);
    }
}
