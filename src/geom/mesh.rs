use serde::Serialize;

use super::core::{GroundPoint, Vec3};
use super::error::{GroundMeshError, GroundMeshResult};
use super::metrics::{PipelineMetrics, TimingBucket};
use super::normals::{VertexNormals, compute_vertex_normals, face_normal};

/// Final triangle mesh in flat buffers.
///
/// Vertex `i` is the `i`-th point of the active set the triangulation ran on,
/// in original (un-normalized) coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroundMesh {
    /// `[x0, y0, z0, x1, y1, z1, ...]`
    pub vertices: Vec<f64>,
    /// Flat vertex-index triples.
    pub indices: Vec<u32>,
    /// `[nx0, ny0, nz0, ...]`, one normal per vertex.
    pub normals: Vec<f64>,
    pub vertex_count: usize,
    pub index_count: usize,
}

/// Typed buffers handed to renderers and the navigation-mesh builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshBuffers {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub normals: Vec<f32>,
}

impl GroundMesh {
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.index_count / 3
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }

    /// Vertex `i` as a vector, if in range.
    #[must_use]
    pub fn vertex(&self, i: usize) -> Option<Vec3> {
        let v = self.vertices.get(i * 3..i * 3 + 3)?;
        Some(Vec3::new(v[0], v[1], v[2]))
    }

    #[must_use]
    pub fn normal(&self, i: usize) -> Option<Vec3> {
        let n = self.normals.get(i * 3..i * 3 + 3)?;
        Some(Vec3::new(n[0], n[1], n[2]))
    }

    /// Validate buffer lengths, index range and finiteness.
    ///
    /// Returns a human-readable reason for the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.len() != self.vertex_count * 3 {
            return Err(format!(
                "vertex buffer holds {} floats for {} vertices",
                self.vertices.len(),
                self.vertex_count
            ));
        }
        if self.normals.len() != self.vertices.len() {
            return Err("normal buffer does not match vertex buffer".to_string());
        }
        if self.indices.len() != self.index_count {
            return Err("index buffer does not match index count".to_string());
        }
        if self.index_count % 3 != 0 {
            return Err("mesh indices are not a triangle list (len % 3 != 0)".to_string());
        }
        if self.indices.iter().any(|&i| i as usize >= self.vertex_count) {
            return Err("mesh has out-of-bounds vertex indices".to_string());
        }
        if self.vertices.iter().chain(&self.normals).any(|v| !v.is_finite()) {
            return Err("mesh has invalid vertex or normal values (NaN/Inf)".to_string());
        }
        Ok(())
    }

    /// Single-precision copy of the buffers.
    #[must_use]
    pub fn to_buffers(&self) -> MeshBuffers {
        MeshBuffers {
            vertices: self.vertices.iter().map(|&v| v as f32).collect(),
            indices: self.indices.clone(),
            normals: self.normals.iter().map(|&n| n as f32).collect(),
        }
    }
}

/// An assembled mesh and the bookkeeping of how it was built.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAssembly {
    pub mesh: GroundMesh,
    pub flipped_triangles: usize,
    pub degenerate_faces: usize,
}

/// Flip every triangle whose face normal points down (-y).
///
/// Returns the number of triangles flipped.
pub fn orient_upward(points: &[GroundPoint], triangles: &mut [[u32; 3]]) -> usize {
    let mut flipped = 0;
    for tri in triangles.iter_mut() {
        if face_normal(points, *tri).is_some_and(|n| n.y < 0.0) {
            tri.swap(1, 2);
            flipped += 1;
        }
    }
    flipped
}

/// Package `points` and `triangles` into a validated [`GroundMesh`].
pub fn assemble(points: &[GroundPoint], triangles: Vec<[u32; 3]>, upward: bool) -> GroundMeshResult<MeshAssembly> {
    assemble_timed(points, triangles, upward, &mut PipelineMetrics::default())
}

/// [`assemble`], with normal accumulation timed under [`TimingBucket::Normals`]
/// and orientation plus buffer packing under [`TimingBucket::Assembly`].
pub fn assemble_timed(
    points: &[GroundPoint],
    mut triangles: Vec<[u32; 3]>,
    upward: bool,
    metrics: &mut PipelineMetrics,
) -> GroundMeshResult<MeshAssembly> {
    let flipped_triangles = metrics.time(TimingBucket::Assembly, || {
        if upward { orient_upward(points, &mut triangles) } else { 0 }
    });

    let VertexNormals {
        normals,
        degenerate_faces,
    } = metrics.time(TimingBucket::Normals, || compute_vertex_normals(points, &triangles));

    let mesh = metrics.time(TimingBucket::Assembly, || build_mesh(points, &triangles, &normals));
    mesh.validate()
        .map_err(|message| GroundMeshError::TriangulationMalformed {
            point_count: points.len(),
            message,
        })?;

    Ok(MeshAssembly {
        mesh,
        flipped_triangles,
        degenerate_faces,
    })
}

pub(crate) fn build_mesh(points: &[GroundPoint], triangles: &[[u32; 3]], normals: &[Vec3]) -> GroundMesh {
    let vertices: Vec<f64> = points.iter().flat_map(|p| p.to_array()).collect();
    let indices: Vec<u32> = triangles.iter().flatten().copied().collect();
    let normals: Vec<f64> = normals.iter().flat_map(|n| n.to_array()).collect();

    GroundMesh {
        vertex_count: points.len(),
        index_count: indices.len(),
        vertices,
        indices,
        normals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Vec<GroundPoint> {
        vec![
            GroundPoint::new(0.0, 0.0, 0.0, 0),
            GroundPoint::new(1.0, 0.0, 0.0, 1),
            GroundPoint::new(1.0, 0.0, 1.0, 2),
            GroundPoint::new(0.0, 0.0, 1.0, 3),
        ]
    }

    #[test]
    fn test_assemble_orients_upward() {
        // [0, 1, 2] faces -y and must be flipped.
        let assembly = assemble(&quad(), vec![[0, 1, 2], [0, 2, 3]], true).unwrap();
        assert_eq!(assembly.flipped_triangles, 2);
        let mesh = assembly.mesh;
        assert_eq!(mesh.vertex_count, 4);
        assert_eq!(mesh.index_count, 6);
        assert_eq!(mesh.triangle_count(), 2);
        for i in 0..4 {
            let n = mesh.normal(i).unwrap();
            assert!((n.y - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_assemble_keeps_winding_when_disabled() {
        let assembly = assemble(&quad(), vec![[0, 1, 2]], false).unwrap();
        assert_eq!(assembly.flipped_triangles, 0);
        assert_eq!(assembly.mesh.indices, vec![0, 1, 2]);
        assert!(assembly.mesh.normal(0).unwrap().y < 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_meshes() {
        let good = assemble(&quad(), vec![[0, 2, 1]], true).unwrap().mesh;
        assert!(good.validate().is_ok());

        let mut out_of_range = good.clone();
        out_of_range.indices[0] = 7;
        assert!(out_of_range.validate().is_err());

        let mut short_normals = good.clone();
        short_normals.normals.pop();
        assert!(short_normals.validate().is_err());

        let mut nan = good.clone();
        nan.vertices[0] = f64::NAN;
        assert!(nan.validate().is_err());

        let mut ragged = good;
        ragged.indices.pop();
        ragged.index_count -= 1;
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_assemble_rejects_out_of_range_triangle() {
        let result = assemble(&quad(), vec![[0, 1, 9]], true);
        assert!(matches!(result, Err(GroundMeshError::TriangulationMalformed { .. })));
    }

    #[test]
    fn test_assemble_timed_matches_assemble() {
        let triangles = vec![[0, 1, 2], [0, 2, 3]];
        let mut metrics = PipelineMetrics::default();
        metrics.begin();
        let timed = assemble_timed(&quad(), triangles.clone(), true, &mut metrics).unwrap();
        assert_eq!(timed, assemble(&quad(), triangles, true).unwrap());

        let report = metrics.end();
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        assert!(report.is_some_and(|r| r.normals_ns > 0 && r.assembly_ns > 0));
        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        assert!(report.is_none());
    }

    #[test]
    fn test_to_buffers() {
        let mesh = assemble(&quad(), vec![[0, 2, 1], [0, 3, 2]], true).unwrap().mesh;
        let buffers = mesh.to_buffers();
        assert_eq!(buffers.vertices.len(), 12);
        assert_eq!(buffers.normals.len(), 12);
        assert_eq!(buffers.indices, mesh.indices);
        assert_eq!(buffers.vertices[3], 1.0_f32);
    }
}
