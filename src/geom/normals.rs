use super::core::{GroundPoint, Tolerance, Vec3};

/// Per-vertex normals plus the number of faces too small to contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexNormals {
    pub normals: Vec<Vec3>,
    pub degenerate_faces: usize,
}

/// Raw (unnormalized) face normal of `tri`, or `None` if an index is out of range.
#[must_use]
pub fn face_normal(points: &[GroundPoint], tri: [u32; 3]) -> Option<Vec3> {
    let a = points.get(tri[0] as usize)?.to_vec3();
    let b = points.get(tri[1] as usize)?.to_vec3();
    let c = points.get(tri[2] as usize)?.to_vec3();
    Some((b - a).cross(c - a))
}

/// Average the unit normals of every face touching each vertex.
///
/// Faces whose cross product is shorter than [`Tolerance::FACE_NORMAL`] are
/// skipped. A vertex with no contributing face keeps the zero vector; one
/// whose face normals cancel out takes its first contributing face normal.
#[must_use]
pub fn compute_vertex_normals(points: &[GroundPoint], triangles: &[[u32; 3]]) -> VertexNormals {
    let mut sums = vec![Vec3::ZERO; points.len()];
    let mut counts = vec![0usize; points.len()];
    let mut first = vec![Vec3::ZERO; points.len()];
    let mut degenerate_faces = 0;

    for &tri in triangles {
        let Some(raw) = face_normal(points, tri) else {
            degenerate_faces += 1;
            continue;
        };
        if raw.length() < Tolerance::FACE_NORMAL.eps {
            degenerate_faces += 1;
            continue;
        }
        let Some(unit) = raw.normalized() else {
            degenerate_faces += 1;
            continue;
        };
        for &i in &tri {
            let i = i as usize;
            if counts[i] == 0 {
                first[i] = unit;
            }
            sums[i] = sums[i] + unit;
            counts[i] += 1;
        }
    }

    let normals = sums
        .into_iter()
        .zip(counts)
        .zip(first)
        .map(|((sum, count), first)| {
            if count == 0 {
                return Vec3::ZERO;
            }
            sum.div_scalar(count as f64).normalized().unwrap_or(first)
        })
        .collect();

    if degenerate_faces > 0 {
        log::debug!("normals: {degenerate_faces} faces skipped as degenerate");
    }

    VertexNormals {
        normals,
        degenerate_faces,
    }
}
