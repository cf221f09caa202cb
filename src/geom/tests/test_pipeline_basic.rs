use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{
    DownsampleStrategy, GroundMeshError, PipelineOptions, RetryState, build_ground_mesh, build_ground_mesh_f32,
};

fn random_square(n: usize, seed: u64, scale: f64, offset: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .flat_map(|_| {
            [
                offset + rng.random_range(0.0..scale),
                rng.random_range(0.0..1.0),
                offset + rng.random_range(0.0..scale),
            ]
        })
        .collect()
}

#[test]
fn every_index_is_in_range_for_random_inputs() {
    for seed in 0..12_u64 {
        let n = 4 + (seed as usize * 37) % 200;
        let positions = random_square(n, seed, 10.0, 0.0);
        let output = build_ground_mesh(&positions, n, None, &PipelineOptions::default()).expect("mesh");
        let mesh = &output.mesh;
        assert!(mesh.validate().is_ok());
        assert!(mesh.triangle_count() >= 1);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count));
    }
}

#[test]
fn flat_ground_normals_point_up() {
    let n = 300;
    let mut positions = random_square(n, 7, 50.0, -25.0);
    for y in positions.iter_mut().skip(1).step_by(3) {
        *y = 2.5;
    }
    let output = build_ground_mesh(&positions, n, None, &PipelineOptions::default()).unwrap();
    for n in output.mesh.normals.chunks_exact(3) {
        assert!((n[1] - 1.0).abs() < 1e-9, "normal {n:?}");
    }
}

#[test]
fn three_point_line_is_degenerate() {
    let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
    let err = build_ground_mesh(&positions, 3, None, &PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, GroundMeshError::DegenerateGeometry { .. }), "{err:?}");
}

#[test]
fn long_line_is_corrected_or_degenerate() {
    let n = 50;
    let positions: Vec<f64> = (0..n).flat_map(|i| [i as f64, 0.0, 0.0]).collect();
    match build_ground_mesh(&positions, n, None, &PipelineOptions::default()) {
        Ok(output) => {
            assert!(output.diagnostics.collinearity_corrected || output.diagnostics.corner_fallback_used);
            assert!(output.mesh.validate().is_ok());
            assert!(output.mesh.triangle_count() >= 1);
        }
        Err(err) => assert!(matches!(err, GroundMeshError::DegenerateGeometry { .. }), "{err:?}"),
    }
}

#[test]
fn large_magnitude_coordinates() {
    let n = 500;
    let positions = random_square(n, 11, 5e6, 1e7);
    let output = build_ground_mesh(&positions, n, None, &PipelineOptions::default()).unwrap();
    assert_eq!(output.mesh.vertex_count, n);
    let transform = output.diagnostics.transform.unwrap();
    assert_eq!(transform.scale, 1e-6);
    // Vertices stay in caller coordinates.
    assert!(output.mesh.vertices.chunks_exact(3).all(|v| v[0] >= 1e7));
}

#[test]
fn duplicates_are_reported() {
    let mut positions = random_square(100, 3, 10.0, 0.0);
    let copy = positions[..30].to_vec();
    positions.extend(copy);
    let output = build_ground_mesh(&positions, 110, None, &PipelineOptions::default()).unwrap();
    assert_eq!(output.diagnostics.duplicates_removed, 10);
    assert_eq!(output.mesh.vertex_count, 100);
}

#[test]
fn max_points_caps_the_first_attempt() {
    let n = 2_000;
    let positions = random_square(n, 5, 100.0, 0.0);
    let options = PipelineOptions::default().with_max_points(500);
    let output = build_ground_mesh(&positions, n, None, &options).unwrap();
    assert!(output.mesh.vertex_count <= 500);
    assert!(matches!(
        output.diagnostics.strategies[0],
        DownsampleStrategy::Grid { original_count: 2_000, .. }
    ));
    assert_eq!(output.diagnostics.final_state, RetryState::Succeeded);
}

#[test]
fn f32_entry_point_matches() {
    let positions: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let heights = [1.0_f32, 2.0, 3.0, 4.0];
    let output = build_ground_mesh_f32(&positions, 4, Some(&heights), &PipelineOptions::default()).unwrap();
    let ys: Vec<f64> = output.mesh.vertices.chunks_exact(3).map(|v| v[1]).collect();
    assert_eq!(ys, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn square_far_from_origin_is_triangulated() {
    let (o, side) = (1e13, 1e7);
    let positions = [
        o, 0.0, o,
        o + side, 0.0, o,
        o + side, 0.0, o + side,
        o, 0.0, o + side,
        o + 0.4 * side, 0.0, o + 0.6 * side,
    ];
    let output = build_ground_mesh(&positions, 5, None, &PipelineOptions::default()).unwrap();
    assert_eq!(output.diagnostics.duplicates_removed, 0);
    assert_eq!(output.mesh.vertex_count, 5);
    assert!(output.mesh.triangle_count() >= 3);
    assert!(output.mesh.indices.iter().all(|&i| i < 5));
}

#[test]
fn millimetre_scatter_is_triangulated() {
    let n = 200;
    let positions = random_square(n, 21, 0.002, 0.0);
    let output = build_ground_mesh(&positions, n, None, &PipelineOptions::default()).unwrap();
    assert!(!output.diagnostics.collinearity_corrected);
    assert_eq!(output.mesh.vertex_count, n);
    assert!(output.mesh.triangle_count() >= 1);
    assert!(output.mesh.indices.iter().all(|&i| (i as usize) < n));
}
