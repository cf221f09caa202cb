use std::cell::Cell;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{
    BackendError, DelaunatorBackend, DelaunayBackend, DownsampleStrategy, GroundMeshError, PipelineMetrics,
    PipelineOptions, RawTriangulation, RetryState, TriangulationFailureKind, build_ground_mesh_with_backend,
};

fn cloud(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .flat_map(|_| [rng.random_range(0.0..20.0), 0.0, rng.random_range(0.0..20.0)])
        .collect()
}

struct RefusingBackend;

impl DelaunayBackend for RefusingBackend {
    fn triangulate(&self, _coords: &[f64]) -> Result<RawTriangulation, BackendError> {
        Err(BackendError("refused".to_string()))
    }
}

/// Returns an out-of-range index for the first `bad_calls` calls.
struct MalformedBackend {
    calls: Cell<usize>,
    bad_calls: usize,
}

impl DelaunayBackend for MalformedBackend {
    fn triangulate(&self, coords: &[f64]) -> Result<RawTriangulation, BackendError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call < self.bad_calls {
            return Ok(RawTriangulation {
                triangles: vec![0, 1, coords.len()],
                halfedges: None,
            });
        }
        DelaunatorBackend.triangulate(coords)
    }
}

/// Refuses any buffer holding exactly `refused_count` points.
struct CountGatedBackend {
    refused_count: usize,
}

impl DelaunayBackend for CountGatedBackend {
    fn triangulate(&self, coords: &[f64]) -> Result<RawTriangulation, BackendError> {
        if coords.len() / 2 == self.refused_count {
            return Err(BackendError(format!("{} points refused", self.refused_count)));
        }
        DelaunatorBackend.triangulate(coords)
    }
}

#[test]
fn refusing_backend_exhausts_every_strategy() {
    let mut metrics = PipelineMetrics::default();
    let positions = cloud(200, 1);
    let err = build_ground_mesh_with_backend(
        &positions,
        200,
        None,
        &PipelineOptions::default(),
        &RefusingBackend,
        &mut metrics,
    )
    .unwrap_err();

    let GroundMeshError::TriangulationExhausted(report) = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(report.final_failure, TriangulationFailureKind::EngineFailure);
    assert!(report.final_reason.contains("refused"));
    assert_eq!(report.counts.input, 200);
    assert_eq!(report.counts.validated, 200);
    // The initial set plus one entry per ratio; the fallback repeats the last one.
    assert_eq!(report.strategies.len(), 6);
    assert!(matches!(report.strategies[0], DownsampleStrategy::None { point_count: 200 }));
    assert!(matches!(
        report.strategies[5],
        DownsampleStrategy::Progressive { attempt: 5, .. }
    ));
}

#[test]
fn malformed_output_is_retried() {
    let backend = MalformedBackend {
        calls: Cell::new(0),
        bad_calls: 1,
    };
    let mut metrics = PipelineMetrics::default();
    let positions = cloud(80, 2);
    let output =
        build_ground_mesh_with_backend(&positions, 80, None, &PipelineOptions::default(), &backend, &mut metrics)
            .unwrap();
    assert_eq!(output.diagnostics.attempts, 2);
    assert_eq!(output.diagnostics.final_state, RetryState::Succeeded);
    assert!(output.mesh.indices.iter().all(|&i| (i as usize) < output.mesh.vertex_count));
}

#[test]
fn malformed_output_everywhere_is_reported() {
    let backend = MalformedBackend {
        calls: Cell::new(0),
        bad_calls: usize::MAX,
    };
    let mut metrics = PipelineMetrics::default();
    let positions = cloud(50, 3);
    let options = PipelineOptions::default().with_progressive_ratios(vec![0.5]);
    let err = build_ground_mesh_with_backend(&positions, 50, None, &options, &backend, &mut metrics).unwrap_err();
    let GroundMeshError::TriangulationExhausted(report) = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(report.final_failure, TriangulationFailureKind::Malformed);
}

#[test]
fn corner_fallback_rescues_the_run() {
    let backend = CountGatedBackend { refused_count: 30 };
    let mut metrics = PipelineMetrics::default();
    let positions = cloud(30, 4);
    let options = PipelineOptions::default().with_progressive_ratios(Vec::new());
    let output = build_ground_mesh_with_backend(&positions, 30, None, &options, &backend, &mut metrics).unwrap();

    assert!(output.diagnostics.corner_fallback_used);
    assert_eq!(output.diagnostics.attempts, 2);
    assert_eq!(output.mesh.vertex_count, 30);
    assert!(output.mesh.indices.iter().all(|&i| i < 30));
    assert!(output.diagnostics.has_warnings());
}

#[test]
fn fallback_disabled_exhausts_early() {
    let backend = CountGatedBackend { refused_count: 30 };
    let mut metrics = PipelineMetrics::default();
    let positions = cloud(30, 4);
    let options = PipelineOptions::default()
        .with_progressive_ratios(Vec::new())
        .with_corner_fallback(false);
    let err = build_ground_mesh_with_backend(&positions, 30, None, &options, &backend, &mut metrics).unwrap_err();
    let GroundMeshError::TriangulationExhausted(report) = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(report.strategies.len(), 1);
    assert!(!report.collinear);
}
