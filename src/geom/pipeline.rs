//! End-to-end ground mesh construction.
//!
//! sanitize -> validate coordinates -> (grid cap) -> per attempt:
//! condition -> normalize -> triangulate, driven by [`RetryState`] until an
//! attempt succeeds or every ratio and the corner fallback are spent.

use super::conditioning::{
    Collinearity, ConditionedPoints, CoordinateValidation, GeometryHealth, condition, validate_coordinates,
};
use super::core::{GroundBounds, GroundPoint};
use super::diagnostics::PipelineDiagnostics;
use super::downsample::{DownsampleStrategy, grid_sample_with_fallback, progressive_sample};
use super::error::{ExhaustionReport, GroundMeshError, GroundMeshResult, StageCounts, TriangulationFailureKind};
use super::mesh::{GroundMesh, MeshAssembly, assemble_timed};
use super::metrics::{PipelineMetrics, TimingBucket};
use super::normalize::{NormalizedCoordinates, normalize};
use super::options::PipelineOptions;
use super::retry::{AttemptOutcome, RetryState};
use super::sanitize::sanitize;
use super::triangulation::{
    DelaunatorBackend, DelaunayBackend, TriangulationResult, triangulate_normalized,
    triangulate_with_corner_fallback,
};

/// A successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundMeshOutput {
    pub mesh: GroundMesh,
    pub diagnostics: PipelineDiagnostics,
}

/// Build a ground mesh from a flat xyz buffer with the default backend.
pub fn build_ground_mesh(
    positions: &[f64],
    count: usize,
    heights: Option<&[f64]>,
    options: &PipelineOptions,
) -> GroundMeshResult<GroundMeshOutput> {
    let mut metrics = PipelineMetrics::default();
    build_ground_mesh_with_backend(positions, count, heights, options, &DelaunatorBackend, &mut metrics)
}

/// [`build_ground_mesh`] over single-precision buffers.
pub fn build_ground_mesh_f32(
    positions: &[f32],
    count: usize,
    heights: Option<&[f32]>,
    options: &PipelineOptions,
) -> GroundMeshResult<GroundMeshOutput> {
    let positions: Vec<f64> = positions.iter().map(|&v| f64::from(v)).collect();
    let heights: Option<Vec<f64>> = heights.map(|h| h.iter().map(|&v| f64::from(v)).collect());
    build_ground_mesh(&positions, count, heights.as_deref(), options)
}

/// Outcome of one conditioned attempt.
struct Attempt {
    conditioned: ConditionedPoints,
    result: TriangulationResult,
}

/// State the retry loop carries between attempts.
struct RunState {
    strategies: Vec<DownsampleStrategy>,
    attempts: usize,
    last_points: Vec<GroundPoint>,
    last_bounds: Option<GroundBounds>,
    last_collinearity: Option<Collinearity>,
    last_health: GeometryHealth,
    last_failure: (TriangulationFailureKind, String),
    last_count: usize,
}

impl RunState {
    fn record_failure(&mut self, kind: TriangulationFailureKind, reason: String) {
        self.last_failure = (kind, reason);
    }

    fn record_conditioned(&mut self, conditioned: &ConditionedPoints) {
        self.last_points = conditioned.points.clone();
        self.last_bounds = Some(conditioned.bounds);
        self.last_collinearity = Some(conditioned.collinearity);
        self.last_health = conditioned.health;
        self.last_count = conditioned.points.len();
    }

    fn deduplicated_strategies(&self) -> Vec<DownsampleStrategy> {
        let mut unique: Vec<DownsampleStrategy> = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            if !unique.contains(strategy) {
                unique.push(strategy.clone());
            }
        }
        unique
    }
}

fn run_attempt<B: DelaunayBackend + ?Sized>(
    points: Vec<GroundPoint>,
    options: &PipelineOptions,
    backend: &B,
    metrics: &mut PipelineMetrics,
) -> GroundMeshResult<(Attempt, NormalizedCoordinates)> {
    let conditioned = metrics.time(TimingBucket::Conditioning, || condition(points, options.collinearity()))?;
    let tol = options.tolerance();
    let normalized = metrics.time(TimingBucket::Normalization, || {
        normalize(&conditioned.points, &conditioned.bounds, tol)
    });
    let result = metrics.time(TimingBucket::Triangulation, || triangulate_normalized(backend, &normalized));
    Ok((Attempt { conditioned, result }, normalized))
}

/// Build a ground mesh with an explicit backend and metrics sink.
pub fn build_ground_mesh_with_backend<B: DelaunayBackend + ?Sized>(
    positions: &[f64],
    count: usize,
    heights: Option<&[f64]>,
    options: &PipelineOptions,
    backend: &B,
    metrics: &mut PipelineMetrics,
) -> GroundMeshResult<GroundMeshOutput> {
    metrics.begin();
    let tol = options.tolerance();
    let mut diagnostics = PipelineDiagnostics::new();

    let sanitized = metrics.time(TimingBucket::Sanitize, || sanitize(positions, count, heights, tol))?;
    diagnostics.input_count = count;
    diagnostics.deduplicated_count = sanitized.points.len();
    diagnostics.duplicates_removed = sanitized.duplicate_count;

    let validated = match validate_coordinates(&sanitized.points) {
        CoordinateValidation::Valid => sanitized.points,
        CoordinateValidation::Invalid {
            valid,
            kind,
            nan_count,
            infinite_count,
        } => {
            let total = sanitized.points.len();
            if valid.len() < 3 {
                return Err(GroundMeshError::InvalidCoordinates {
                    reason: kind.to_string(),
                    valid: valid.len(),
                    total,
                });
            }
            let dropped = nan_count + infinite_count;
            log::warn!("pipeline: dropped {dropped} points with {kind}");
            diagnostics.non_finite_dropped = dropped;
            diagnostics.add_warning(format!("dropped {dropped} points with {kind}"));
            valid
        }
    };
    diagnostics.validated_count = validated.len();

    let (initial_points, initial_strategy) = if validated.len() > options.max_points {
        let sample = metrics.time(TimingBucket::Downsampling, || {
            grid_sample_with_fallback(&validated, options.max_points, tol)
        });
        log::debug!(
            "pipeline: grid sampled {} -> {} points ({}x{} grid, enhanced={})",
            validated.len(),
            sample.points.len(),
            sample.grid_size,
            sample.grid_size,
            sample.enhanced
        );
        let strategy = DownsampleStrategy::Grid {
            point_count: sample.points.len(),
            grid_size: sample.grid_size,
            original_count: validated.len(),
        };
        (sample.points, strategy)
    } else {
        let strategy = DownsampleStrategy::None {
            point_count: validated.len(),
        };
        (validated.clone(), strategy)
    };

    let policy = options.retry_policy();
    let mut run = RunState {
        strategies: Vec::with_capacity(policy.max_attempts()),
        attempts: 0,
        last_points: Vec::new(),
        last_bounds: GroundBounds::from_points(&initial_points),
        last_collinearity: None,
        last_health: GeometryHealth::Unchecked,
        last_failure: (TriangulationFailureKind::EmptyResult, "no attempt ran".to_string()),
        last_count: initial_points.len(),
    };

    let mut pending = Some((initial_points, initial_strategy));
    let mut state = RetryState::Initial;
    let mut accepted: Option<(Vec<GroundPoint>, Vec<[u32; 3]>)> = None;

    while !state.is_terminal() {
        run.attempts += 1;
        let outcome = match state {
            RetryState::Initial | RetryState::Downsampled { .. } => {
                let (points, strategy) = match (pending.take(), state.ratio_index()) {
                    (Some(initial), _) => initial,
                    (None, Some(idx)) => {
                        let ratio = options.progressive_ratios[idx];
                        let attempt = idx + 1;
                        metrics.time(TimingBucket::Downsampling, || progressive_sample(&validated, ratio, attempt))
                    }
                    (None, None) => break,
                };
                run.strategies.push(strategy);
                run.last_count = points.len();
                run.last_points = points.clone();

                match run_attempt(points, options, backend, metrics) {
                    Ok((attempt, normalized)) => {
                        run.record_conditioned(&attempt.conditioned);
                        match attempt.result {
                            TriangulationResult::Success {
                                triangles,
                                representation,
                                ..
                            } => {
                                let c = &attempt.conditioned;
                                diagnostics.collinearity = Some(c.collinearity);
                                diagnostics.collinearity_corrected = c.collinearity_corrected;
                                diagnostics.perturbed = c.perturbed;
                                diagnostics.health = c.health;
                                diagnostics.representation = Some(representation);
                                diagnostics.transform = Some(normalized.transform);
                                diagnostics.overflowed_points = normalized.overflowed;
                                accepted = Some((attempt.conditioned.points, triangles));
                                AttemptOutcome::Success
                            }
                            failed => {
                                log::warn!(
                                    "pipeline: attempt {} ({state:?}) failed: {}",
                                    run.attempts,
                                    failed.reason()
                                );
                                let kind = failed.failure_kind().unwrap_or(TriangulationFailureKind::EmptyResult);
                                run.record_failure(kind, failed.reason());
                                AttemptOutcome::Failure
                            }
                        }
                    }
                    Err(err @ GroundMeshError::DegenerateGeometry { .. }) if state == RetryState::Initial => {
                        return Err(err);
                    }
                    Err(err) => {
                        log::warn!("pipeline: attempt {} ({state:?}) rejected: {err}", run.attempts);
                        run.record_failure(TriangulationFailureKind::Conditioning, err.to_string());
                        AttemptOutcome::Failure
                    }
                }
            }
            RetryState::FallbackAttempted => {
                if let Some(last) = run.strategies.last().cloned() {
                    run.strategies.push(last);
                }
                let points = std::mem::take(&mut run.last_points);
                log::warn!("pipeline: corner fallback on {} points", points.len());
                let result = metrics.time(TimingBucket::Triangulation, || {
                    triangulate_with_corner_fallback(backend, &points, tol)
                });
                match result {
                    TriangulationResult::Success {
                        triangles,
                        representation,
                        ..
                    } => {
                        diagnostics.corner_fallback_used = true;
                        diagnostics.collinearity = run.last_collinearity;
                        diagnostics.health = run.last_health;
                        diagnostics.representation = Some(representation);
                        diagnostics.add_warning("mesh produced by bounding-box corner fallback");
                        accepted = Some((points, triangles));
                        AttemptOutcome::Success
                    }
                    failed => {
                        let kind = failed.failure_kind().unwrap_or(TriangulationFailureKind::EmptyResult);
                        run.record_failure(kind, failed.reason());
                        run.last_points = points;
                        AttemptOutcome::Failure
                    }
                }
            }
            RetryState::Succeeded | RetryState::Exhausted => break,
        };
        state = state.next(outcome, &policy);
    }

    let Some((points, triangles)) = accepted else {
        let (final_failure, final_reason) = run.last_failure.clone();
        let report = ExhaustionReport {
            strategies: run.deduplicated_strategies(),
            final_failure,
            final_reason,
            coordinate_range: GroundBounds::from_points(&run.last_points).or(run.last_bounds),
            collinear: run.last_collinearity.is_some_and(Collinearity::is_collinear),
            geometry: run.last_health,
            counts: StageCounts {
                input: count,
                deduplicated: diagnostics.deduplicated_count,
                validated: diagnostics.validated_count,
                last_attempt: run.last_count,
            },
        };
        log::warn!("pipeline: exhausted after {} attempts: {report}", run.attempts);
        return Err(GroundMeshError::TriangulationExhausted(Box::new(report)));
    };

    let MeshAssembly {
        mesh,
        flipped_triangles,
        degenerate_faces,
    } = assemble_timed(&points, triangles, options.orient_upward, metrics)?;

    if diagnostics.collinearity_corrected {
        diagnostics.add_warning("collinear input corrected by offsetting points");
    }
    if diagnostics.perturbed {
        diagnostics.add_warning("degenerate bounds perturbed with spiral jitter");
    }

    diagnostics.bounds = GroundBounds::from_points(&points);
    diagnostics.vertex_count = mesh.vertex_count;
    diagnostics.triangle_count = mesh.triangle_count();
    diagnostics.strategies = run.strategies;
    diagnostics.attempts = run.attempts;
    diagnostics.final_state = state;
    diagnostics.flipped_triangles = flipped_triangles;
    diagnostics.degenerate_faces = degenerate_faces;
    diagnostics.timing = metrics.end();

    log::info!("pipeline: {}", diagnostics.summary());

    Ok(GroundMeshOutput { mesh, diagnostics })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::geom::triangulation::{BackendError, RawTriangulation};

    /// Refuses the first `fail_first` calls, then defers to delaunator.
    struct FlakyBackend {
        calls: Cell<usize>,
        fail_first: usize,
    }

    impl DelaunayBackend for FlakyBackend {
        fn triangulate(&self, coords: &[f64]) -> Result<RawTriangulation, BackendError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call < self.fail_first {
                return Ok(RawTriangulation::default());
            }
            DelaunatorBackend.triangulate(coords)
        }
    }

    fn quad_buffer() -> Vec<f64> {
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0]
    }

    #[test]
    fn test_unit_quad() {
        let output = build_ground_mesh(&quad_buffer(), 4, None, &PipelineOptions::default()).unwrap();
        assert_eq!(output.mesh.triangle_count(), 2);
        assert_eq!(output.diagnostics.attempts, 1);
        assert_eq!(output.diagnostics.final_state, RetryState::Succeeded);
        assert!(output.diagnostics.is_clean());
    }

    #[test]
    fn test_empty_results_trigger_progressive_attempt() {
        let backend = FlakyBackend {
            calls: Cell::new(0),
            fail_first: 1,
        };
        let mut metrics = PipelineMetrics::default();
        let positions: Vec<f64> = (0..40)
            .flat_map(|i| {
                let t = i as f64;
                [(t * 0.618_033_988_75).fract() * 10.0, 0.0, (t * 0.754_877_666_25).fract() * 10.0]
            })
            .collect();
        let output = build_ground_mesh_with_backend(
            &positions,
            40,
            None,
            &PipelineOptions::default(),
            &backend,
            &mut metrics,
        )
        .unwrap();
        assert_eq!(output.diagnostics.attempts, 2);
        assert!(matches!(
            output.diagnostics.strategies[1],
            DownsampleStrategy::Progressive { attempt: 1, .. }
        ));
        assert!(output.mesh.vertex_count <= 20);
    }

    #[test]
    fn test_exhaustion_reports_context() {
        let backend = FlakyBackend {
            calls: Cell::new(0),
            fail_first: usize::MAX,
        };
        let mut metrics = PipelineMetrics::default();
        let options = PipelineOptions::default().with_progressive_ratios(vec![0.5]);
        let err = build_ground_mesh_with_backend(&quad_buffer(), 4, None, &options, &backend, &mut metrics)
            .unwrap_err();
        match err {
            GroundMeshError::TriangulationExhausted(report) => {
                assert_eq!(report.final_failure, TriangulationFailureKind::EmptyResult);
                assert_eq!(report.counts.input, 4);
                assert_eq!(report.counts.validated, 4);
                assert!(!report.collinear);
                assert!(report.coordinate_range.is_some());
                // Initial and one progressive attempt; the fallback reuses the last set.
                assert_eq!(report.strategies.len(), 2);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_coordinates() {
        let positions = [0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0, 1.0, f64::INFINITY, 1.0, 2.0, 0.0, 2.0];
        let err = build_ground_mesh(&positions, 4, None, &PipelineOptions::default()).unwrap_err();
        match err {
            GroundMeshError::InvalidCoordinates { valid, total, reason } => {
                assert_eq!(valid, 2);
                assert_eq!(total, 4);
                assert!(reason.contains("NaN"));
            }
            other => panic!("expected invalid coordinates, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_points_dropped_with_warning() {
        let mut positions = quad_buffer();
        positions.extend_from_slice(&[f64::NAN, 0.0, 0.5]);
        let output = build_ground_mesh(&positions, 5, None, &PipelineOptions::default()).unwrap();
        assert_eq!(output.diagnostics.non_finite_dropped, 1);
        assert_eq!(output.mesh.vertex_count, 4);
        assert!(output.diagnostics.has_warnings());
    }

    #[test]
    fn test_height_override_reaches_mesh() {
        let heights = [5.0, 5.0, 5.0, 5.0];
        let output = build_ground_mesh(&quad_buffer(), 4, Some(&heights), &PipelineOptions::default()).unwrap();
        assert!(output.mesh.vertices.chunks_exact(3).all(|v| v[1] == 5.0));
    }
}
