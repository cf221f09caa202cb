//! Geometry conditioning: coordinate validation, collinearity handling and
//! health checks on the planar (x, z) projection.
//!
//! # Collinearity
//! Detection runs in two tiers:
//! - **Exact**: every point shares x (or z) within the dedup tolerance.
//! - **Approximate**: twice-the-area of sampled triples, divided by
//!   `max_spread`, is compared against `max_spread * 1e-3`. Consecutive triples (in input order) and
//!   seeded-random triples are both sampled, and the set counts as collinear
//!   only when both samples clear the configured fraction. Consecutive triples
//!   alone misread row-major grids as lines.
//!
//! # Health
//! A conditioned set is healthy when its bounding box has non-trivial area, is
//! not needle-like and, above ten points, at least half of the points occupy
//! distinct spatial-hash cells.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::core::{GroundBounds, GroundPoint, Tolerance};
use super::error::{GroundMeshError, GroundMeshResult};

const COLLINEAR_AREA_FACTOR: f64 = 1e-3;
const MIN_UNIQUE_FRACTION: f64 = 0.5;
const DIVERSITY_MIN_POINTS: usize = 10;
const TRIPLE_SEED: u64 = 0x6a09_e667_f3bc_c908;

// ============================================================================
// Coordinate validation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidCoordinateKind {
    NaN,
    Infinite,
    Mixed,
}

impl fmt::Display for InvalidCoordinateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaN => f.write_str("NaN coordinates"),
            Self::Infinite => f.write_str("infinite coordinates"),
            Self::Mixed => f.write_str("NaN and infinite coordinates"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateValidation {
    Valid,
    Invalid {
        valid: Vec<GroundPoint>,
        kind: InvalidCoordinateKind,
        nan_count: usize,
        infinite_count: usize,
    },
}

/// Partition points into finite and non-finite.
#[must_use]
pub fn validate_coordinates(points: &[GroundPoint]) -> CoordinateValidation {
    let mut nan_count = 0;
    let mut infinite_count = 0;
    let mut valid = Vec::with_capacity(points.len());

    for p in points {
        let coords = [p.x, p.y, p.z];
        if coords.iter().any(|c| c.is_nan()) {
            nan_count += 1;
        } else if coords.iter().any(|c| c.is_infinite()) {
            infinite_count += 1;
        } else {
            valid.push(*p);
        }
    }

    let kind = match (nan_count > 0, infinite_count > 0) {
        (false, false) => return CoordinateValidation::Valid,
        (true, false) => InvalidCoordinateKind::NaN,
        (false, true) => InvalidCoordinateKind::Infinite,
        (true, true) => InvalidCoordinateKind::Mixed,
    };

    CoordinateValidation::Invalid {
        valid,
        kind,
        nan_count,
        infinite_count,
    }
}

// ============================================================================
// Collinearity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Collinearity {
    NotCollinear,
    /// Every point shares x; the set is a line along z.
    ConstantX,
    /// Every point shares z; the set is a line along x.
    ConstantZ,
    /// At least the configured fraction of sampled triples is near-zero area.
    Near { fraction: f64 },
}

impl Collinearity {
    #[must_use]
    pub fn is_collinear(self) -> bool {
        !matches!(self, Self::NotCollinear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollinearityOptions {
    pub tolerance: Tolerance,
    /// Fraction of near-zero triples that makes a set collinear.
    pub fraction: f64,
    /// Maximum number of triples drawn per sampling pass.
    pub sample_limit: usize,
}

impl Default for CollinearityOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::DEDUP,
            fraction: 0.9,
            sample_limit: 1000,
        }
    }
}

/// Twice the signed area of the planar triangle `abc`.
#[inline]
#[must_use]
pub fn planar_area2(a: &GroundPoint, b: &GroundPoint, c: &GroundPoint) -> f64 {
    (b.x - a.x) * (c.z - a.z) - (b.z - a.z) * (c.x - a.x)
}

#[must_use]
pub fn detect_collinearity(
    points: &[GroundPoint],
    bounds: &GroundBounds,
    options: CollinearityOptions,
) -> Collinearity {
    let eps = options.tolerance.eps;
    if bounds.width <= eps {
        return Collinearity::ConstantX;
    }
    if bounds.height <= eps {
        return Collinearity::ConstantZ;
    }

    let n = points.len();
    if n < 3 {
        return Collinearity::Near { fraction: 1.0 };
    }

    // Triangle height relative to the spread, so the test is scale-free.
    let max_spread = bounds.max_spread();
    let area_tol = max_spread * max_spread * COLLINEAR_AREA_FACTOR;
    let limit = options.sample_limit.max(1);
    let is_flat = |a: usize, b: usize, c: usize| {
        planar_area2(&points[a], &points[b], &points[c]).abs() <= area_tol
    };

    let triple_count = (n - 2).min(limit);
    let step = ((n - 2) / triple_count).max(1);
    let consecutive_flat = (0..triple_count)
        .map(|k| k * step)
        .filter(|&i| is_flat(i, i + 1, i + 2))
        .count();
    let consecutive_fraction = consecutive_flat as f64 / triple_count as f64;
    if consecutive_fraction < options.fraction {
        return Collinearity::NotCollinear;
    }

    let mut rng = StdRng::seed_from_u64(TRIPLE_SEED ^ n as u64);
    let mut sampled = 0usize;
    let mut flat = 0usize;
    for _ in 0..limit {
        let a = rng.random_range(0..n);
        let b = rng.random_range(0..n);
        let c = rng.random_range(0..n);
        if a == b || b == c || a == c {
            continue;
        }
        sampled += 1;
        if is_flat(a, b, c) {
            flat += 1;
        }
    }

    let random_fraction = if sampled == 0 {
        consecutive_fraction
    } else {
        flat as f64 / sampled as f64
    };

    if random_fraction >= options.fraction {
        Collinearity::Near {
            fraction: consecutive_fraction.min(random_fraction),
        }
    } else {
        Collinearity::NotCollinear
    }
}

/// Break collinearity with a deterministic offset of `±max_spread * 1e-4`.
///
/// x alternates by index parity, z follows a `-1, 0, +1` pattern. A line along
/// z only gets the x offset, a line along x only the z offset.
#[must_use]
pub fn correct_collinearity(
    points: &[GroundPoint],
    bounds: &GroundBounds,
    collinearity: Collinearity,
    tol: Tolerance,
) -> Vec<GroundPoint> {
    let offset = Tolerance::PERTURBATION
        .relative_to(bounds.max_spread())
        .max(10.0 * tol.eps);
    let (shift_x, shift_z) = match collinearity {
        Collinearity::NotCollinear => return points.to_vec(),
        Collinearity::ConstantX => (true, false),
        Collinearity::ConstantZ => (false, true),
        Collinearity::Near { .. } => (true, true),
    };

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut q = *p;
            if shift_x {
                q.x += if i % 2 == 0 { offset } else { -offset };
            }
            if shift_z {
                q.z += ((i % 3) as f64 - 1.0) * offset;
            }
            q
        })
        .collect()
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum HealthIssue {
    ZeroArea { area: f64 },
    NeedleAspect { ratio: f64 },
    LowDiversity { unique_fraction: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GeometryHealth {
    /// Validation never ran for the reported point set.
    Unchecked,
    Healthy,
    Unhealthy(HealthIssue),
}

impl GeometryHealth {
    #[must_use]
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for GeometryHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => f.write_str("unchecked"),
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy(HealthIssue::ZeroArea { area }) => {
                write!(f, "bounding area {area:e} below minimum")
            }
            Self::Unhealthy(HealthIssue::NeedleAspect { ratio }) => {
                write!(f, "aspect ratio {ratio:e} too needle-like")
            }
            Self::Unhealthy(HealthIssue::LowDiversity { unique_fraction }) => {
                write!(f, "only {:.1}% of points spatially unique", unique_fraction * 100.0)
            }
        }
    }
}

#[must_use]
pub fn validate_health(points: &[GroundPoint], bounds: &GroundBounds, tol: Tolerance) -> GeometryHealth {
    let area = bounds.area();
    if area < Tolerance::MIN_AREA.eps {
        return GeometryHealth::Unhealthy(HealthIssue::ZeroArea { area });
    }

    if bounds.max_spread() > 0.0 {
        let ratio = bounds.aspect_ratio();
        if ratio < Tolerance::MIN_ASPECT.eps {
            return GeometryHealth::Unhealthy(HealthIssue::NeedleAspect { ratio });
        }
    }

    if points.len() > DIVERSITY_MIN_POINTS {
        let unique: HashSet<(u64, u64)> = points
            .iter()
            .filter_map(|p| p.planar_cell(tol.eps))
            .collect();
        let unique_fraction = unique.len() as f64 / points.len() as f64;
        if unique_fraction < MIN_UNIQUE_FRACTION {
            return GeometryHealth::Unhealthy(HealthIssue::LowDiversity { unique_fraction });
        }
    }

    GeometryHealth::Healthy
}

/// Golden-angle spiral jitter with radius `max(max_spread * 1e-4, 10 * eps)`.
#[must_use]
pub fn ensure_non_degenerate(points: &[GroundPoint], bounds: &GroundBounds, tol: Tolerance) -> Vec<GroundPoint> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    let radius = Tolerance::PERTURBATION
        .relative_to(bounds.max_spread())
        .max(10.0 * tol.eps);
    let n = points.len().max(1) as f64;

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let theta = i as f64 * golden_angle;
            let r = radius * ((i as f64 + 0.5) / n).sqrt();
            GroundPoint::new(p.x + r * theta.cos(), p.y, p.z + r * theta.sin(), p.original_index)
        })
        .collect()
}

// ============================================================================
// Conditioning pass
// ============================================================================

/// A point set ready for normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedPoints {
    pub points: Vec<GroundPoint>,
    pub bounds: GroundBounds,
    /// Collinearity as first detected, before any correction.
    pub collinearity: Collinearity,
    pub collinearity_corrected: bool,
    pub perturbed: bool,
    pub health: GeometryHealth,
}

/// Run collinearity handling and health validation over a finite point set.
///
/// Fails with `DegenerateGeometry` when correction cannot break collinearity
/// or when the bounding area is still zero after the perturbation pass. Other
/// health issues are reported in `health` and left to the caller.
pub fn condition(points: Vec<GroundPoint>, options: CollinearityOptions) -> GroundMeshResult<ConditionedPoints> {
    if points.len() < 3 {
        return Err(GroundMeshError::insufficient(points.len(), "conditioning"));
    }
    let tol = options.tolerance;
    let mut bounds = GroundBounds::from_points(&points)
        .ok_or_else(|| GroundMeshError::degenerate("no finite points to bound", None))?;

    let collinearity = detect_collinearity(&points, &bounds, options);
    let mut points = points;
    let mut collinearity_corrected = false;

    if collinearity.is_collinear() {
        log::warn!("conditioning: {collinearity:?} detected for {} points, correcting", points.len());
        points = correct_collinearity(&points, &bounds, collinearity, tol);
        bounds = GroundBounds::from_points(&points).unwrap_or(bounds);
        let recheck = detect_collinearity(&points, &bounds, options);
        if recheck.is_collinear() {
            return Err(GroundMeshError::degenerate(
                format!("points remain collinear after correction ({recheck:?})"),
                Some(bounds),
            ));
        }
        collinearity_corrected = true;
    }

    let mut health = validate_health(&points, &bounds, tol);
    let mut perturbed = false;
    if !health.is_healthy() {
        log::warn!("conditioning: {health}, applying spiral perturbation");
        points = ensure_non_degenerate(&points, &bounds, tol);
        bounds = GroundBounds::from_points(&points).unwrap_or(bounds);
        health = validate_health(&points, &bounds, tol);
        perturbed = true;
    }

    if let GeometryHealth::Unhealthy(HealthIssue::ZeroArea { .. }) = health {
        return Err(GroundMeshError::degenerate(health.to_string(), Some(bounds)));
    }

    log::debug!(
        "conditioning: {} points, bounds {:.3}x{:.3}, health {health}",
        points.len(),
        bounds.width,
        bounds.height
    );

    Ok(ConditionedPoints {
        points,
        bounds,
        collinearity,
        collinearity_corrected,
        perturbed,
        health,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, spacing: f64) -> Vec<GroundPoint> {
        (0..n * n)
            .map(|i| GroundPoint::new((i % n) as f64 * spacing, 0.0, (i / n) as f64 * spacing, i))
            .collect()
    }

    #[test]
    fn test_validate_coordinates_reasons() {
        let ok = grid(2, 1.0);
        assert_eq!(validate_coordinates(&ok), CoordinateValidation::Valid);

        let mut nan = ok.clone();
        nan[0].x = f64::NAN;
        match validate_coordinates(&nan) {
            CoordinateValidation::Invalid { valid, kind, nan_count, .. } => {
                assert_eq!(kind, InvalidCoordinateKind::NaN);
                assert_eq!(nan_count, 1);
                assert_eq!(valid.len(), 3);
            }
            other => panic!("expected invalid, got {other:?}"),
        }

        let mut mixed = nan.clone();
        mixed[1].z = f64::NEG_INFINITY;
        assert!(matches!(
            validate_coordinates(&mixed),
            CoordinateValidation::Invalid { kind: InvalidCoordinateKind::Mixed, .. }
        ));

        let mut inf = ok;
        inf[2].y = f64::INFINITY;
        assert!(matches!(
            validate_coordinates(&inf),
            CoordinateValidation::Invalid { kind: InvalidCoordinateKind::Infinite, .. }
        ));
    }

    #[test]
    fn test_exact_collinearity() {
        let line: Vec<GroundPoint> = (0..5).map(|i| GroundPoint::new(i as f64, 0.0, 0.0, i)).collect();
        let bounds = GroundBounds::from_points(&line).unwrap();
        assert_eq!(
            detect_collinearity(&line, &bounds, CollinearityOptions::default()),
            Collinearity::ConstantZ
        );

        let column: Vec<GroundPoint> = (0..5).map(|i| GroundPoint::new(3.0, 0.0, i as f64, i)).collect();
        let bounds = GroundBounds::from_points(&column).unwrap();
        assert_eq!(
            detect_collinearity(&column, &bounds, CollinearityOptions::default()),
            Collinearity::ConstantX
        );
    }

    #[test]
    fn test_diagonal_line_is_near_collinear() {
        let line: Vec<GroundPoint> = (0..40)
            .map(|i| GroundPoint::new(i as f64, 0.0, i as f64 * 0.5, i))
            .collect();
        let bounds = GroundBounds::from_points(&line).unwrap();
        let result = detect_collinearity(&line, &bounds, CollinearityOptions::default());
        assert!(matches!(result, Collinearity::Near { .. }));
    }

    #[test]
    fn test_row_major_grid_is_not_collinear() {
        let points = grid(30, 1.0);
        let bounds = GroundBounds::from_points(&points).unwrap();
        assert_eq!(
            detect_collinearity(&points, &bounds, CollinearityOptions::default()),
            Collinearity::NotCollinear
        );
    }

    #[test]
    fn test_small_scale_scatter_is_not_collinear() {
        let mut rng = StdRng::seed_from_u64(9);
        let points: Vec<GroundPoint> = (0..200)
            .map(|i| GroundPoint::new(rng.random_range(0.0..0.002), 0.0, rng.random_range(0.0..0.002), i))
            .collect();
        let bounds = GroundBounds::from_points(&points).unwrap();
        assert_eq!(
            detect_collinearity(&points, &bounds, CollinearityOptions::default()),
            Collinearity::NotCollinear
        );
        let conditioned = condition(points, CollinearityOptions::default()).unwrap();
        assert!(!conditioned.collinearity_corrected);
    }

    #[test]
    fn test_near_collinear_detection_is_scale_free() {
        // A shallow zigzag: triple heights stay far below 1e-3 of the spread.
        let zigzag = |scale: f64| -> Vec<GroundPoint> {
            (0..60)
                .map(|i| {
                    let z = if i % 2 == 0 { 0.0 } else { 1e-5 };
                    GroundPoint::new(i as f64 * scale, 0.0, (i as f64 * 0.3 + z) * scale, i)
                })
                .collect()
        };
        for scale in [1e-3, 1.0, 1e4] {
            let points = zigzag(scale);
            let bounds = GroundBounds::from_points(&points).unwrap();
            let result = detect_collinearity(&points, &bounds, CollinearityOptions::default());
            assert!(matches!(result, Collinearity::Near { .. }), "scale {scale}: {result:?}");
        }
    }

    #[test]
    fn test_correction_breaks_exact_line() {
        let line: Vec<GroundPoint> = (0..6).map(|i| GroundPoint::new(i as f64, 0.0, 0.0, i)).collect();
        let bounds = GroundBounds::from_points(&line).unwrap();
        let corrected = correct_collinearity(&line, &bounds, Collinearity::ConstantZ, Tolerance::DEDUP);
        assert_eq!(corrected.len(), line.len());
        assert!(corrected.iter().zip(&line).all(|(a, b)| a.x == b.x));
        let offset = 5.0 * 1e-4;
        assert!((corrected[0].z + offset).abs() < 1e-15);
        assert_eq!(corrected[1].z, 0.0);
        assert!((corrected[2].z - offset).abs() < 1e-15);
    }

    #[test]
    fn test_condition_rejects_uncorrectable_line() {
        // Evenly spaced triple: the -1, 0, +1 z pattern keeps it on a line.
        let line: Vec<GroundPoint> = (0..3).map(|i| GroundPoint::new(i as f64, 0.0, 0.0, i)).collect();
        let result = condition(line, CollinearityOptions::default());
        assert!(matches!(result, Err(GroundMeshError::DegenerateGeometry { .. })));
    }

    #[test]
    fn test_condition_long_line_corrected_or_rejected() {
        let line: Vec<GroundPoint> = (0..20).map(|i| GroundPoint::new(i as f64, 0.0, 0.0, i)).collect();
        match condition(line, CollinearityOptions::default()) {
            Ok(conditioned) => {
                assert!(conditioned.collinearity_corrected);
                assert_eq!(conditioned.collinearity, Collinearity::ConstantZ);
                assert!(conditioned.bounds.height > 0.0);
            }
            Err(err) => assert!(matches!(err, GroundMeshError::DegenerateGeometry { .. })),
        }
    }

    #[test]
    fn test_health_checks() {
        let tol = Tolerance::DEDUP;
        let healthy = grid(4, 1.0);
        let bounds = GroundBounds::from_points(&healthy).unwrap();
        assert_eq!(validate_health(&healthy, &bounds, tol), GeometryHealth::Healthy);

        let tiny = grid(4, 1e-4);
        let bounds = GroundBounds::from_points(&tiny).unwrap();
        assert!(matches!(
            validate_health(&tiny, &bounds, tol),
            GeometryHealth::Unhealthy(HealthIssue::ZeroArea { .. })
        ));

        let needle = vec![
            GroundPoint::new(0.0, 0.0, 0.0, 0),
            GroundPoint::new(1000.0, 0.0, 0.0, 1),
            GroundPoint::new(500.0, 0.0, 0.01, 2),
        ];
        let bounds = GroundBounds::from_points(&needle).unwrap();
        assert!(matches!(
            validate_health(&needle, &bounds, tol),
            GeometryHealth::Unhealthy(HealthIssue::NeedleAspect { .. })
        ));

        let mut crowded = vec![GroundPoint::new(0.5, 0.0, 0.5, 0); 12];
        crowded.push(GroundPoint::new(0.0, 0.0, 0.0, 12));
        crowded.push(GroundPoint::new(1.0, 0.0, 1.0, 13));
        let bounds = GroundBounds::from_points(&crowded).unwrap();
        assert!(matches!(
            validate_health(&crowded, &bounds, tol),
            GeometryHealth::Unhealthy(HealthIssue::LowDiversity { .. })
        ));
    }

    #[test]
    fn test_ensure_non_degenerate_keeps_points_close() {
        let points = grid(5, 1.0);
        let bounds = GroundBounds::from_points(&points).unwrap();
        let jittered = ensure_non_degenerate(&points, &bounds, Tolerance::DEDUP);
        let radius = 4.0 * 1e-4;
        for (a, b) in jittered.iter().zip(&points) {
            let d = ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt();
            assert!(d <= radius + 1e-12);
            assert_eq!(a.y, b.y);
            assert_eq!(a.original_index, b.original_index);
        }
    }

    #[test]
    fn test_condition_perturbs_crowded_set_and_proceeds() {
        let mut points = grid(4, 1.0);
        points.extend((16..36).map(|i| GroundPoint::new(1.5, 0.0, 1.5, i)));
        let bounds = GroundBounds::from_points(&points).unwrap();
        assert!(matches!(
            validate_health(&points, &bounds, Tolerance::DEDUP),
            GeometryHealth::Unhealthy(HealthIssue::LowDiversity { .. })
        ));

        let conditioned = condition(points.clone(), CollinearityOptions::default()).unwrap();
        assert!(conditioned.perturbed);
        assert!(!conditioned.collinearity_corrected);
        assert_eq!(conditioned.points.len(), points.len());
        assert_ne!(conditioned.points, points);
        assert!(conditioned.health.is_healthy());
    }

    #[test]
    fn test_condition_rejects_zero_area_after_perturbation() {
        let tiny = grid(4, 1e-4);
        match condition(tiny, CollinearityOptions::default()) {
            Err(GroundMeshError::DegenerateGeometry { reason, bounds }) => {
                assert!(reason.contains("bounding area"), "{reason}");
                assert!(bounds.is_some_and(|b| b.area() < Tolerance::MIN_AREA.eps));
            }
            other => panic!("expected degenerate geometry, got {other:?}"),
        }
    }

    #[test]
    fn test_condition_healthy_grid_untouched() {
        let points = grid(6, 1.0);
        let conditioned = condition(points.clone(), CollinearityOptions::default()).unwrap();
        assert_eq!(conditioned.points, points);
        assert!(!conditioned.collinearity_corrected);
        assert!(!conditioned.perturbed);
        assert!(conditioned.health.is_healthy());
    }
}
