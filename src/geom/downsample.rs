//! Point-count reduction.
//!
//! Grid sampling partitions the bounding box into a square grid and keeps one
//! representative per occupied cell: the point at the median *position* of
//! the cell's insertion-ordered bucket, never an averaged point. Progressive
//! sampling re-runs grid sampling at shrinking ratios of the original
//! validated set when a full triangulation cycle failed.

use serde::Serialize;

use super::conditioning::validate_health;
use super::core::{GroundBounds, GroundPoint, Tolerance};

/// Ratios tried in order by progressive sampling.
pub const PROGRESSIVE_RATIOS: [f64; 5] = [0.5, 0.25, 0.1, 0.05, 0.01];

/// Point count above which grid sampling is applied before the first attempt.
pub const MAX_TRIANGULATION_POINTS: usize = 100_000;

const EXTREME_ASPECT: f64 = 0.1;
const MAX_ASPECT_BOOST: f64 = 0.5;

/// How the active point set of an attempt was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DownsampleStrategy {
    None {
        point_count: usize,
    },
    Grid {
        point_count: usize,
        grid_size: usize,
        original_count: usize,
    },
    Progressive {
        point_count: usize,
        ratio: f64,
        original_count: usize,
        attempt: usize,
    },
}

impl DownsampleStrategy {
    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            Self::None { point_count }
            | Self::Grid { point_count, .. }
            | Self::Progressive { point_count, .. } => *point_count,
        }
    }
}

/// Output of a grid sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSample {
    pub points: Vec<GroundPoint>,
    /// Cells per side; 0 when no sampling was needed.
    pub grid_size: usize,
    pub occupied_cells: usize,
    /// True when the multi-point-per-cell pass produced `points`.
    pub enhanced: bool,
}

/// Keep `count` entries spread evenly over `items`, preserving order.
fn thin_evenly<T: Copy>(items: &[T], count: usize) -> Vec<T> {
    if count >= items.len() {
        return items.to_vec();
    }
    (0..count).map(|k| items[k * items.len() / count]).collect()
}

/// Cells per side for `target`, inflated by up to 50% for extreme aspect ratios.
#[must_use]
pub fn grid_size_for(target: usize, bounds: &GroundBounds) -> usize {
    let aspect = bounds.aspect_ratio();
    let boost = if aspect < EXTREME_ASPECT {
        1.0 + MAX_ASPECT_BOOST * (1.0 - aspect / EXTREME_ASPECT)
    } else {
        1.0
    };
    let adjusted = (target as f64 * boost).ceil();
    (adjusted.sqrt().ceil() as usize).max(1)
}

fn cell_coord(value: f64, min: f64, span: f64, grid_size: usize) -> usize {
    if span <= 0.0 {
        return 0;
    }
    let t = ((value - min) / span * grid_size as f64).floor();
    if t.is_finite() && t > 0.0 {
        (t as usize).min(grid_size - 1)
    } else {
        0
    }
}

/// Point indices per cell, row-major, each bucket in input order.
fn bucket_points(points: &[GroundPoint], bounds: &GroundBounds, grid_size: usize) -> Vec<Vec<usize>> {
    let mut buckets = vec![Vec::new(); grid_size * grid_size];
    for (i, p) in points.iter().enumerate() {
        let cx = cell_coord(p.x, bounds.min_x, bounds.width, grid_size);
        let cz = cell_coord(p.z, bounds.min_z, bounds.height, grid_size);
        buckets[cz * grid_size + cx].push(i);
    }
    buckets
}

fn single_representatives(points: &[GroundPoint], buckets: &[Vec<usize>], target: usize) -> Vec<GroundPoint> {
    let representatives: Vec<GroundPoint> = buckets
        .iter()
        .filter(|bucket| !bucket.is_empty())
        .map(|bucket| points[bucket[bucket.len() / 2]])
        .collect();

    let mut sampled = thin_evenly(&representatives, target);
    if sampled.len() < 3 && points.len() >= 3 {
        sampled = thin_evenly(points, 3);
    }
    sampled
}

/// One representative per occupied cell, capped at `target` (and at least 3).
#[must_use]
pub fn grid_sample(points: &[GroundPoint], target: usize) -> GridSample {
    let target = target.max(3);
    let Some(bounds) = GroundBounds::from_points(points).filter(|_| points.len() > target) else {
        return GridSample {
            points: points.to_vec(),
            grid_size: 0,
            occupied_cells: 0,
            enhanced: false,
        };
    };

    let grid_size = grid_size_for(target, &bounds);
    let buckets = bucket_points(points, &bounds, grid_size);
    let occupied_cells = buckets.iter().filter(|b| !b.is_empty()).count();

    GridSample {
        points: single_representatives(points, &buckets, target),
        grid_size,
        occupied_cells,
        enhanced: false,
    }
}

/// Grid sampling with a denser multi-point-per-cell retry.
///
/// When the single-representative result fails health validation and cells
/// hold more than one point on average, up to `ceil(target / occupied)` points
/// (at least 2) are taken from each cell. The denser set is kept only when it
/// passes validation; it may slightly exceed `target`.
#[must_use]
pub fn grid_sample_with_fallback(points: &[GroundPoint], target: usize, tol: Tolerance) -> GridSample {
    let target = target.max(3);
    let Some(bounds) = GroundBounds::from_points(points).filter(|_| points.len() > target) else {
        return grid_sample(points, target);
    };

    let grid_size = grid_size_for(target, &bounds);
    let buckets = bucket_points(points, &bounds, grid_size);
    let occupied_cells = buckets.iter().filter(|b| !b.is_empty()).count().max(1);
    let base = single_representatives(points, &buckets, target);

    let base_health = GroundBounds::from_points(&base)
        .map(|b| validate_health(&base, &b, tol))
        .filter(|h| !h.is_healthy());
    let average_occupancy = points.len() as f64 / occupied_cells as f64;

    if base_health.is_some() && average_occupancy > 1.0 {
        let quota = ((target as f64 / occupied_cells as f64).ceil() as usize).max(2);
        let dense: Vec<GroundPoint> = buckets
            .iter()
            .filter(|bucket| !bucket.is_empty())
            .flat_map(|bucket| {
                let take = quota.min(bucket.len());
                (0..take).map(move |k| bucket[k * bucket.len() / take])
            })
            .map(|i| points[i])
            .collect();

        let dense_healthy = GroundBounds::from_points(&dense)
            .is_some_and(|b| validate_health(&dense, &b, tol).is_healthy());
        if dense_healthy {
            log::debug!(
                "downsample: dense grid pass kept {} points ({quota} per cell)",
                dense.len()
            );
            return GridSample {
                points: dense,
                grid_size,
                occupied_cells,
                enhanced: true,
            };
        }
    }

    GridSample {
        points: base,
        grid_size,
        occupied_cells,
        enhanced: false,
    }
}

/// Re-sample the original validated set at `ratio`.
///
/// Always starts from `original`, never from a previously sampled set.
#[must_use]
pub fn progressive_sample(
    original: &[GroundPoint],
    ratio: f64,
    attempt: usize,
) -> (Vec<GroundPoint>, DownsampleStrategy) {
    let target = ((original.len() as f64 * ratio).floor() as usize).max(3);
    let sample = grid_sample(original, target);
    let strategy = DownsampleStrategy::Progressive {
        point_count: sample.points.len(),
        ratio,
        original_count: original.len(),
        attempt,
    };
    log::debug!(
        "downsample: progressive attempt {attempt} at ratio {ratio} kept {} of {} points",
        sample.points.len(),
        original.len()
    );
    (sample.points, strategy)
}
