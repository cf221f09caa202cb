use serde::{Deserialize, Serialize};

use super::conditioning::CollinearityOptions;
use super::core::Tolerance;
use super::downsample::{MAX_TRIANGULATION_POINTS, PROGRESSIVE_RATIOS};
use super::retry::RetryPolicy;

/// Tunables for a ground mesh run.
///
/// Every field has a default, so partial option objects deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Spatial-hash cell size for deduplication and diversity checks.
    pub dedup_epsilon: f64,
    /// Point count above which grid sampling runs before the first attempt.
    pub max_points: usize,
    /// Ratios of the validated set tried after a failed attempt, in order.
    pub progressive_ratios: Vec<f64>,
    /// Fraction of near-zero sampled triples that marks a set as collinear.
    pub collinear_fraction: f64,
    /// Triples drawn per collinearity sampling pass.
    pub collinear_sample_limit: usize,
    /// Run the bounding-box corner fallback once every ratio failed.
    pub corner_fallback: bool,
    /// Flip triangles so face normals point along +y.
    pub orient_upward: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dedup_epsilon: Tolerance::DEDUP.eps,
            max_points: MAX_TRIANGULATION_POINTS,
            progressive_ratios: PROGRESSIVE_RATIOS.to_vec(),
            collinear_fraction: 0.9,
            collinear_sample_limit: 1000,
            corner_fallback: true,
            orient_upward: true,
        }
    }
}

impl PipelineOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dedup_epsilon(mut self, eps: f64) -> Self {
        if eps.is_finite() && eps > 0.0 {
            self.dedup_epsilon = eps;
        }
        self
    }

    #[must_use]
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(3);
        self
    }

    /// Non-finite ratios and ratios outside `(0, 1]` are dropped.
    #[must_use]
    pub fn with_progressive_ratios(mut self, ratios: impl Into<Vec<f64>>) -> Self {
        self.progressive_ratios = ratios.into();
        self.progressive_ratios.retain(|r| r.is_finite() && *r > 0.0 && *r <= 1.0);
        self
    }

    #[must_use]
    pub fn with_collinear_fraction(mut self, fraction: f64) -> Self {
        self.collinear_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_collinear_sample_limit(mut self, limit: usize) -> Self {
        self.collinear_sample_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_corner_fallback(mut self, enabled: bool) -> Self {
        self.corner_fallback = enabled;
        self
    }

    #[must_use]
    pub fn with_orient_upward(mut self, enabled: bool) -> Self {
        self.orient_upward = enabled;
        self
    }

    #[must_use]
    pub fn tolerance(&self) -> Tolerance {
        if self.dedup_epsilon.is_finite() && self.dedup_epsilon > 0.0 {
            Tolerance::new(self.dedup_epsilon)
        } else {
            Tolerance::DEDUP
        }
    }

    #[must_use]
    pub fn collinearity(&self) -> CollinearityOptions {
        CollinearityOptions {
            tolerance: self.tolerance(),
            fraction: self.collinear_fraction,
            sample_limit: self.collinear_sample_limit.max(1),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.progressive_ratios.len(), self.corner_fallback)
    }
}
