//! Run diagnostics for the ground mesh pipeline.
//!
//! Every successful mesh comes with a [`PipelineDiagnostics`] describing what
//! the pipeline had to do to produce it: how many points survived each stage,
//! which corrections were applied and which sampling strategies were tried.
//!
//! # Example
//!
//! ```ignore
//! use ground_mesh_engine::geom::{PipelineOptions, build_ground_mesh};
//!
//! let output = build_ground_mesh(&positions, count, None, &PipelineOptions::default())?;
//! if output.diagnostics.has_warnings() {
//!     for warning in &output.diagnostics.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//! }
//! println!("{}", output.diagnostics.summary());
//! ```

use std::fmt;

use serde::Serialize;

use super::conditioning::{Collinearity, GeometryHealth};
use super::core::GroundBounds;
use super::downsample::DownsampleStrategy;
use super::metrics::PipelineTimingReport;
use super::normalize::NormalizationTransform;
use super::retry::RetryState;
use super::triangulation::CoordinateRepresentation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDiagnostics {
    /// Points read from the caller's buffer.
    pub input_count: usize,
    /// Points left after spatial-hash deduplication.
    pub deduplicated_count: usize,
    /// Finite points handed to conditioning and sampling.
    pub validated_count: usize,
    /// Vertices in the final mesh.
    pub vertex_count: usize,
    pub triangle_count: usize,

    pub duplicates_removed: usize,
    /// Points dropped for NaN or infinite coordinates.
    pub non_finite_dropped: usize,

    /// Planar bounds of the final active set.
    pub bounds: Option<GroundBounds>,
    /// Collinearity as first detected on the final active set.
    pub collinearity: Option<Collinearity>,
    pub collinearity_corrected: bool,
    /// Whether the spiral perturbation was applied.
    pub perturbed: bool,
    pub health: GeometryHealth,

    /// Sampling strategy of every attempt, in order.
    pub strategies: Vec<DownsampleStrategy>,
    pub attempts: usize,
    pub final_state: RetryState,
    /// True when the mesh came from the bounding-box corner fallback.
    pub corner_fallback_used: bool,
    pub representation: Option<CoordinateRepresentation>,
    pub transform: Option<NormalizationTransform>,
    /// Points whose normalized coordinates overflowed and were zeroed.
    pub overflowed_points: usize,

    /// Triangles whose winding was flipped to face +y.
    pub flipped_triangles: usize,
    /// Faces too small to contribute to vertex normals.
    pub degenerate_faces: usize,

    /// Only populated with the `mesh_engine_metrics` feature on native targets.
    pub timing: Option<PipelineTimingReport>,

    /// Human-readable notes about corrections applied during the run.
    pub warnings: Vec<String>,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            input_count: 0,
            deduplicated_count: 0,
            validated_count: 0,
            vertex_count: 0,
            triangle_count: 0,
            duplicates_removed: 0,
            non_finite_dropped: 0,
            bounds: None,
            collinearity: None,
            collinearity_corrected: false,
            perturbed: false,
            health: GeometryHealth::Unchecked,
            strategies: Vec::new(),
            attempts: 0,
            final_state: RetryState::Initial,
            corner_fallback_used: false,
            representation: None,
            transform: None,
            overflowed_points: 0,
            flipped_triangles: 0,
            degenerate_faces: 0,
            timing: None,
            warnings: Vec::new(),
        }
    }
}

impl PipelineDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// True when any sampling strategy other than `None` ran.
    #[must_use]
    pub fn downsampled(&self) -> bool {
        self.strategies
            .iter()
            .any(|s| !matches!(s, DownsampleStrategy::None { .. }))
    }

    /// True when the mesh needed no correction, sampling or fallback.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.collinearity_corrected
            && !self.perturbed
            && !self.corner_fallback_used
            && !self.downsampled()
            && self.attempts <= 1
            && self.non_finite_dropped == 0
            && self.warnings.is_empty()
    }

    /// Format: `"V:{vertices} T:{triangles} [notes...]"`
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("V:{} T:{}", self.vertex_count, self.triangle_count)];

        if self.duplicates_removed > 0 {
            parts.push(format!("dedup:{}", self.duplicates_removed));
        }
        if self.non_finite_dropped > 0 {
            parts.push(format!("non-finite:{}", self.non_finite_dropped));
        }
        if self.attempts > 1 {
            parts.push(format!("attempts:{}", self.attempts));
        }
        if self.downsampled() {
            parts.push("downsampled".to_string());
        }
        if self.collinearity_corrected {
            parts.push("collinear-corrected".to_string());
        }
        if self.perturbed {
            parts.push("perturbed".to_string());
        }
        if self.corner_fallback_used {
            parts.push("corner-fallback".to_string());
        }
        if self.flipped_triangles > 0 {
            parts.push(format!("flipped:{}", self.flipped_triangles));
        }

        parts.join(" ")
    }
}

impl fmt::Display for PipelineDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ground Mesh Diagnostics:")?;
        writeln!(
            f,
            "  Points: {} in, {} deduplicated, {} valid",
            self.input_count, self.deduplicated_count, self.validated_count
        )?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        writeln!(f, "  Attempts: {} ({:?})", self.attempts, self.final_state)?;

        if let Some(bounds) = self.bounds {
            writeln!(
                f,
                "  Bounds: x[{}, {}] z[{}, {}]",
                bounds.min_x, bounds.max_x, bounds.min_z, bounds.max_z
            )?;
        }
        writeln!(f, "  Geometry: {}", self.health)?;

        if !self.strategies.is_empty() {
            writeln!(f, "  Strategies:")?;
            for strategy in &self.strategies {
                writeln!(f, "    - {strategy:?}")?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }

        if let Some(ref timing) = self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }

        let status = if self.is_clean() { "CLEAN" } else { "CORRECTED" };
        writeln!(f, "  Status: {status}")?;

        Ok(())
    }
}
