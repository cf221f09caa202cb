//! Error taxonomy for the ground mesh pipeline.
//!
//! Recoverable conditions (collinearity, low diversity, a single failed
//! triangulation attempt) are handled inside the pipeline. Only the variants
//! below ever reach a caller, and every one of them carries enough context to
//! explain the failure without re-running the pipeline.

use serde::Serialize;

use super::conditioning::GeometryHealth;
use super::core::GroundBounds;
use super::downsample::DownsampleStrategy;

/// Result type for ground mesh operations.
pub type GroundMeshResult<T> = Result<T, GroundMeshError>;

/// Which part of the triangulation primitive's contract was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriangulationFailureKind {
    /// The primitive raised for every numeric representation.
    EngineFailure,
    /// The primitive returned a well-formed but empty triangle list.
    EmptyResult,
    /// The primitive returned out-of-range indices or mismatched buffers.
    Malformed,
    /// Conditioning rejected the attempt before the primitive was called.
    Conditioning,
}

/// Point counts observed at each stage of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub input: usize,
    pub deduplicated: usize,
    pub validated: usize,
    pub last_attempt: usize,
}

/// Full context for a run that exhausted every retry and fallback strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustionReport {
    pub strategies: Vec<DownsampleStrategy>,
    pub final_failure: TriangulationFailureKind,
    pub final_reason: String,
    pub coordinate_range: Option<GroundBounds>,
    pub collinear: bool,
    pub geometry: GeometryHealth,
    pub counts: StageCounts,
}

impl std::fmt::Display for ExhaustionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} strategies tried, last failure {:?}: {}; collinear={}, geometry={}",
            self.strategies.len(),
            self.final_failure,
            self.final_reason,
            self.collinear,
            self.geometry,
        )?;
        if let Some(range) = self.coordinate_range {
            write!(
                f,
                ", range x[{}, {}] z[{}, {}]",
                range.min_x, range.max_x, range.min_z, range.max_z
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GroundMeshError {
    #[error("position buffer holds {actual} floats, {expected} required")]
    BufferTooShort { expected: usize, actual: usize },
    #[error("insufficient points: {remaining} left after {stage}, at least 3 required")]
    InsufficientPoints { remaining: usize, stage: &'static str },
    #[error("invalid coordinates: {reason}; {valid} finite of {total} points")]
    InvalidCoordinates {
        reason: String,
        valid: usize,
        total: usize,
    },
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry {
        reason: String,
        bounds: Option<GroundBounds>,
    },
    #[error("triangulation engine failed for every numeric representation: {message}")]
    TriangulationEngineFailure { point_count: usize, message: String },
    #[error("triangulation produced no triangles for {point_count} points: {reason}")]
    TriangulationEmptyResult { point_count: usize, reason: String },
    #[error("triangulation output is malformed for {point_count} points: {message}")]
    TriangulationMalformed { point_count: usize, message: String },
    #[error("triangulation exhausted: {0}")]
    TriangulationExhausted(Box<ExhaustionReport>),
}

impl GroundMeshError {
    pub(crate) fn insufficient(remaining: usize, stage: &'static str) -> Self {
        Self::InsufficientPoints { remaining, stage }
    }

    pub(crate) fn degenerate(reason: impl Into<String>, bounds: Option<GroundBounds>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
            bounds,
        }
    }
}
