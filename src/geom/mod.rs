mod conditioning;
mod core;
mod diagnostics;
mod downsample;
mod error;
mod exhaustive;
mod mesh;
mod metrics;
mod normalize;
mod normals;
mod options;
mod pipeline;
mod retry;
mod sanitize;
mod triangulation;

pub use conditioning::{
    Collinearity, CollinearityOptions, ConditionedPoints, CoordinateValidation, GeometryHealth,
    HealthIssue, InvalidCoordinateKind, condition, correct_collinearity, detect_collinearity,
    ensure_non_degenerate, planar_area2, validate_coordinates, validate_health,
};
pub use self::core::{GroundBounds, GroundPoint, Tolerance, Vec3};
pub use diagnostics::PipelineDiagnostics;
pub use downsample::{
    DownsampleStrategy, GridSample, MAX_TRIANGULATION_POINTS, PROGRESSIVE_RATIOS, grid_sample,
    grid_sample_with_fallback, grid_size_for, progressive_sample,
};
pub use error::{ExhaustionReport, GroundMeshError, GroundMeshResult, StageCounts, TriangulationFailureKind};
pub use exhaustive::{
    ExhaustiveOptions, MAX_POINTS_FOR_MESH, MAX_TRIANGLES, MIN_TRIANGLE_AREA, enumerate_triangles,
    exhaustive_mesh, exhaustive_triangulate, stride_down, triangle_area,
};
pub use mesh::{GroundMesh, MeshAssembly, MeshBuffers, assemble, assemble_timed, orient_upward};
pub use metrics::{PipelineMetrics, PipelineTimingReport, TimingBucket};
pub use normalize::{NormalizationTransform, NormalizedCoordinates, choose_scale, normalize};
pub use normals::{VertexNormals, compute_vertex_normals, face_normal};
pub use options::PipelineOptions;
pub use pipeline::{GroundMeshOutput, build_ground_mesh, build_ground_mesh_f32, build_ground_mesh_with_backend};
pub use retry::{AttemptOutcome, RetryPolicy, RetryState};
pub use sanitize::{SanitizedPoints, deduplicate, points_from_buffer, points_from_f32_buffer, sanitize};
pub use triangulation::{
    BackendError, CoordinateRepresentation, DelaunatorBackend, DelaunayBackend, RawTriangulation,
    TriangulationResult, triangulate_normalized, triangulate_with_corner_fallback, validate_triangulation,
};

#[cfg(test)]
mod tests;
