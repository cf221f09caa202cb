//! Opt-in stage timing for the ground mesh pipeline.
//!
//! Timing is only collected when the `mesh_engine_metrics` feature is enabled
//! and the target is not WASM (`std::time::Instant` is unavailable there).
//! Otherwise every call is a pass-through and [`PipelineMetrics::end`] returns
//! `None`.

use serde::Serialize;

/// Pipeline stages that accumulate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Buffer intake and deduplication.
    Sanitize,
    /// Coordinate validation, collinearity and health checks.
    Conditioning,
    /// Grid and progressive sampling.
    Downsampling,
    /// Centering and scaling ahead of the primitive.
    Normalization,
    /// Calls into the Delaunay primitive, including validation.
    Triangulation,
    /// Smooth normal accumulation.
    Normals,
    /// Mesh buffer assembly and orientation.
    Assembly,
}

/// Cumulative nanoseconds per stage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineTimingReport {
    pub sanitize_ns: u64,
    pub conditioning_ns: u64,
    pub downsampling_ns: u64,
    pub normalization_ns: u64,
    pub triangulation_ns: u64,
    pub normals_ns: u64,
    pub assembly_ns: u64,
}

impl PipelineTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.sanitize_ns
            .saturating_add(self.conditioning_ns)
            .saturating_add(self.downsampling_ns)
            .saturating_add(self.normalization_ns)
            .saturating_add(self.triangulation_ns)
            .saturating_add(self.normals_ns)
            .saturating_add(self.assembly_ns)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
    fn slot(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Sanitize => &mut self.sanitize_ns,
            TimingBucket::Conditioning => &mut self.conditioning_ns,
            TimingBucket::Downsampling => &mut self.downsampling_ns,
            TimingBucket::Normalization => &mut self.normalization_ns,
            TimingBucket::Triangulation => &mut self.triangulation_ns,
            TimingBucket::Normals => &mut self.normals_ns,
            TimingBucket::Assembly => &mut self.assembly_ns,
        }
    }
}

/// Accumulator for stage timings.
///
/// Call [`begin`](Self::begin) to reset, wrap stages with
/// [`time`](Self::time), and read the report with [`end`](Self::end).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
    report: PipelineTimingReport,
}

impl PipelineMetrics {
    pub fn begin(&mut self) {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            self.report = PipelineTimingReport::default();
        }
    }

    /// The accumulated report, or `None` when metrics are compiled out.
    #[must_use]
    pub fn end(&self) -> Option<PipelineTimingReport> {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Run `f` and add its elapsed time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            let slot = self.report.slot(bucket);
            *slot = slot.saturating_add(nanos);
            result
        }

        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}
