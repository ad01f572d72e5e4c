//! Opt-in timing hooks for index construction and queries.
//!
//! Timing is collected only when the `mesh_engine_metrics` feature is enabled
//! and the target is not `wasm32` (no `std::time::Instant` there). Otherwise
//! every call is a plain pass-through and [`GeomMetrics::end`] returns `None`.
//!
//! ```ignore
//! use cpom_engine::geom::{GeomMetrics, MeshIndex, BvhBuildOptions, Winding};
//!
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let index = MeshIndex::build_with_metrics(triangles, Winding::default(), &BvhBuildOptions::default(), &mut metrics);
//! if let Some(report) = metrics.end() {
//!     println!("build: {} ns", report.bvh_build_ns);
//! }
//! ```

/// Phase a measured duration is accumulated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Per-triangle bounding box, center and normal computation.
    TrianglePrecompute,
    /// Hierarchy construction.
    BvhBuild,
    /// Closest-point queries.
    Query,
    /// Writing or reading the binary hierarchy layout.
    Serialization,
}

/// Cumulative nanoseconds per [`TimingBucket`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeomTimingReport {
    pub triangle_precompute_ns: u64,
    pub bvh_build_ns: u64,
    pub query_ns: u64,
    pub serialization_ns: u64,
}

impl GeomTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.triangle_precompute_ns
            .saturating_add(self.bvh_build_ns)
            .saturating_add(self.query_ns)
            .saturating_add(self.serialization_ns)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    fn bucket_mut(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::TrianglePrecompute => &mut self.triangle_precompute_ns,
            TimingBucket::BvhBuild => &mut self.bvh_build_ns,
            TimingBucket::Query => &mut self.query_ns,
            TimingBucket::Serialization => &mut self.serialization_ns,
        }
    }
}

/// Accumulator for timing engine phases.
///
/// Call [`begin`](Self::begin) to reset, wrap work in [`time`](Self::time),
/// and read the totals with [`end`](Self::end).
#[derive(Debug, Default)]
pub struct GeomMetrics {
    #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
    report: GeomTimingReport,
}

impl GeomMetrics {
    pub fn begin(&mut self) {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            self.report = GeomTimingReport::default();
        }
    }

    /// Accumulated report, or `None` when timing is compiled out.
    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Run `f`, adding its elapsed time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            let slot = self.report.bucket_mut(bucket);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_report_total() {
        let report = GeomTimingReport {
            triangle_precompute_ns: 1000,
            bvh_build_ns: 2000,
            query_ns: 3000,
            serialization_ns: 0,
        };
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_mut_targets_matching_field() {
        let mut report = GeomTimingReport::default();
        *report.bucket_mut(TimingBucket::Serialization) += 7;
        assert_eq!(report.serialization_ns, 7);
        assert_eq!(report.total_ns(), 7);
    }

    #[test]
    fn test_time_returns_closure_result() {
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let result = metrics.time(TimingBucket::Query, || 42);
        assert_eq!(result, 42);
        #[cfg(not(all(feature = "mesh_engine_metrics", not(target_arch = "wasm32"))))]
        assert!(metrics.end().is_none());
    }
}
