//! Metrics instrumentation for snapshot reloads.

/// Metric names used by the cache loader.
pub mod names {
    /// Total snapshot loads served by a full branch scan.
    pub const RELOAD_FULL_TOTAL: &str = "extid_cache_reload_full_total";
    /// Total snapshot loads served differentially from a cached ancestor.
    pub const RELOAD_DIFFERENTIAL_TOTAL: &str = "extid_cache_reload_differential_total";
    /// Differential reload duration in seconds.
    pub const RELOAD_DIFFERENTIAL_DURATION_SECONDS: &str =
        "extid_cache_reload_differential_duration_seconds";
}

/// Record a snapshot load that fell back to scanning the whole branch.
#[inline]
pub fn full_reload() {
    metrics::counter!(names::RELOAD_FULL_TOTAL).increment(1);
}

/// Record a snapshot load reconstructed from a cached ancestor.
#[inline]
pub fn differential_reload(duration_secs: f64) {
    metrics::counter!(names::RELOAD_DIFFERENTIAL_TOTAL).increment(1);
    metrics::histogram!(names::RELOAD_DIFFERENTIAL_DURATION_SECONDS).record(duration_secs);
}
