//! Metrics instrumentation for the write path.

/// Metric names used by the store and updater.
pub mod names {
    /// Total committed external ID updates.
    pub const UPDATES_TOTAL: &str = "extid_updates_total";
    /// Total commit attempts retried after a lost compare-and-swap.
    pub const UPDATE_RETRIES_TOTAL: &str = "extid_update_retries_total";
}

/// Record a successfully committed update.
#[inline]
pub fn update_committed() {
    metrics::counter!(names::UPDATES_TOTAL).increment(1);
}

/// Record a retry after a lost ref-update race.
#[inline]
pub fn update_retried() {
    metrics::counter!(names::UPDATE_RETRIES_TOTAL).increment(1);
}
