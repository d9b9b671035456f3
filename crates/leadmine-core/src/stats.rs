//! Per-run processing counters.

use serde::Serialize;

/// Counters accumulated over a single ingestion run.
///
/// Stage helpers build their own value and the run folds them together with
/// [`ProcessingStats::merge`] — counters are never threaded through nested
/// calls as shared mutable state. Scoped to one run; surfaced in the run
/// summary and logs only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Raw records obtained from the upstream (pages, files, rows).
    pub total_fetched: u64,
    /// Records that passed transformation and validation.
    pub valid_transformed: u64,
    /// Records rejected at any validation stage (including geocoding misses).
    pub invalid_rejected: u64,
    pub geocoding_attempts: u64,
    pub geocoding_successes: u64,
    /// Rows newly inserted by the batch upserter.
    pub inserted_count: u64,
    /// Failed persistence batches.
    pub error_count: u64,
}

impl ProcessingStats {
    /// Field-wise sum of two stat values.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            total_fetched: self.total_fetched + other.total_fetched,
            valid_transformed: self.valid_transformed + other.valid_transformed,
            invalid_rejected: self.invalid_rejected + other.invalid_rejected,
            geocoding_attempts: self.geocoding_attempts + other.geocoding_attempts,
            geocoding_successes: self.geocoding_successes + other.geocoding_successes,
            inserted_count: self.inserted_count + other.inserted_count,
            error_count: self.error_count + other.error_count,
        }
    }
}

impl std::fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched={} valid={} rejected={} geocoded={}/{} inserted={} errors={}",
            self.total_fetched,
            self.valid_transformed,
            self.invalid_rejected,
            self.geocoding_successes,
            self.geocoding_attempts,
            self.inserted_count,
            self.error_count
        )
    }
}
