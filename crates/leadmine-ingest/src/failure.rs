//! Accumulation and materialization of rows rejected during a run.

use crate::store::ArtifactStore;

/// A raw row that failed some pipeline stage, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    /// The original payload: a serialized API record or a raw CSV line.
    pub raw: String,
    pub reason: String,
}

/// Collects failed rows for the duration of a run and materializes them as a
/// delimited text artifact at the end.
///
/// Bounded by run size — the sink lives and dies with one run.
#[derive(Debug, Default)]
pub struct FailureSink {
    rows: Vec<FailedRow>,
}

impl FailureSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, raw: impl Into<String>, reason: impl Into<String>) {
        self.rows.push(FailedRow {
            raw: raw.into(),
            reason: reason.into(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[FailedRow] {
        &self.rows
    }

    /// Serializes the accumulated rows as `reason;raw` lines and writes them
    /// through the artifact store as `<base_name>-failures.csv`, then clears
    /// the sink.
    ///
    /// Returns the artifact locator, or `None` when there was nothing to
    /// flush — or when the write failed: losing the failure report must never
    /// fail an otherwise-successful run, so store errors are logged and
    /// swallowed here.
    pub async fn flush<A: ArtifactStore>(&mut self, store: &A, base_name: &str) -> Option<String> {
        if self.rows.is_empty() {
            return None;
        }

        let mut body = String::from("reason;raw\n");
        for row in &self.rows {
            // The reason is free text; keep the artifact single-delimiter.
            body.push_str(&row.reason.replace(';', ","));
            body.push(';');
            body.push_str(&row.raw);
            body.push('\n');
        }

        let key = format!("{base_name}-failures.csv");
        let count = self.rows.len();
        self.rows.clear();

        match store.put(&key, body.as_bytes()).await {
            Ok(locator) => {
                tracing::info!(key, count, "failure report written");
                Some(locator)
            }
            Err(e) => {
                tracing::warn!(key, count, error = %e, "failed to persist failure report — continuing");
                None
            }
        }
    }
}
