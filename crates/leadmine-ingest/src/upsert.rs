//! Ordered, failure-isolated batch persistence.

use leadmine_core::{ConflictPolicy, Opportunity};
use tokio_util::sync::CancellationToken;

use crate::store::OpportunityStore;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// The result of pushing one record set through the store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows that did not exist before, summed over successful batches.
    pub inserted: u64,
    pub failed_batches: u64,
    /// `(start index, length)` of every failed batch, in order, so callers
    /// can report the affected records.
    pub failed_ranges: Vec<(usize, usize)>,
}

/// Splits `records` into fixed-size chunks and upserts them strictly in
/// order.
///
/// A batch failure is logged with its starting index and size and does not
/// abort subsequent batches — the run keeps maximum throughput on the
/// remaining data and reports the failure count instead. Cancellation stops
/// before the next batch; batches already written stay written.
pub async fn upsert_in_batches<S: OpportunityStore>(
    store: &S,
    records: &[Opportunity],
    batch_size: usize,
    policy: ConflictPolicy,
    cancel: &CancellationToken,
) -> BatchOutcome {
    let batch_size = batch_size.max(1);
    let mut outcome = BatchOutcome::default();

    for (batch_index, chunk) in records.chunks(batch_size).enumerate() {
        let start_index = batch_index * batch_size;
        if cancel.is_cancelled() {
            tracing::warn!(
                start_index,
                remaining = records.len() - start_index,
                "run cancelled — skipping remaining batches"
            );
            break;
        }

        match store.upsert_batch(chunk, policy).await {
            Ok(inserted) => {
                tracing::debug!(start_index, size = chunk.len(), inserted, "batch upserted");
                outcome.inserted += inserted;
            }
            Err(e) => {
                tracing::error!(
                    start_index,
                    size = chunk.len(),
                    error = %e,
                    "batch upsert failed — continuing with next batch"
                );
                outcome.failed_batches += 1;
                outcome.failed_ranges.push((start_index, chunk.len()));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use leadmine_core::SourceKind;

    /// In-memory store: remembers seen keys, fails on demand for specific
    /// batch indices.
    #[derive(Default)]
    struct FakeStore {
        seen: Mutex<HashSet<String>>,
        calls: Mutex<Vec<usize>>,
        fail_calls: Vec<usize>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("injected batch failure")]
    struct InjectedFailure;

    impl OpportunityStore for FakeStore {
        type Error = InjectedFailure;

        async fn upsert_batch(
            &self,
            records: &[Opportunity],
            _policy: ConflictPolicy,
        ) -> Result<u64, Self::Error> {
            let call_index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(records.len());
                calls.len() - 1
            };
            if self.fail_calls.contains(&call_index) {
                return Err(InjectedFailure);
            }
            let mut seen = self.seen.lock().unwrap();
            let mut inserted = 0u64;
            for record in records {
                if seen.insert(record.external_id.clone()) {
                    inserted += 1;
                }
            }
            Ok(inserted)
        }

        async fn existing_natural_keys(
            &self,
            _source: SourceKind,
        ) -> Result<HashSet<String>, Self::Error> {
            Ok(self.seen.lock().unwrap().clone())
        }

        async fn existing_source_files(
            &self,
            _source: SourceKind,
        ) -> Result<HashSet<String>, Self::Error> {
            Ok(HashSet::new())
        }
    }

    fn opportunity(id: &str) -> Opportunity {
        Opportunity {
            source: SourceKind::EnergySieve,
            external_id: id.to_owned(),
            label: "12 Rue de la Paix".to_owned(),
            address: Some("12 Rue de la Paix".to_owned()),
            zip_code: "75002".to_owned(),
            department: "75".to_owned(),
            latitude: 48.86,
            longitude: 2.33,
            opportunity_date: NaiveDate::from_ymd_opt(2024, 11, 20).unwrap(),
            contact_data: serde_json::json!({}),
            extra_data: serde_json::json!({}),
            source_file: None,
        }
    }

    #[tokio::test]
    async fn chunks_records_and_sums_inserted() {
        let store = FakeStore::default();
        let records: Vec<Opportunity> =
            (0..5).map(|i| opportunity(&format!("id-{i}"))).collect();

        let outcome =
            upsert_in_batches(&store, &records, 2, ConflictPolicy::SkipExisting, &CancellationToken::new())
                .await;

        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed_batches, 0);
        // 5 records in chunks of 2 → sizes 2, 2, 1, applied in order.
        assert_eq!(*store.calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn second_pass_inserts_nothing_new() {
        let store = FakeStore::default();
        let records: Vec<Opportunity> =
            (0..4).map(|i| opportunity(&format!("id-{i}"))).collect();
        let cancel = CancellationToken::new();

        let first =
            upsert_in_batches(&store, &records, 10, ConflictPolicy::SkipExisting, &cancel).await;
        let second =
            upsert_in_batches(&store, &records, 10, ConflictPolicy::SkipExisting, &cancel).await;

        assert_eq!(first.inserted, 4);
        assert_eq!(second.inserted, 0, "idempotent re-run inserts nothing");
    }

    #[tokio::test]
    async fn failed_batch_does_not_abort_later_batches() {
        let store = FakeStore {
            fail_calls: vec![1],
            ..FakeStore::default()
        };
        let records: Vec<Opportunity> =
            (0..6).map(|i| opportunity(&format!("id-{i}"))).collect();

        let outcome = upsert_in_batches(
            &store,
            &records,
            2,
            ConflictPolicy::SkipExisting,
            &CancellationToken::new(),
        )
        .await;

        // Batches 0 and 2 succeeded (4 rows), batch 1 failed.
        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.failed_ranges, vec![(2, 2)]);
        assert_eq!(store.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_batch() {
        let store = FakeStore::default();
        let records: Vec<Opportunity> =
            (0..6).map(|i| opportunity(&format!("id-{i}"))).collect();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome =
            upsert_in_batches(&store, &records, 2, ConflictPolicy::SkipExisting, &cancel).await;

        assert_eq!(outcome.inserted, 0);
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let store = FakeStore::default();
        let records = vec![opportunity("id-0")];
        let outcome = upsert_in_batches(
            &store,
            &records,
            0,
            ConflictPolicy::SkipExisting,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome.inserted, 1);
    }
}
