//! Shared fixtures for the integration tests.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDate;
use leadmine_core::{AppConfig, ConflictPolicy, Environment, Opportunity, SourceKind};
use leadmine_ingest::OpportunityStore;

/// In-memory opportunity store keyed by `(source, external_id)`.
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<Vec<Opportunity>>,
    pub known_files: Mutex<HashSet<String>>,
}

#[derive(Debug, thiserror::Error)]
#[error("fake store failure")]
pub struct FakeStoreError;

impl OpportunityStore for FakeStore {
    type Error = FakeStoreError;

    async fn upsert_batch(
        &self,
        records: &[Opportunity],
        policy: ConflictPolicy,
    ) -> Result<u64, Self::Error> {
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0u64;
        for record in records {
            let existing = rows
                .iter_mut()
                .find(|r| r.source == record.source && r.external_id == record.external_id);
            match existing {
                Some(row) => {
                    if policy == ConflictPolicy::UpdateExisting {
                        *row = record.clone();
                    }
                }
                None => {
                    rows.push(record.clone());
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn existing_natural_keys(
        &self,
        source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.source == source)
            .map(|r| r.external_id.clone())
            .collect())
    }

    async fn existing_source_files(
        &self,
        _source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error> {
        Ok(self.known_files.lock().unwrap().clone())
    }
}

impl FakeStore {
    pub fn rows(&self) -> Vec<Opportunity> {
        self.rows.lock().unwrap().clone()
    }
}

/// An `AppConfig` pointing every upstream at `base_url` (a mock server),
/// with pacing and backoff tuned down so tests stay fast.
pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_owned(),
        env: Environment::Test,
        log_level: "debug".to_owned(),
        db_max_connections: 1,
        db_min_connections: 1,
        db_acquire_timeout_secs: 1,
        http_timeout_secs: 5,
        http_user_agent: "leadmine-test/0.1".to_owned(),
        http_max_retries: 0,
        http_backoff_base_secs: 0,
        energy_api_base_url: format!("{base_url}/energy/lines"),
        energy_min_interval_ms: 0,
        company_api_base_url: format!("{base_url}/company/search"),
        company_min_interval_ms: 0,
        death_index_url: format!("{base_url}/deces/index.html"),
        death_min_interval_ms: 0,
        geocoding_base_url: base_url.to_owned(),
        geocoding_min_interval_ms: 0,
        page_size: 1000,
        upsert_batch_size: 500,
        min_age_years: 60,
        artifact_dir: std::env::temp_dir(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
