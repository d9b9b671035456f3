//! Offline unit tests for leadmine-db pool configuration and row types.
//! These tests do not require a live database connection.

use leadmine_core::{AppConfig, Environment};
use leadmine_db::{IngestionRunRow, PoolConfig};
use std::path::PathBuf;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        http_timeout_secs: 30,
        http_user_agent: "ua".to_string(),
        http_max_retries: 3,
        http_backoff_base_secs: 2,
        energy_api_base_url: "https://energy.test/lines".to_string(),
        energy_min_interval_ms: 100,
        company_api_base_url: "https://company.test/search".to_string(),
        company_min_interval_ms: 100,
        death_index_url: "https://deces.test/index.html".to_string(),
        death_min_interval_ms: 1000,
        geocoding_base_url: "https://geo.test".to_string(),
        geocoding_min_interval_ms: 100,
        page_size: 1000,
        upsert_batch_size: 500,
        min_age_years: 60,
        artifact_dir: PathBuf::from("./artifacts"),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`IngestionRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn ingestion_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = IngestionRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        source: "energy_sieve".to_string(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        records_processed: 0_i32,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.id, 1);
    assert_eq!(row.source, "energy_sieve");
    assert_eq!(row.trigger_source, "cli");
    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());
    assert!(row.error_message.is_none());
}
