//! Write and lookup operations for the `opportunities` table.

use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::PgPool;

use leadmine_core::{ConflictPolicy, Opportunity, SourceKind};

/// Insert a batch of opportunities in one round-trip, deduplicated on the
/// `(source, external_id)` natural key.
///
/// Returns the number of rows that did not exist before.
///
/// Uses a single `INSERT … SELECT * FROM UNNEST(…) ON CONFLICT` so the whole
/// batch is one statement regardless of its size. The conflict clause follows
/// `policy`:
/// - [`ConflictPolicy::SkipExisting`] — `DO NOTHING`; the first write wins
///   and re-runs are pure no-ops. `RETURNING` then yields only the rows
///   actually inserted, so the row count is the insert count.
/// - [`ConflictPolicy::UpdateExisting`] — refresh the mutable columns and
///   bump `updated_at`, keeping the first-seen natural key. New rows are
///   told apart with `(xmax = 0)`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails. The caller isolates the
/// failure to this batch.
pub async fn upsert_opportunities(
    pool: &PgPool,
    records: &[Opportunity],
    policy: ConflictPolicy,
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    // Collect each column into a parallel Vec for UNNEST binding.
    let mut sources: Vec<String> = Vec::with_capacity(records.len());
    let mut external_ids: Vec<String> = Vec::with_capacity(records.len());
    let mut labels: Vec<String> = Vec::with_capacity(records.len());
    let mut addresses: Vec<Option<String>> = Vec::with_capacity(records.len());
    let mut zip_codes: Vec<String> = Vec::with_capacity(records.len());
    let mut departments: Vec<String> = Vec::with_capacity(records.len());
    let mut latitudes: Vec<f64> = Vec::with_capacity(records.len());
    let mut longitudes: Vec<f64> = Vec::with_capacity(records.len());
    let mut dates: Vec<NaiveDate> = Vec::with_capacity(records.len());
    let mut contact_datas: Vec<serde_json::Value> = Vec::with_capacity(records.len());
    let mut extra_datas: Vec<serde_json::Value> = Vec::with_capacity(records.len());
    let mut source_files: Vec<Option<String>> = Vec::with_capacity(records.len());

    for record in records {
        sources.push(record.source.as_str().to_owned());
        external_ids.push(record.external_id.clone());
        labels.push(record.label.clone());
        addresses.push(record.address.clone());
        zip_codes.push(record.zip_code.clone());
        departments.push(record.department.clone());
        latitudes.push(record.latitude);
        longitudes.push(record.longitude);
        dates.push(record.opportunity_date);
        contact_datas.push(record.contact_data.clone());
        extra_datas.push(record.extra_data.clone());
        source_files.push(record.source_file.clone());
    }

    let conflict_clause = match policy {
        ConflictPolicy::SkipExisting => {
            "ON CONFLICT (source, external_id) DO NOTHING RETURNING TRUE"
        }
        ConflictPolicy::UpdateExisting => {
            "ON CONFLICT (source, external_id) DO UPDATE SET \
                 label            = EXCLUDED.label, \
                 address          = EXCLUDED.address, \
                 zip_code         = EXCLUDED.zip_code, \
                 department       = EXCLUDED.department, \
                 latitude         = EXCLUDED.latitude, \
                 longitude        = EXCLUDED.longitude, \
                 opportunity_date = EXCLUDED.opportunity_date, \
                 contact_data     = EXCLUDED.contact_data, \
                 extra_data       = EXCLUDED.extra_data, \
                 source_file      = EXCLUDED.source_file, \
                 updated_at       = NOW() \
             RETURNING (xmax = 0) AS is_new"
        }
    };

    let query = format!(
        "INSERT INTO opportunities \
             (source, external_id, label, address, zip_code, department, \
              latitude, longitude, opportunity_date, contact_data, extra_data, source_file) \
         SELECT * FROM UNNEST(\
              $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], \
              $7::float8[], $8::float8[], $9::date[], $10::jsonb[], $11::jsonb[], $12::text[]) \
         {conflict_clause}"
    );

    let rows: Vec<bool> = sqlx::query_scalar::<_, bool>(&query)
        .bind(&sources)
        .bind(&external_ids)
        .bind(&labels)
        .bind(&addresses)
        .bind(&zip_codes)
        .bind(&departments)
        .bind(&latitudes)
        .bind(&longitudes)
        .bind(&dates)
        .bind(&contact_datas)
        .bind(&extra_datas)
        .bind(&source_files)
        .fetch_all(pool)
        .await?;

    let inserted = match policy {
        ConflictPolicy::SkipExisting => rows.len() as u64,
        ConflictPolicy::UpdateExisting => rows.iter().filter(|&&is_new| is_new).count() as u64,
    };

    Ok(inserted)
}

/// All natural keys already stored for `source`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn existing_natural_keys(
    pool: &PgPool,
    source: SourceKind,
) -> Result<HashSet<String>, sqlx::Error> {
    let keys: Vec<String> =
        sqlx::query_scalar::<_, String>("SELECT external_id FROM opportunities WHERE source = $1")
            .bind(source.as_str())
            .fetch_all(pool)
            .await?;
    Ok(keys.into_iter().collect())
}

/// Distinct bulk-file names already ingested for `source` — the dedup input
/// for file discovery.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn existing_source_files(
    pool: &PgPool,
    source: SourceKind,
) -> Result<HashSet<String>, sqlx::Error> {
    let files: Vec<String> = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT source_file FROM opportunities \
         WHERE source = $1 AND source_file IS NOT NULL",
    )
    .bind(source.as_str())
    .fetch_all(pool)
    .await?;
    Ok(files.into_iter().collect())
}
