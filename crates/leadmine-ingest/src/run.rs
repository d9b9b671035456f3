//! Per-source run orchestration: fetch → transform → geocode → persist.
//!
//! One run covers one source. Stages execute sequentially — the bottleneck
//! is the upstream rate limit, not CPU — and every per-record rejection is
//! routed to the failure sink instead of aborting the run. Only source-level
//! failures (first-page fetch, storage collaborator unavailable, malformed
//! request) surface to the caller as errors.
//!
//! Cancellation stops further page fetches and further batches, but the
//! sink is still flushed and the partial stats are returned — work already
//! committed to storage is never discarded.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use leadmine_core::{AppConfig, ConflictPolicy, Opportunity, ProcessingStats, SourceKind};

use crate::discover::discover_new_files;
use crate::error::IngestError;
use crate::failure::FailureSink;
use crate::fetch::{FetchConfig, RateLimitedFetcher};
use crate::geocode::{GeocodedPoint, GeocodingResolver};
use crate::page::{PageCollector, PageSpec, PageStyle};
use crate::store::{ArtifactStore, OpportunityStore};
use crate::stream::parse_death_csv;
use crate::transform::{company, deaths, energy, Rejected};
use crate::upsert::{upsert_in_batches, BatchOutcome};

/// The trigger input for one source run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: SourceKind,
    /// Two-digit department code the run is scoped to.
    pub department: String,
    pub since: NaiveDate,
    pub until: Option<NaiveDate>,
    /// Energy classes selected for the energy-sieve source.
    pub energy_classes: Vec<String>,
    /// Overrides the configured persistence batch size.
    pub batch_size: Option<usize>,
    /// Overrides the source's default conflict policy.
    pub conflict_policy: Option<ConflictPolicy>,
    /// Overrides the configured minimum age for death records.
    pub min_age_years: Option<u32>,
}

impl RunRequest {
    #[must_use]
    pub fn new(source: SourceKind, department: impl Into<String>, since: NaiveDate) -> Self {
        Self {
            source,
            department: department.into(),
            since,
            until: None,
            energy_classes: vec!["F".to_owned(), "G".to_owned()],
            batch_size: None,
            conflict_policy: None,
            min_age_years: None,
        }
    }
}

/// What a completed (or cancelled) run reports back to the trigger.
#[derive(Debug)]
pub struct RunSummary {
    pub stats: ProcessingStats,
    /// `true` when an upstream pagination ceiling truncated collection.
    pub truncated: bool,
    /// Locators of the failure reports written during the run.
    pub failure_artifacts: Vec<String>,
}

/// Runs one source end to end.
///
/// # Errors
///
/// Returns [`IngestError`] only for source-level failures: a malformed
/// request, a first-page or file fetch failure, or an unavailable storage
/// collaborator. Per-record and per-batch failures are absorbed into the
/// summary.
pub async fn run_source<S, A>(
    config: &AppConfig,
    store: &S,
    artifacts: &A,
    request: &RunRequest,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError>
where
    S: OpportunityStore,
    A: ArtifactStore,
{
    if request.department.trim().is_empty() {
        return Err(IngestError::InvalidSourceConfig {
            reason: "department must not be empty".to_owned(),
        });
    }
    if let Some(until) = request.until {
        if until < request.since {
            return Err(IngestError::InvalidSourceConfig {
                reason: format!("until ({until}) precedes since ({})", request.since),
            });
        }
    }

    tracing::info!(
        source = %request.source,
        department = %request.department,
        since = %request.since,
        "starting ingestion run"
    );

    let summary = match request.source {
        SourceKind::EnergySieve => {
            let api = ApiSource {
                kind: SourceKind::EnergySieve,
                has_coordinates: energy::has_coordinates,
                geocoding_query: energy::geocoding_query,
                transform: energy::transform,
            };
            let spec = PageSpec {
                base_url: config.energy_api_base_url.clone(),
                page_size: config.page_size,
                style: PageStyle::PageNumber,
                params: energy_params(request),
            };
            run_paged_source(
                config,
                store,
                artifacts,
                request,
                cancel,
                config.energy_min_interval_ms,
                spec,
                &api,
            )
            .await?
        }
        SourceKind::FailingCompany => {
            let api = ApiSource {
                kind: SourceKind::FailingCompany,
                has_coordinates: company::has_coordinates,
                geocoding_query: company::geocoding_query,
                transform: company::transform,
            };
            let spec = PageSpec {
                base_url: config.company_api_base_url.clone(),
                page_size: config.page_size,
                style: PageStyle::Offset,
                params: company_params(request),
            };
            run_paged_source(
                config,
                store,
                artifacts,
                request,
                cancel,
                config.company_min_interval_ms,
                spec,
                &api,
            )
            .await?
        }
        SourceKind::DeathRecord => {
            run_death_records(config, store, artifacts, request, cancel).await?
        }
    };

    tracing::info!(
        source = %request.source,
        stats = %summary.stats,
        truncated = summary.truncated,
        "ingestion run finished"
    );
    Ok(summary)
}

/// The per-source behavior a paged API run plugs into the shared loop:
/// pure transformation plus the two coordinate probes.
struct ApiSource {
    kind: SourceKind,
    has_coordinates: fn(&Value) -> bool,
    geocoding_query: fn(&Value) -> Option<String>,
    transform: fn(&Value, NaiveDate, Option<&GeocodedPoint>) -> Result<Opportunity, Rejected>,
}

/// Shared pipeline for the two paged API sources.
#[allow(clippy::too_many_arguments)]
async fn run_paged_source<S, A>(
    config: &AppConfig,
    store: &S,
    artifacts: &A,
    request: &RunRequest,
    cancel: &CancellationToken,
    min_interval_ms: u64,
    spec: PageSpec,
    api: &ApiSource,
) -> Result<RunSummary, IngestError>
where
    S: OpportunityStore,
    A: ArtifactStore,
{
    let fetcher = RateLimitedFetcher::new(&fetch_config(config, min_interval_ms))?;
    let geocoder = build_geocoder(config)?;
    let today = Utc::now().date_naive();

    let collection = PageCollector::new(&fetcher, spec).collect_all(cancel).await?;
    let fetch_stats = ProcessingStats {
        total_fetched: collection.records.len() as u64,
        ..ProcessingStats::default()
    };

    let mut sink = FailureSink::new();
    let mut transform_stats = ProcessingStats::default();
    let mut valid: Vec<Opportunity> = Vec::new();
    let mut place_cache: HashMap<String, Option<GeocodedPoint>> = HashMap::new();

    for (index, raw) in collection.records.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!(
                processed = index,
                total = collection.records.len(),
                "run cancelled — stopping record processing"
            );
            break;
        }

        let geocoded = if (api.has_coordinates)(raw) {
            None
        } else if let Some(query) = (api.geocoding_query)(raw) {
            resolve_cached(&geocoder, &mut place_cache, &query, &mut transform_stats).await
        } else {
            None
        };

        match (api.transform)(raw, today, geocoded.as_ref()) {
            Ok(opportunity) => {
                transform_stats.valid_transformed += 1;
                valid.push(opportunity);
            }
            Err(rejected) => {
                transform_stats.invalid_rejected += 1;
                sink.record(raw.to_string(), rejected.reason);
            }
        }
    }

    let policy = request
        .conflict_policy
        .unwrap_or_else(|| api.kind.default_conflict_policy());
    let batch_size = request.batch_size.unwrap_or(config.upsert_batch_size);
    let outcome = upsert_in_batches(store, &valid, batch_size, policy, cancel).await;
    let persist_stats = persist_stats(&outcome);
    record_failed_batches(&mut sink, &valid, &outcome);

    let base_name = format!(
        "{}-{}-{}",
        api.kind.as_str(),
        request.department,
        request.since
    );
    let failure_artifacts = sink.flush(artifacts, &base_name).await.into_iter().collect();

    Ok(RunSummary {
        stats: fetch_stats.merge(transform_stats).merge(persist_stats),
        truncated: collection.truncated,
        failure_artifacts,
    })
}

/// File-discovery pipeline for the civil-registry source.
async fn run_death_records<S, A>(
    config: &AppConfig,
    store: &S,
    artifacts: &A,
    request: &RunRequest,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError>
where
    S: OpportunityStore,
    A: ArtifactStore,
{
    let fetcher = RateLimitedFetcher::new(&fetch_config(config, config.death_min_interval_ms))?;
    let geocoder = build_geocoder(config)?;
    let today = Utc::now().date_naive();
    let min_age = request.min_age_years.unwrap_or(config.min_age_years);

    let known = store
        .existing_source_files(SourceKind::DeathRecord)
        .await
        .map_err(|e| IngestError::Store(e.to_string()))?;

    let files = discover_new_files(&fetcher, &config.death_index_url, &known, today).await?;
    if files.is_empty() {
        tracing::info!("no new registry files to ingest");
        return Ok(RunSummary {
            stats: ProcessingStats::default(),
            truncated: false,
            failure_artifacts: Vec::new(),
        });
    }
    tracing::info!(count = files.len(), "new registry files discovered");

    let policy = request
        .conflict_policy
        .unwrap_or_else(|| SourceKind::DeathRecord.default_conflict_policy());
    let batch_size = request.batch_size.unwrap_or(config.upsert_batch_size);

    let mut stats = ProcessingStats::default();
    let mut failure_artifacts: Vec<String> = Vec::new();
    // Commune codes repeat heavily within a month's drop; resolve each once.
    let mut place_cache: HashMap<String, Option<GeocodedPoint>> = HashMap::new();

    for file in &files {
        if cancel.is_cancelled() {
            tracing::warn!(file = %file.filename, "run cancelled — skipping remaining files");
            break;
        }
        tracing::info!(file = %file.filename, "ingesting registry file");

        let mut sink = FailureSink::new();
        let reader = fetcher.get_reader(&file.url).await?;
        let (rows, parse_stats) =
            parse_death_csv(reader, &file.filename, min_age, &mut sink).await?;

        let mut file_stats = ProcessingStats {
            total_fetched: parse_stats.rows_read,
            invalid_rejected: parse_stats.discarded(),
            ..ProcessingStats::default()
        };

        let mut valid: Vec<Opportunity> = Vec::new();
        for row in &rows {
            if cancel.is_cancelled() {
                break;
            }
            let query = deaths::geocoding_query(row);
            let place = resolve_cached(&geocoder, &mut place_cache, &query, &mut file_stats).await;
            match deaths::transform(row, today, place.as_ref()) {
                Ok(mut opportunity) => {
                    opportunity.source_file = Some(file.filename.clone());
                    file_stats.valid_transformed += 1;
                    valid.push(opportunity);
                }
                Err(rejected) => {
                    file_stats.invalid_rejected += 1;
                    sink.record(row.raw_line.clone(), rejected.reason);
                }
            }
        }

        let outcome = upsert_in_batches(store, &valid, batch_size, policy, cancel).await;
        record_failed_batches(&mut sink, &valid, &outcome);
        file_stats = file_stats.merge(persist_stats(&outcome));

        let base_name = file.filename.trim_end_matches(".csv");
        if let Some(locator) = sink.flush(artifacts, base_name).await {
            failure_artifacts.push(locator);
        }

        tracing::info!(file = %file.filename, stats = %file_stats, "registry file ingested");
        stats = stats.merge(file_stats);
    }

    Ok(RunSummary {
        stats,
        truncated: false,
        failure_artifacts,
    })
}

/// Geocodes `query`, deduplicating lookups through `cache` and counting
/// attempts and successes in `stats`.
///
/// A transport error is downgraded to "no match": the record in hand gets
/// rejected, and the run keeps going — per-record isolation, same as any
/// other validation failure.
async fn resolve_cached(
    geocoder: &GeocodingResolver,
    cache: &mut HashMap<String, Option<GeocodedPoint>>,
    query: &str,
    stats: &mut ProcessingStats,
) -> Option<GeocodedPoint> {
    if let Some(cached) = cache.get(query) {
        return cached.clone();
    }
    stats.geocoding_attempts += 1;
    let resolved = match geocoder.resolve(query).await {
        Ok(point) => point,
        Err(e) => {
            tracing::warn!(query, error = %e, "geocoding lookup failed — treating as no match");
            None
        }
    };
    if resolved.is_some() {
        stats.geocoding_successes += 1;
    }
    cache.insert(query.to_owned(), resolved.clone());
    resolved
}

fn persist_stats(outcome: &BatchOutcome) -> ProcessingStats {
    ProcessingStats {
        inserted_count: outcome.inserted,
        error_count: outcome.failed_batches,
        ..ProcessingStats::default()
    }
}

/// Reports every record of a failed batch to the sink.
fn record_failed_batches(sink: &mut FailureSink, valid: &[Opportunity], outcome: &BatchOutcome) {
    for (start, len) in &outcome.failed_ranges {
        for opportunity in &valid[*start..start + len] {
            let raw = serde_json::to_string(opportunity)
                .unwrap_or_else(|_| opportunity.external_id.clone());
            sink.record(raw, "persistence batch failed");
        }
    }
}

fn fetch_config(config: &AppConfig, min_interval_ms: u64) -> FetchConfig {
    FetchConfig {
        timeout_secs: config.http_timeout_secs,
        user_agent: config.http_user_agent.clone(),
        min_request_interval_ms: min_interval_ms,
        max_retries: config.http_max_retries,
        backoff_base_secs: config.http_backoff_base_secs,
    }
}

fn build_geocoder(config: &AppConfig) -> Result<GeocodingResolver, IngestError> {
    let fetcher =
        RateLimitedFetcher::new(&fetch_config(config, config.geocoding_min_interval_ms))?;
    Ok(GeocodingResolver::new(
        fetcher,
        config.geocoding_base_url.clone(),
    ))
}

/// Lucene-style filter for the energy API: department prefix on the postal
/// code, selected energy classes, and the diagnosis date window.
fn energy_params(request: &RunRequest) -> Vec<(String, String)> {
    let classes = if request.energy_classes.is_empty() {
        "F OR G".to_owned()
    } else {
        request.energy_classes.join(" OR ")
    };
    let until = request
        .until
        .map_or_else(|| "*".to_owned(), |d| d.to_string());
    let qs = format!(
        "code_postal_ban:{}* AND etiquette_dpe:({classes}) AND date_etablissement_dpe:[{} TO {until}]",
        request.department, request.since
    );
    vec![("qs".to_owned(), qs)]
}

fn company_params(request: &RunRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("departement".to_owned(), request.department.clone()),
        ("since".to_owned(), request.since.to_string()),
    ];
    if let Some(until) = request.until {
        params.push(("until".to_owned(), until.to_string()));
    }
    params
}
