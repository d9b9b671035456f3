//! Ingestion command handler for the CLI.
//!
//! Called from `main` after the database pool and config are established.
//! The run is bracketed by an `ingestion_runs` bookkeeping row; Ctrl-C
//! cancels gracefully — in-flight work stops, the failure report is still
//! flushed, and partial stats are recorded.

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use leadmine_core::{AppConfig, ConflictPolicy, SourceKind};
use leadmine_db::PgOpportunityStore;
use leadmine_ingest::{run_source, FsArtifactStore, RunRequest};

#[derive(Debug, clap::Args)]
pub(crate) struct IngestArgs {
    /// Source to ingest: energy_sieve, failing_company, or death_record.
    #[arg(long)]
    pub source: SourceKind,
    /// Department code the run is scoped to, e.g. 75.
    #[arg(long)]
    pub department: String,
    /// Lower bound of the event-date window (YYYY-MM-DD).
    #[arg(long)]
    pub since: NaiveDate,
    /// Optional upper bound of the event-date window (YYYY-MM-DD).
    #[arg(long)]
    pub until: Option<NaiveDate>,
    /// Energy classes to select for the energy-sieve source (repeatable).
    #[arg(long = "energy-class")]
    pub energy_classes: Vec<String>,
    /// Persistence batch size override.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Conflict policy override: skip_existing or update_existing.
    #[arg(long)]
    pub conflict_policy: Option<String>,
    /// Minimum age at death for registry rows.
    #[arg(long)]
    pub min_age: Option<u32>,
    /// Print what would run without fetching or writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    args: IngestArgs,
) -> anyhow::Result<()> {
    let conflict_policy = match args.conflict_policy.as_deref() {
        None => None,
        Some("skip_existing") => Some(ConflictPolicy::SkipExisting),
        Some("update_existing") => Some(ConflictPolicy::UpdateExisting),
        Some(other) => anyhow::bail!(
            "unknown conflict policy \"{other}\" (expected skip_existing or update_existing)"
        ),
    };

    let mut request = RunRequest::new(args.source, args.department, args.since);
    request.until = args.until;
    request.batch_size = args.batch_size;
    request.conflict_policy = conflict_policy;
    request.min_age_years = args.min_age;
    if !args.energy_classes.is_empty() {
        request.energy_classes = args.energy_classes;
    }

    if args.dry_run {
        println!(
            "dry-run: would ingest {} for department {} since {} (until {})",
            request.source,
            request.department,
            request.since,
            request
                .until
                .map_or_else(|| "open".to_owned(), |d| d.to_string())
        );
        return Ok(());
    }

    let run = leadmine_db::create_ingestion_run(pool, request.source.as_str(), "cli").await?;
    leadmine_db::start_ingestion_run(pool, run.id).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received — cancelling the run");
            ctrl_c_cancel.cancel();
        }
    });

    let store = PgOpportunityStore::new(pool.clone());
    let artifacts = FsArtifactStore::new(&config.artifact_dir);

    match run_source(config, &store, &artifacts, &request, &cancel).await {
        Ok(summary) => {
            let processed = i32::try_from(summary.stats.inserted_count).unwrap_or(i32::MAX);
            leadmine_db::complete_ingestion_run(pool, run.id, processed).await?;

            println!("run {} finished: {}", run.public_id, summary.stats);
            if summary.truncated {
                println!("warning: upstream pagination ceiling truncated the collection");
            }
            for locator in &summary.failure_artifacts {
                println!("failure report: {locator}");
            }
            Ok(())
        }
        Err(e) => {
            leadmine_db::fail_ingestion_run(pool, run.id, &e.to_string()).await?;
            Err(e.into())
        }
    }
}
