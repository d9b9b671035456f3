mod ingest;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use leadmine_db::PoolConfig;

#[derive(Debug, Parser)]
#[command(name = "leadmine-cli")]
#[command(about = "Leadmine ingestion command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion source end to end.
    Ingest(ingest::IngestArgs),
    /// Apply pending database migrations.
    Migrate,
    /// List recent ingestion runs.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = leadmine_core::load_app_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let pool =
        leadmine_db::connect_pool(&config.database_url, PoolConfig::from_app_config(&config))
            .await?;

    match cli.command {
        Commands::Ingest(args) => ingest::run_ingest(&pool, &config, args).await?,
        Commands::Migrate => {
            let applied = leadmine_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        Commands::Runs { limit } => {
            let rows = leadmine_db::list_ingestion_runs(&pool, limit).await?;
            if rows.is_empty() {
                println!("no ingestion runs recorded");
            }
            for row in rows {
                println!(
                    "{} {:>16} {:>9} records={} {}",
                    row.created_at.format("%Y-%m-%d %H:%M:%S"),
                    row.source,
                    row.status,
                    row.records_processed,
                    row.error_message.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}
