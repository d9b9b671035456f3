pub mod discover;
pub mod error;
pub mod failure;
pub mod fetch;
pub mod geocode;
pub mod page;
pub mod run;
pub mod store;
pub mod stream;
pub mod transform;
pub mod upsert;

pub use discover::{discover_new_files, FileRef};
pub use error::IngestError;
pub use failure::{FailedRow, FailureSink};
pub use fetch::{FetchConfig, RateLimitedFetcher};
pub use geocode::{GeocodedPoint, GeocodingResolver};
pub use page::{PageCollection, PageCollector, PageSpec, PageStyle};
pub use run::{run_source, RunRequest, RunSummary};
pub use store::{ArtifactError, ArtifactStore, FsArtifactStore, OpportunityStore};
pub use stream::{parse_death_csv, CsvParseStats, DeathRow};
pub use transform::Rejected;
pub use upsert::{upsert_in_batches, BatchOutcome, DEFAULT_BATCH_SIZE};
