//! Collaborator contracts the pipeline persists through.
//!
//! The ingestion core never talks to a concrete database or blob backend:
//! it requires only the two small contracts below. The Postgres
//! implementation lives in `leadmine-db`; a filesystem-backed artifact store
//! ships here for failure reports and tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use leadmine_core::{ConflictPolicy, Opportunity, SourceKind};
use thiserror::Error;

/// Upsert-capable storage keyed by the per-source natural key.
#[allow(async_fn_in_trait)]
pub trait OpportunityStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Idempotently writes one batch, returning the number of rows that did
    /// not exist before.
    async fn upsert_batch(
        &self,
        records: &[Opportunity],
        policy: ConflictPolicy,
    ) -> Result<u64, Self::Error>;

    /// All natural keys already stored for `source`.
    async fn existing_natural_keys(
        &self,
        source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error>;

    /// Distinct bulk-file names already ingested for `source` — the dedup
    /// input for file discovery.
    async fn existing_source_files(
        &self,
        source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error>;
}

/// Blob storage for run artifacts (failure reports).
#[allow(async_fn_in_trait)]
pub trait ArtifactStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stores `bytes` under `key` and returns a locator for later retrieval.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, Self::Error>;

    async fn get(&self, locator: &str) -> Result<Vec<u8>, Self::Error>;

    async fn delete(&self, locator: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Artifact store writing to a local directory; locators are file paths.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    type Error = ArtifactError;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, Self::Error> {
        tokio::fs::create_dir_all(&self.root).await?;
        // Keys are generated by the pipeline, not user input; strip path
        // separators anyway so a key can never escape the root.
        let safe_key = key.replace(['/', '\\'], "_");
        let path = self.root.join(safe_key);
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, Self::Error> {
        Ok(tokio::fs::read(locator).await?)
    }

    async fn delete(&self, locator: &str) -> Result<(), Self::Error> {
        Ok(tokio::fs::remove_file(locator).await?)
    }
}
