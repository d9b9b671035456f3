//! Postgres implementation of the pipeline's storage contract.

use std::collections::HashSet;

use sqlx::PgPool;

use leadmine_core::{ConflictPolicy, Opportunity, SourceKind};
use leadmine_ingest::OpportunityStore;

use crate::opportunities;

/// The opportunity store the ingestion pipeline writes through in production.
#[derive(Debug, Clone)]
pub struct PgOpportunityStore {
    pool: PgPool,
}

impl PgOpportunityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl OpportunityStore for PgOpportunityStore {
    type Error = sqlx::Error;

    async fn upsert_batch(
        &self,
        records: &[Opportunity],
        policy: ConflictPolicy,
    ) -> Result<u64, Self::Error> {
        opportunities::upsert_opportunities(&self.pool, records, policy).await
    }

    async fn existing_natural_keys(
        &self,
        source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error> {
        opportunities::existing_natural_keys(&self.pool, source).await
    }

    async fn existing_source_files(
        &self,
        source: SourceKind,
    ) -> Result<HashSet<String>, Self::Error> {
        opportunities::existing_source_files(&self.pool, source).await
    }
}
