//! Canonical opportunity record and source identity types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The upstream datasets an opportunity can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Energy-performance diagnostics with a poor energy class.
    EnergySieve,
    /// Companies entering collective proceedings (liquidation etc.).
    FailingCompany,
    /// Civil death registry entries.
    DeathRecord,
}

impl SourceKind {
    /// Stable string form, used as the `source` column value and in CLI args.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::EnergySieve => "energy_sieve",
            SourceKind::FailingCompany => "failing_company",
            SourceKind::DeathRecord => "death_record",
        }
    }

    /// How duplicate natural keys are handled when persisting this source.
    ///
    /// Energy diagnostics and death records are immutable once issued, so the
    /// first write wins. Collective proceedings evolve (status, address), so
    /// re-ingestion refreshes the stored row.
    #[must_use]
    pub fn default_conflict_policy(self) -> ConflictPolicy {
        match self {
            SourceKind::EnergySieve | SourceKind::DeathRecord => ConflictPolicy::SkipExisting,
            SourceKind::FailingCompany => ConflictPolicy::UpdateExisting,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown source \"{0}\" (expected energy_sieve, failing_company, or death_record)")]
pub struct UnknownSourceError(pub String);

impl std::str::FromStr for SourceKind {
    type Err = UnknownSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "energy_sieve" | "energy-sieve" => Ok(SourceKind::EnergySieve),
            "failing_company" | "failing-company" => Ok(SourceKind::FailingCompany),
            "death_record" | "death-record" => Ok(SourceKind::DeathRecord),
            other => Err(UnknownSourceError(other.to_owned())),
        }
    }
}

/// Conflict handling for batch upserts on the `(source, external_id)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// First write wins; re-ingesting an existing key is a no-op.
    SkipExisting,
    /// Re-ingesting an existing key refreshes the mutable columns.
    UpdateExisting,
}

/// A normalized lead record, regardless of source type.
///
/// Produced by the per-source transformers; invariants (non-empty label,
/// finite in-range coordinates, plausible zip code, parseable non-future
/// date) are enforced at transformation time, so holders of a value of this
/// type may rely on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub source: SourceKind,
    /// Natural dedup key: DPE certificate number, SIRET, or the digest of a
    /// death-registry composite key.
    pub external_id: String,
    /// Display string derived from the most specific available text field.
    pub label: String,
    /// Street line, when the source provides one.
    pub address: Option<String>,
    pub zip_code: String,
    /// First two digits of the zip code.
    pub department: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Calendar date of the event the opportunity is anchored to, no time
    /// component.
    pub opportunity_date: NaiveDate,
    /// Source-specific contact attributes (company name, registry office…).
    pub contact_data: serde_json::Value,
    /// Remaining source-specific attributes kept for downstream display.
    pub extra_data: serde_json::Value,
    /// Bulk file the record came from, when ingested from a file drop.
    pub source_file: Option<String>,
}
