//! Per-source transformation from raw records to canonical opportunities.
//!
//! Transformers are pure — no I/O, no suspension — and never panic on
//! malformed input: anything that cannot become a valid [`Opportunity`]
//! comes back as [`Rejected`] with a human-readable reason, which the run
//! layer routes to the failure sink.
//!
//! One module per source; shared validation lives here. The source's
//! transformer is selected by `SourceKind` when the run is constructed.

pub mod company;
pub mod deaths;
pub mod energy;

use chrono::NaiveDate;
use serde_json::Value;

/// A per-record validation failure. Routed to the failure sink; never aborts
/// the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub reason: String,
}

impl Rejected {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Reads a field as a non-empty trimmed string. Numeric values are accepted
/// and stringified — upstreams are inconsistent about quoting codes.
pub(crate) fn string_field(raw: &Value, field: &str) -> Option<String> {
    match raw.get(field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`string_field`], but missing/empty is a rejection.
pub(crate) fn required_field(raw: &Value, field: &str) -> Result<String, Rejected> {
    string_field(raw, field).ok_or_else(|| Rejected::new(format!("missing field \"{field}\"")))
}

/// Reads an optional numeric field.
///
/// Absent fields are `Ok(None)`; a field that is present but does not parse
/// to a finite number is a rejection — a corrupt coordinate must not be
/// silently papered over by the geocoding fallback.
pub(crate) fn finite_f64_field(raw: &Value, field: &str) -> Result<Option<f64>, Rejected> {
    let Some(value) = raw.get(field) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(Rejected::new(format!("unparseable numeric field \"{field}\""))),
    }
}

/// Splits a `"lat,lon"` geopoint string into a coordinate pair.
pub(crate) fn parse_geopoint(s: &str) -> Result<(f64, f64), Rejected> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| Rejected::new(format!("geopoint \"{s}\" is not \"lat,lon\"")))?;
    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| Rejected::new(format!("unparseable latitude \"{lat}\"")))?;
    let longitude: f64 = lon
        .trim()
        .parse()
        .map_err(|_| Rejected::new(format!("unparseable longitude \"{lon}\"")))?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(Rejected::new(format!("non-finite geopoint \"{s}\"")));
    }
    Ok((latitude, longitude))
}

/// WGS84 range check; values must already be finite.
pub(crate) fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), Rejected> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Rejected::new(format!("latitude {latitude} out of range")));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Rejected::new(format!("longitude {longitude} out of range")));
    }
    Ok(())
}

/// A zip code must be all digits, of plausible length, and positive.
pub(crate) fn validate_zip(zip: &str) -> Result<(), Rejected> {
    let plausible_len = (4..=5).contains(&zip.len());
    if !plausible_len || !zip.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejected::new(format!("implausible zip code \"{zip}\"")));
    }
    match zip.parse::<u32>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(Rejected::new(format!("implausible zip code \"{zip}\""))),
    }
}

/// First two digits of the zip code.
pub(crate) fn department_of(zip: &str) -> String {
    zip.chars().take(2).collect()
}

/// Parses an ISO calendar date, tolerating a trailing time component.
pub(crate) fn parse_iso_date(s: &str) -> Result<NaiveDate, Rejected> {
    let day_part = s.get(0..10).unwrap_or(s);
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|_| Rejected::new(format!("unparseable date \"{s}\"")))
}

/// Parses an 8-digit `YYYYMMDD` registry date.
pub(crate) fn parse_compact_date(s: &str) -> Result<NaiveDate, Rejected> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|_| Rejected::new(format!("unparseable date \"{s}\"")))
}

/// Historical sources cannot produce events in the future.
pub(crate) fn ensure_not_future(date: NaiveDate, today: NaiveDate) -> Result<(), Rejected> {
    if date > today {
        return Err(Rejected::new(format!("date {date} is in the future")));
    }
    Ok(())
}
