//! Coordinate resolution for records whose source carries no geopoint.
//!
//! Queries a BAN-style address API (`/search/?q=…&limit=1`) and reads the
//! best feature of the GeoJSON response. "No match" is a normal outcome, not
//! an error — the caller turns it into a validation rejection.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::error::IngestError;
use crate::fetch::RateLimitedFetcher;

/// Matches below this relevance score are treated as "no match".
const MIN_SCORE: f64 = 0.4;

/// A resolved location. The geocoder also surfaces the postal code and city
/// of the match, which sources without their own address fields reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub score: f64,
}

/// Geocoding client over its own rate-limited fetcher — the geocoding host
/// has its own request budget, separate from the data APIs.
pub struct GeocodingResolver {
    fetcher: RateLimitedFetcher,
    base_url: String,
}

impl GeocodingResolver {
    #[must_use]
    pub fn new(fetcher: RateLimitedFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Looks up a free-text address.
    ///
    /// Returns `Ok(None)` when the API has no confident match for the query
    /// (empty feature list, sub-threshold score, 404) — the caller must treat
    /// that as a per-record rejection, not a fatal condition.
    ///
    /// # Errors
    ///
    /// Propagates [`IngestError`] for request-level failures (rate limiting
    /// after retries, 5xx, network), which batch-level isolation handles
    /// upstream.
    pub async fn resolve(&self, query: &str) -> Result<Option<GeocodedPoint>, IngestError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let encoded = utf8_percent_encode(trimmed, NON_ALPHANUMERIC).to_string();
        let url = format!(
            "{}/search/?q={encoded}&limit=1",
            self.base_url.trim_end_matches('/')
        );

        let value = match self.fetcher.get_json(&url).await {
            Ok(value) => value,
            Err(IngestError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(best_feature(&value))
    }
}

/// Reads the first feature of a GeoJSON response, if it is usable.
fn best_feature(value: &serde_json::Value) -> Option<GeocodedPoint> {
    let feature = value
        .get("features")
        .and_then(serde_json::Value::as_array)?
        .first()?;

    let coordinates = feature
        .get("geometry")?
        .get("coordinates")?
        .as_array()?;
    // GeoJSON order: [longitude, latitude].
    let longitude = coordinates.first()?.as_f64()?;
    let latitude = coordinates.get(1)?.as_f64()?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }

    let properties = feature.get("properties");
    let score = properties
        .and_then(|p| p.get("score"))
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    if score < MIN_SCORE {
        return None;
    }

    let string_prop = |key: &str| {
        properties
            .and_then(|p| p.get(key))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };

    Some(GeocodedPoint {
        latitude,
        longitude,
        postcode: string_prop("postcode"),
        city: string_prop("city"),
        score,
    })
}
