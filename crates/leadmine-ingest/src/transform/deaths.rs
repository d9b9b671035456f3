//! Transformation of civil-registry death rows.
//!
//! Registry rows never carry coordinates or a postal code; both come from
//! the geocoding lookup on the death-place commune code. The natural key is
//! a digest of the registry's composite identity (place, act number, date) —
//! no single upstream field is unique on its own.

use chrono::NaiveDate;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use leadmine_core::{Opportunity, SourceKind};

use super::{
    department_of, ensure_not_future, parse_compact_date, validate_coordinates, validate_zip,
    Rejected,
};
use crate::geocode::GeocodedPoint;
use crate::stream::{age_at, DeathRow};

/// Geocoding query for a registry row: the commune code of the death place.
#[must_use]
pub fn geocoding_query(row: &DeathRow) -> String {
    row.death_place_code.clone()
}

/// Digest of the composite registry identity, used as the natural key.
#[must_use]
pub fn natural_key(row: &DeathRow) -> String {
    let input = format!(
        "{}:{}:{}",
        row.death_place_code, row.act_number, row.death_date
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Maps one registry row to a canonical opportunity.
///
/// `place` is the geocoded death-place commune; rows whose commune could not
/// be resolved are rejected, since without it there is neither a postal code
/// nor a coordinate pair.
///
/// # Errors
///
/// Returns [`Rejected`] on a missing geocoding match, a match without a
/// postal code, an unparseable or future death date, or an empty name.
pub fn transform(
    row: &DeathRow,
    today: NaiveDate,
    place: Option<&GeocodedPoint>,
) -> Result<Opportunity, Rejected> {
    let place = place.ok_or_else(|| Rejected::new("no geocoding match for death place"))?;
    validate_coordinates(place.latitude, place.longitude)?;

    let zip_code = place
        .postcode
        .clone()
        .ok_or_else(|| Rejected::new("geocoded death place has no postal code"))?;
    validate_zip(&zip_code)?;

    let opportunity_date = parse_compact_date(&row.death_date)?;
    ensure_not_future(opportunity_date, today)?;

    let label = row.display_name();
    if label.is_empty() {
        return Err(Rejected::new("no label source (empty registry name)"));
    }

    let mut extra = serde_json::Map::new();
    extra.insert("birth_date".to_owned(), Value::String(row.birth_date.clone()));
    if !row.birth_commune.is_empty() {
        extra.insert(
            "birth_commune".to_owned(),
            Value::String(row.birth_commune.clone()),
        );
    }
    if !row.birth_country.is_empty() {
        extra.insert(
            "birth_country".to_owned(),
            Value::String(row.birth_country.clone()),
        );
    }
    if let Some(age) = age_at(&row.birth_date, &row.death_date) {
        extra.insert("age".to_owned(), Value::from(age));
    }
    if let Some(city) = &place.city {
        extra.insert("death_city".to_owned(), Value::String(city.clone()));
    }
    extra.insert(
        "death_place_code".to_owned(),
        Value::String(row.death_place_code.clone()),
    );

    Ok(Opportunity {
        source: SourceKind::DeathRecord,
        external_id: natural_key(row),
        label,
        address: None,
        department: department_of(&zip_code),
        zip_code,
        latitude: place.latitude,
        longitude: place.longitude,
        opportunity_date,
        contact_data: json!({
            "full_name": row.display_name(),
            "sex": row.sex,
        }),
        extra_data: Value::Object(extra),
        source_file: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> DeathRow {
        DeathRow {
            full_name: "DUPONT*JEAN MARIE/".to_owned(),
            sex: "1".to_owned(),
            birth_date: "19400101".to_owned(),
            birth_place_code: "75115".to_owned(),
            birth_commune: "PARIS".to_owned(),
            birth_country: "FRANCE".to_owned(),
            death_date: "20250105".to_owned(),
            death_place_code: "75114".to_owned(),
            act_number: "123".to_owned(),
            raw_line: String::new(),
        }
    }

    fn sample_place() -> GeocodedPoint {
        GeocodedPoint {
            latitude: 48.8331,
            longitude: 2.3264,
            postcode: Some("75014".to_owned()),
            city: Some("Paris".to_owned()),
            score: 0.9,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn valid_row_becomes_opportunity() {
        let opportunity = transform(&sample_row(), today(), Some(&sample_place())).unwrap();
        assert_eq!(opportunity.source, SourceKind::DeathRecord);
        assert_eq!(opportunity.label, "DUPONT JEAN MARIE");
        assert_eq!(opportunity.zip_code, "75014");
        assert_eq!(opportunity.department, "75");
        assert_eq!(
            opportunity.opportunity_date,
            NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()
        );
        assert_eq!(opportunity.extra_data["age"], 85);
        assert_eq!(opportunity.contact_data["sex"], "1");
        assert!(opportunity.address.is_none());
    }

    #[test]
    fn natural_key_is_stable_and_distinct() {
        let row = sample_row();
        assert_eq!(natural_key(&row), natural_key(&row.clone()));

        let mut other = sample_row();
        other.act_number = "124".to_owned();
        assert_ne!(natural_key(&row), natural_key(&other));
    }

    #[test]
    fn missing_geocoding_match_is_rejected() {
        let err = transform(&sample_row(), today(), None).unwrap_err();
        assert!(err.reason.contains("no geocoding match"));
    }

    #[test]
    fn match_without_postcode_is_rejected() {
        let mut place = sample_place();
        place.postcode = None;
        let err = transform(&sample_row(), today(), Some(&place)).unwrap_err();
        assert!(err.reason.contains("no postal code"));
    }

    #[test]
    fn future_death_date_is_rejected() {
        let mut row = sample_row();
        row.death_date = "20260101".to_owned();
        assert!(transform(&row, today(), Some(&sample_place())).is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut row = sample_row();
        row.full_name = "*/".to_owned();
        let err = transform(&row, today(), Some(&sample_place())).unwrap_err();
        assert!(err.reason.contains("empty registry name"));
    }
}
