//! Transformation of energy-diagnostic API records.

use chrono::NaiveDate;
use serde_json::{json, Value};

use leadmine_core::{Opportunity, SourceKind};

use super::{
    department_of, ensure_not_future, parse_geopoint, parse_iso_date, required_field,
    string_field, validate_coordinates, validate_zip, Rejected,
};
use crate::geocode::GeocodedPoint;

/// `true` when the record carries its own geopoint and no geocoding lookup
/// is needed.
#[must_use]
pub fn has_coordinates(raw: &Value) -> bool {
    string_field(raw, "_geopoint").is_some()
}

/// Free-text geocoding query for records missing a geopoint.
#[must_use]
pub fn geocoding_query(raw: &Value) -> Option<String> {
    let address = string_field(raw, "adresse_ban").or_else(|| string_field(raw, "adresse_brut"))?;
    let mut query = address;
    if let Some(zip) = string_field(raw, "code_postal_ban") {
        query.push(' ');
        query.push_str(&zip);
    }
    if let Some(commune) = string_field(raw, "nom_commune_ban") {
        query.push(' ');
        query.push_str(&commune);
    }
    Some(query)
}

/// Maps one diagnostic record to a canonical opportunity.
///
/// `geocoded` supplies coordinates when the record has no `_geopoint`; it is
/// ignored otherwise.
///
/// # Errors
///
/// Returns [`Rejected`] when a required field is missing, a numeric or date
/// field does not parse, or neither the record nor `geocoded` yields
/// coordinates.
pub fn transform(
    raw: &Value,
    today: NaiveDate,
    geocoded: Option<&GeocodedPoint>,
) -> Result<Opportunity, Rejected> {
    let external_id = required_field(raw, "numero_dpe")?;

    let zip_code = required_field(raw, "code_postal_ban")?;
    validate_zip(&zip_code)?;

    let address = string_field(raw, "adresse_ban").or_else(|| string_field(raw, "adresse_brut"));
    let commune = string_field(raw, "nom_commune_ban");

    let (latitude, longitude) = match string_field(raw, "_geopoint") {
        Some(geopoint) => parse_geopoint(&geopoint)?,
        None => match geocoded {
            Some(point) => (point.latitude, point.longitude),
            None => return Err(Rejected::new("missing geopoint and no geocoding match")),
        },
    };
    validate_coordinates(latitude, longitude)?;

    let date_raw = string_field(raw, "date_etablissement_dpe")
        .or_else(|| string_field(raw, "date_visite_diagnostiqueur"))
        .ok_or_else(|| Rejected::new("missing diagnosis date"))?;
    let opportunity_date = parse_iso_date(&date_raw)?;
    ensure_not_future(opportunity_date, today)?;

    let label = address
        .clone()
        .or_else(|| commune.clone())
        .ok_or_else(|| Rejected::new("no label source (address or commune)"))?;

    let mut extra = serde_json::Map::new();
    for field in [
        "etiquette_dpe",
        "etiquette_ges",
        "type_batiment",
        "annee_construction",
        "surface_habitable_logement",
    ] {
        if let Some(value) = string_field(raw, field) {
            extra.insert(field.to_owned(), Value::String(value));
        }
    }
    if let Some(commune) = commune {
        extra.insert("commune".to_owned(), Value::String(commune));
    }

    Ok(Opportunity {
        source: SourceKind::EnergySieve,
        external_id,
        label,
        address,
        department: department_of(&zip_code),
        zip_code,
        latitude,
        longitude,
        opportunity_date,
        contact_data: json!({}),
        extra_data: Value::Object(extra),
        source_file: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "numero_dpe": "2475E1234567",
            "adresse_ban": "12 Rue de la Paix",
            "code_postal_ban": "75002",
            "nom_commune_ban": "Paris",
            "_geopoint": "48.8691,2.3316",
            "date_etablissement_dpe": "2024-11-20",
            "etiquette_dpe": "G",
            "surface_habitable_logement": 54.3
        })
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn valid_record_becomes_opportunity() {
        let opportunity = transform(&sample(), today(), None).unwrap();
        assert_eq!(opportunity.source, SourceKind::EnergySieve);
        assert_eq!(opportunity.external_id, "2475E1234567");
        assert_eq!(opportunity.label, "12 Rue de la Paix");
        assert_eq!(opportunity.zip_code, "75002");
        assert_eq!(opportunity.department, "75");
        assert!((opportunity.latitude - 48.8691).abs() < 1e-9);
        assert!((opportunity.longitude - 2.3316).abs() < 1e-9);
        assert_eq!(
            opportunity.opportunity_date,
            NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()
        );
        assert_eq!(opportunity.extra_data["etiquette_dpe"], "G");
        assert!(!opportunity.label.is_empty());
    }

    #[test]
    fn missing_certificate_number_is_rejected() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("numero_dpe");
        let err = transform(&raw, today(), None).unwrap_err();
        assert!(err.reason.contains("numero_dpe"));
    }

    #[test]
    fn missing_zip_is_rejected() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("code_postal_ban");
        assert!(transform(&raw, today(), None).is_err());
    }

    #[test]
    fn garbage_geopoint_is_rejected_not_geocoded() {
        let mut raw = sample();
        raw["_geopoint"] = json!("not-a-point");
        let geocoded = GeocodedPoint {
            latitude: 48.0,
            longitude: 2.0,
            postcode: None,
            city: None,
            score: 0.9,
        };
        // A present-but-corrupt geopoint is a data defect, not a missing one.
        assert!(transform(&raw, today(), Some(&geocoded)).is_err());
    }

    #[test]
    fn missing_geopoint_uses_geocoded_fallback() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("_geopoint");
        let geocoded = GeocodedPoint {
            latitude: 48.87,
            longitude: 2.33,
            postcode: None,
            city: None,
            score: 0.8,
        };
        let opportunity = transform(&raw, today(), Some(&geocoded)).unwrap();
        assert!((opportunity.latitude - 48.87).abs() < 1e-9);
    }

    #[test]
    fn missing_geopoint_without_match_is_rejected() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("_geopoint");
        let err = transform(&raw, today(), None).unwrap_err();
        assert!(err.reason.contains("no geocoding match"));
    }

    #[test]
    fn visit_date_is_fallback_when_primary_absent() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("date_etablissement_dpe");
        raw["date_visite_diagnostiqueur"] = json!("2024-10-02");
        let opportunity = transform(&raw, today(), None).unwrap();
        assert_eq!(
            opportunity.opportunity_date,
            NaiveDate::from_ymd_opt(2024, 10, 2).unwrap()
        );
    }

    #[test]
    fn record_without_any_date_is_rejected() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("date_etablissement_dpe");
        let err = transform(&raw, today(), None).unwrap_err();
        assert!(err.reason.contains("missing diagnosis date"));
    }

    #[test]
    fn future_date_is_rejected() {
        let mut raw = sample();
        raw["date_etablissement_dpe"] = json!("2026-01-01");
        assert!(transform(&raw, today(), None).is_err());
    }

    #[test]
    fn label_falls_back_to_commune() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("adresse_ban");
        let opportunity = transform(&raw, today(), None).unwrap();
        assert_eq!(opportunity.label, "Paris");
        assert!(opportunity.address.is_none());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut raw = sample();
        raw["_geopoint"] = json!("98.0,2.33");
        assert!(transform(&raw, today(), None).is_err());
    }
}
