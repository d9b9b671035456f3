//! Transformation of collective-proceeding (company failure) API records.

use chrono::NaiveDate;
use serde_json::{json, Value};

use leadmine_core::{Opportunity, SourceKind};

use super::{
    department_of, ensure_not_future, finite_f64_field, parse_iso_date, required_field,
    string_field, validate_coordinates, validate_zip, Rejected,
};
use crate::geocode::GeocodedPoint;

/// `true` when the record carries its own coordinate fields. A record with
/// present-but-corrupt coordinates also counts: the transformer must reject
/// it rather than have geocoding paper over the defect.
#[must_use]
pub fn has_coordinates(raw: &Value) -> bool {
    let present = |field: &str| {
        raw.get(field)
            .is_some_and(|v| !v.is_null() && string_field(raw, field).is_some())
    };
    present("latitude") && present("longitude")
}

/// Free-text geocoding query built from the proceeding's address fields.
#[must_use]
pub fn geocoding_query(raw: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for field in ["adresse", "code_postal", "ville"] {
        if let Some(value) = string_field(raw, field) {
            parts.push(value);
        }
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Maps one proceeding record to a canonical opportunity.
///
/// `geocoded` supplies coordinates when the record has none of its own.
///
/// # Errors
///
/// Returns [`Rejected`] when the SIRET, postal code, or judgment date is
/// missing or malformed, when a present coordinate does not parse to a
/// finite number, or when no coordinates can be established at all.
pub fn transform(
    raw: &Value,
    today: NaiveDate,
    geocoded: Option<&GeocodedPoint>,
) -> Result<Opportunity, Rejected> {
    let external_id = required_field(raw, "siret")?;

    let zip_code = required_field(raw, "code_postal")?;
    validate_zip(&zip_code)?;

    let company_name = string_field(raw, "denomination");
    let address = string_field(raw, "adresse");
    let city = string_field(raw, "ville");

    let own_latitude = finite_f64_field(raw, "latitude")?;
    let own_longitude = finite_f64_field(raw, "longitude")?;
    let (latitude, longitude) = match (own_latitude, own_longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        (None, None) => match geocoded {
            Some(point) => (point.latitude, point.longitude),
            None => return Err(Rejected::new("missing coordinates and no geocoding match")),
        },
        _ => return Err(Rejected::new("record has only one coordinate field")),
    };
    validate_coordinates(latitude, longitude)?;

    let date_raw = string_field(raw, "date_jugement")
        .or_else(|| string_field(raw, "date_parution"))
        .ok_or_else(|| Rejected::new("missing judgment and publication dates"))?;
    let opportunity_date = parse_iso_date(&date_raw)?;
    ensure_not_future(opportunity_date, today)?;

    let label = company_name
        .clone()
        .or_else(|| address.clone())
        .or_else(|| city.clone())
        .ok_or_else(|| Rejected::new("no label source (name, address, or city)"))?;

    let mut extra = serde_json::Map::new();
    for field in ["nature_jugement", "famille_jugement", "activite"] {
        if let Some(value) = string_field(raw, field) {
            extra.insert(field.to_owned(), Value::String(value));
        }
    }
    if let Some(city) = city {
        extra.insert("ville".to_owned(), Value::String(city));
    }

    let contact_data = match company_name {
        Some(name) => json!({ "denomination": name }),
        None => json!({}),
    };

    Ok(Opportunity {
        source: SourceKind::FailingCompany,
        external_id,
        label,
        address,
        department: department_of(&zip_code),
        zip_code,
        latitude,
        longitude,
        opportunity_date,
        contact_data,
        extra_data: Value::Object(extra),
        source_file: None,
    })
}
