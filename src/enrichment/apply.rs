// src/enrichment/apply.rs - Fill-only application of an accepted place match
use log::debug;

use crate::matching::geofence::is_valid_coordinate;
use crate::matching::tag_record;
use crate::matching::url::identity_domain;
use crate::models::core::{fill_if_empty, has_text, CompanyRecord};
use crate::models::matching::MatchCandidate;

/// City from a Places-style address: the part before the "CA 94080" part.
pub fn city_from_address(formatted_address: &str) -> Option<String> {
    let parts: Vec<&str> = formatted_address.split(',').map(str::trim).collect();
    let state_idx = parts.iter().position(|p| {
        let mut tokens = p.split_whitespace();
        matches!(tokens.next(), Some(state) if state.eq_ignore_ascii_case("ca") || state.eq_ignore_ascii_case("california"))
    })?;
    if state_idx == 0 {
        return None;
    }
    let city = parts[state_idx - 1];
    if city.is_empty() || city.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        None
    } else {
        Some(city.to_string())
    }
}

/// Copies location fields from `candidate` onto `record`. Empty fields are
/// filled; address, coordinates and place id are replaced only when the
/// candidate's score beats the stored location confidence. A location with no
/// confidence on file is curated and only ever filled. Returns the names of
/// the fields written.
pub fn apply_place_match(record: &mut CompanyRecord, candidate: &MatchCandidate) -> Vec<&'static str> {
    let place = &candidate.place;
    let mut written = Vec::new();
    let stronger = match record.location_confidence {
        Some(existing) => candidate.score > existing,
        None => !has_text(&record.address) && record.coordinates().is_none(),
    };

    if stronger && has_text(&place.formatted_address) {
        if record.address != place.formatted_address {
            record.address = place.formatted_address.clone();
            written.push("address");
        }
    } else if fill_if_empty(&mut record.address, &place.formatted_address) {
        written.push("address");
    }

    if let Some(loc) = place.location().filter(|l| is_valid_coordinate(l.lat, l.lng)) {
        if stronger || record.coordinates().is_none() {
            record.latitude = Some(loc.lat);
            record.longitude = Some(loc.lng);
            written.push("coordinates");
        }
    }

    if stronger && has_text(&place.place_id) {
        if record.place_id != place.place_id {
            record.place_id = place.place_id.clone();
            written.push("place_id");
        }
    } else if fill_if_empty(&mut record.place_id, &place.place_id) {
        written.push("place_id");
    }

    if stronger {
        record.location_confidence = Some(candidate.score);
        written.push("location_confidence");
    }

    if record.city.as_deref().map_or(true, |c| c.trim().is_empty()) {
        // from the address now on the record, which may be the curated one
        if let Some(city) = record.address.as_deref().and_then(city_from_address) {
            record.city = Some(city);
            written.push("city");
        }
    }

    // A listing or site-builder website is never adopted as the company's own.
    let record_has_identity = record.website.as_deref().and_then(identity_domain).is_some();
    let place_identity = place.website.as_deref().and_then(identity_domain);
    if !record_has_identity && place_identity.is_some() {
        record.website = place.website.clone();
        written.push("website");
    }

    tag_record(record);
    record.refresh_quality_score();
    debug!("[PLACES] '{}' updated fields {:?}", record.name, written);
    written
}
