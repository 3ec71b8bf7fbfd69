//! Maps remote amenities and room attributes onto local taxonomy terms.
//!
//! Amenity terms are tracked through a persisted UID dictionary so a remote
//! amenity keeps pointing at the same local term across renames. Room
//! attributes (bedrooms, beds, bathrooms, guests, size) each get their own
//! taxonomy with single-value terms like "3" or "120 m2".

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::config::{
    ATTR_TAX_PREFIX, META_AMENITY_UID, OPT_AMENITY_MAP, OPT_ATTR_REGISTRY,
    OPT_LEGACY_BEDROOM_CLEANED, TAX_AMENITY, TAX_AMENITY_LABEL,
};
use crate::error::AppResult;
use crate::logging::ImportLog;
use crate::resolve::{find_number, sum_numeric_array};
use crate::store::{RecordKind, Store, TermId};

fn amenity_map(store: &Store) -> BTreeMap<String, TermId> {
    let mut map = BTreeMap::new();
    if let Some(Value::Object(entries)) = store.option(OPT_AMENITY_MAP) {
        for (key, value) in entries {
            if let Some(id) = value.as_u64() {
                map.insert(key.clone(), id);
            }
        }
    }
    map
}

fn remember_amenity(store: &mut Store, key: &str, term: TermId) {
    let mut map = amenity_map(store);
    map.insert(key.to_string(), term);
    let value = Value::Object(
        map.into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect(),
    );
    store.set_option(OPT_AMENITY_MAP, value);
}

/// Resolves a remote amenity to a local term, creating one when needed.
/// Returns the term plus whether it was freshly created.
///
/// Resolution order: UID dictionary, term-meta back-reference, exact name
/// match, fresh term. Whichever path hits, the dictionary and term meta are
/// updated so later runs take the fast path.
pub fn ensure_amenity_term(
    store: &mut Store,
    uid: &str,
    name: &str,
    log: &mut ImportLog,
) -> AppResult<Option<(TermId, bool)>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    store.ensure_taxonomy(TAX_AMENITY, TAX_AMENITY_LABEL);

    let key = if uid.is_empty() {
        format!("name:{}", name.to_lowercase())
    } else {
        uid.to_string()
    };

    if let Some(term) = amenity_map(store).get(&key).copied() {
        if store.term_exists(TAX_AMENITY, term) {
            return Ok(Some((term, false)));
        }
        // Stale dictionary entry, fall through and re-resolve.
    }

    let found = if uid.is_empty() {
        None
    } else {
        store.find_term_by_meta(TAX_AMENITY, META_AMENITY_UID, uid)
    };
    let found = found.or_else(|| store.find_term_by_name(TAX_AMENITY, name));

    let (term, created) = match found {
        Some(term) => (term, false),
        None => {
            let term = store.insert_term(TAX_AMENITY, name)?;
            log.debug(format!("Created amenity term \"{name}\""));
            (term, true)
        }
    };

    if !uid.is_empty() {
        store.set_term_meta(TAX_AMENITY, term, META_AMENITY_UID, json!(uid));
    }
    remember_amenity(store, &key, term);
    Ok(Some((term, created)))
}

/// Finds or creates terms by name in a flat taxonomy (categories, tags).
pub fn upsert_terms(
    store: &mut Store,
    taxonomy: &str,
    label: &str,
    names: &[String],
    log: &mut ImportLog,
) -> AppResult<Vec<TermId>> {
    store.ensure_taxonomy(taxonomy, label);
    let mut terms = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let term = match store.find_term_by_name(taxonomy, name) {
            Some(term) => term,
            None => {
                let term = store.insert_term(taxonomy, name)?;
                log.debug(format!("Created {taxonomy} term \"{name}\""));
                term
            }
        };
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    Ok(terms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Bedrooms,
    Beds,
    Bathrooms,
    Guests,
    Size,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 5] = [
        AttributeKind::Bedrooms,
        AttributeKind::Beds,
        AttributeKind::Bathrooms,
        AttributeKind::Guests,
        AttributeKind::Size,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AttributeKind::Bedrooms => "bedrooms",
            AttributeKind::Beds => "beds",
            AttributeKind::Bathrooms => "bathrooms",
            AttributeKind::Guests => "guests",
            AttributeKind::Size => "size",
        }
    }

    fn default_slug(self) -> &'static str {
        match self {
            AttributeKind::Bedrooms => "ra_bedroom",
            AttributeKind::Beds => "ra_bed",
            AttributeKind::Bathrooms => "ra_bathroom",
            AttributeKind::Guests => "ra_guest",
            AttributeKind::Size => "ra_size",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AttributeKind::Bedrooms => "Bedrooms",
            AttributeKind::Beds => "Beds",
            AttributeKind::Bathrooms => "Bathrooms",
            AttributeKind::Guests => "Guests",
            AttributeKind::Size => "Size",
        }
    }
}

/// Classifies a free-form attribute name. "bathroom" must be checked ahead
/// of "bed" so "bathroom" never lands in the beds bucket.
pub fn infer_attribute_kind(name: &str) -> Option<AttributeKind> {
    let lower = name.to_lowercase();
    if lower.contains("bedroom") {
        Some(AttributeKind::Bedrooms)
    } else if lower.contains("bathroom") || lower.contains("bath") {
        Some(AttributeKind::Bathrooms)
    } else if lower.contains("bed") {
        Some(AttributeKind::Beds)
    } else if lower.contains("guest") || lower.contains("sleep") || lower.contains("occupan") {
        Some(AttributeKind::Guests)
    } else if lower.contains("size") || lower.contains("area") || lower.contains("m2") || lower.contains("sq") {
        Some(AttributeKind::Size)
    } else {
        None
    }
}

/// Registry of attribute taxonomies. Seeded with defaults on first use and
/// persisted so slugs stay stable even if defaults change later.
pub fn ensure_attribute_taxonomy(store: &mut Store, kind: AttributeKind) -> String {
    let mut registry: BTreeMap<String, String> = match store.option(OPT_ATTR_REGISTRY) {
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    };

    let slug = registry
        .get(kind.key())
        .cloned()
        .unwrap_or_else(|| kind.default_slug().to_string());
    if !registry.contains_key(kind.key()) {
        registry.insert(kind.key().to_string(), slug.clone());
        let value = Value::Object(registry.into_iter().map(|(k, v)| (k, json!(v))).collect());
        store.set_option(OPT_ATTR_REGISTRY, value);
    }

    store.ensure_taxonomy(&slug, kind.label());
    if store.find_record_by_slug(RecordKind::Attribute, &slug).is_none() {
        let id = store.upsert_record(RecordKind::Attribute, None, kind.label());
        store.set_record_slug(id, &slug);
    }
    slug
}

fn format_count(value: f64) -> String {
    if (value - value.round()).abs() < f64::EPSILON {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

/// Extracts room attribute values out of a listing detail payload. Values
/// at or below zero are dropped rather than imported as nonsense terms.
pub fn property_attribute_values(detail: &Value) -> Vec<(AttributeKind, String)> {
    let mut resolved: Vec<(AttributeKind, String)> = Vec::new();
    let mut push = |kind: AttributeKind, label: String| {
        if !resolved.iter().any(|(k, _)| *k == kind) {
            resolved.push((kind, label));
        }
    };

    if let Some(n) = find_number(
        detail,
        &[&["bedrooms"], &["bedroomCount"], &["numberOfBedrooms"]],
    ) {
        if n > 0.0 {
            push(AttributeKind::Bedrooms, format_count(n));
        }
    }

    if let Some(n) = find_number(
        detail,
        &[&["bathrooms"], &["bathroomCount"], &["numberOfBathrooms"]],
    ) {
        if n > 0.0 {
            push(AttributeKind::Bathrooms, format_count(n));
        }
    }

    let beds = find_number(detail, &[&["beds"], &["bedCount"], &["numberOfBeds"]])
        .or_else(|| detail.get("bedTypes").and_then(sum_numeric_array))
        .or_else(|| detail.get("beds").and_then(sum_numeric_array));
    if let Some(n) = beds {
        if n > 0.0 {
            push(AttributeKind::Beds, format_count(n));
        }
    }

    if let Some(n) = find_number(
        detail,
        &[
            &["availability", "maxGuests"],
            &["maxGuests"],
            &["maximumGuests"],
            &["sleeps"],
        ],
    ) {
        if n > 0.0 {
            push(AttributeKind::Guests, format_count(n));
        }
    }

    // Square meters preferred, square feet only when no metric figure exists.
    let m2 = find_number(
        detail,
        &[
            &["areaSquareMeters"],
            &["squareMeters"],
            &["propertySize", "squareMeters"],
            &["surfaceArea"],
        ],
    );
    let sqft = find_number(
        detail,
        &[
            &["areaSquareFeet"],
            &["squareFeet"],
            &["propertySize", "squareFeet"],
        ],
    );
    match (m2, sqft) {
        (Some(n), _) if n > 0.0 => push(AttributeKind::Size, format!("{} m2", format_count(n))),
        (_, Some(n)) if n > 0.0 => push(AttributeKind::Size, format!("{} sq ft", format_count(n))),
        _ => {}
    }

    // Named attribute rows act as a fallback for anything still missing.
    if let Some(items) = detail.get("attributes").and_then(Value::as_array) {
        for item in items {
            let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
            let Some(kind) = infer_attribute_kind(name) else {
                continue;
            };
            if let Some(n) = item.get("value").and_then(crate::resolve::extract_number) {
                if n > 0.0 {
                    push(kind, format_count(n));
                }
            }
        }
    }

    resolved
}

/// Assigns room attribute terms to a listing record, one term per attribute.
pub fn import_attributes(
    store: &mut Store,
    record: crate::store::RecordId,
    detail: &Value,
    log: &mut ImportLog,
) -> AppResult<()> {
    cleanup_legacy_bedroom_term(store);

    for (kind, label) in property_attribute_values(detail) {
        let slug = ensure_attribute_taxonomy(store, kind);
        let term = match store.find_term_by_name(&slug, &label) {
            Some(term) => term,
            None => store.insert_term(&slug, &label)?,
        };
        store.set_object_terms(record, &slug, &[term]);
        log.debug(format!("Attribute {}: {label}", kind.key()));
    }
    Ok(())
}

/// One-time removal of the placeholder "Bedroom" term an early release used
/// to create. Guarded by a persisted flag so it never reruns.
pub fn cleanup_legacy_bedroom_term(store: &mut Store) {
    if store.option(OPT_LEGACY_BEDROOM_CLEANED).is_some() {
        return;
    }
    for slug in store.taxonomies_with_prefix(ATTR_TAX_PREFIX) {
        if let Some(term) = store.find_term_by_name(&slug, "Bedroom") {
            store.remove_term_from_objects(&slug, term);
            store.delete_term(&slug, term);
        }
    }
    store.set_option(OPT_LEGACY_BEDROOM_CLEANED, json!(true));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amenity_dictionary_is_stable_across_renames() {
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let (first, created) = ensure_amenity_term(&mut store, "am-1", "Pool", &mut log)
            .unwrap()
            .unwrap();
        assert!(created);
        // Remote rename: same UID must resolve to the same local term.
        let (second, created) = ensure_amenity_term(&mut store, "am-1", "Swimming Pool", &mut log)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert!(!created);

        // A different UID with a colliding name reuses the named term too.
        let (third, created) = ensure_amenity_term(&mut store, "am-2", "Pool", &mut log)
            .unwrap()
            .unwrap();
        assert_eq!(first, third);
        assert!(!created);
    }

    #[test]
    fn uidless_amenities_key_by_name() {
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let (a, _) = ensure_amenity_term(&mut store, "", "Sauna", &mut log)
            .unwrap()
            .unwrap();
        let (b, _) = ensure_amenity_term(&mut store, "", "SAUNA", &mut log)
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            ensure_amenity_term(&mut store, "", "  ", &mut log).unwrap(),
            None
        );
    }

    #[test]
    fn attribute_values_prefer_metric_and_drop_zeroes() {
        let detail = serde_json::json!({
            "bedrooms": 3,
            "bathrooms": 0,
            "bedTypes": [{"count": 2}, {"count": 2}],
            "availability": {"maxGuests": "6"},
            "areaSquareFeet": 1300,
            "areaSquareMeters": 120.0,
        });
        let values = property_attribute_values(&detail);
        assert!(values.contains(&(AttributeKind::Bedrooms, "3".to_string())));
        assert!(values.contains(&(AttributeKind::Beds, "4".to_string())));
        assert!(values.contains(&(AttributeKind::Guests, "6".to_string())));
        assert!(values.contains(&(AttributeKind::Size, "120 m2".to_string())));
        assert!(!values.iter().any(|(k, _)| *k == AttributeKind::Bathrooms));
    }

    #[test]
    fn named_attribute_rows_fill_gaps() {
        let detail = serde_json::json!({
            "attributes": [
                {"name": "Bathrooms", "value": "2.5"},
                {"name": "Garage spots", "value": 2},
            ],
        });
        let values = property_attribute_values(&detail);
        assert_eq!(values, vec![(AttributeKind::Bathrooms, "2.5".to_string())]);
    }

    #[test]
    fn named_attribute_rows_never_override_direct_fields() {
        let detail = serde_json::json!({
            "bedrooms": 3,
            "attributes": [{"name": "Bedrooms", "value": 5}],
        });
        let values = property_attribute_values(&detail);
        assert_eq!(values, vec![(AttributeKind::Bedrooms, "3".to_string())]);
    }

    #[test]
    fn kind_inference_orders_bath_before_bed() {
        assert_eq!(infer_attribute_kind("Bathroom count"), Some(AttributeKind::Bathrooms));
        assert_eq!(infer_attribute_kind("King beds"), Some(AttributeKind::Beds));
        assert_eq!(infer_attribute_kind("Max sleeps"), Some(AttributeKind::Guests));
        assert_eq!(infer_attribute_kind("Balcony"), None);
    }

    #[test]
    fn legacy_bedroom_term_removed_once() {
        let mut store = Store::in_memory();
        store.ensure_taxonomy("ra_bedroom", "Bedrooms");
        let legacy = store.insert_term("ra_bedroom", "Bedroom").unwrap();
        let obj = store.upsert_record(RecordKind::Accommodation, None, "A");
        store.set_object_terms(obj, "ra_bedroom", &[legacy]);

        cleanup_legacy_bedroom_term(&mut store);
        assert!(!store.term_exists("ra_bedroom", legacy));
        assert!(store.object_terms(obj, "ra_bedroom").is_empty());

        // Flag set: a freshly created "Bedroom" term now survives.
        let again = store.insert_term("ra_bedroom", "Bedroom").unwrap();
        cleanup_legacy_bedroom_term(&mut store);
        assert!(store.term_exists("ra_bedroom", again));
    }

    #[test]
    fn attribute_registry_keeps_slugs_stable() {
        let mut store = Store::in_memory();
        let slug = ensure_attribute_taxonomy(&mut store, AttributeKind::Bedrooms);
        assert_eq!(slug, "ra_bedroom");
        assert!(store.find_record_by_slug(RecordKind::Attribute, "ra_bedroom").is_some());

        // A remapped registry entry wins over the default.
        store.set_option(
            OPT_ATTR_REGISTRY,
            serde_json::json!({"bedrooms": "ra_sleeping_rooms"}),
        );
        let slug = ensure_attribute_taxonomy(&mut store, AttributeKind::Bedrooms);
        assert_eq!(slug, "ra_sleeping_rooms");
    }
}
