//! Imports one remote listing into the local booking content model.
//!
//! The import is idempotent: every created object carries a back-reference
//! to its remote UID (or a derived key) and is found again on the next run
//! instead of duplicated. Photo downloads are deduplicated through a
//! persisted photo map so re-imports never refetch unchanged images.

use serde_json::{json, Value};

use crate::api::fetchers::{fetch_photos, fetch_property_detail};
use crate::api::RemoteApi;
use crate::config::{
    Settings, EP_AMENITIES, EP_AVAILABLE_AMENITIES, EP_CUSTOM_AMENITIES, DEFAULT_OCCUPANCY,
    META_ADULTS, META_CHILDREN, META_CURRENCY, META_FEATURED_IMAGE, META_GALLERY, META_MAX_STAY,
    META_MIN_QUANTITY, META_MIN_STAY, META_PHOTO_MAP, META_PRICE, META_PRICE_PERIODICITY,
    META_PROPERTY_UID, META_ROOM_TYPE_ID, META_SEASON_DAYS, META_SEASON_END, META_SEASON_PRICES,
    META_SEASON_REPEAT, META_SEASON_START, META_SERVICES, META_SERVICE_KEY, TAX_AMENITY,
    TAX_CATEGORY, TAX_CATEGORY_LABEL, TAX_TAG, TAX_TAG_LABEL,
};
use crate::error::AppResult;
use crate::logging::ImportLog;
use crate::resolve::{find_number, find_string, prettify_amenity_code};
use crate::store::{RecordId, RecordKind, Store, TermId};

use super::catalog::{cache_amenities, cached_amenities, parse_amenity_list, RemoteAmenity};
use super::mapper::{ensure_amenity_term, import_attributes, upsert_terms};

#[derive(Debug, Clone, Copy)]
pub struct ImportOutcome {
    pub record: RecordId,
    pub created: bool,
}

pub fn find_imported_listing(store: &Store, uid: &str) -> Option<RecordId> {
    store.find_record_by_meta(RecordKind::Accommodation, META_PROPERTY_UID, uid)
}

fn listing_title(detail: &Value, uid: &str) -> String {
    find_string(detail, &[&["name"], &["title"], &["internalName"]])
        .unwrap_or_else(|| format!("Listing {uid}"))
}

fn round_price(value: f64) -> String {
    format!("{}", value.round() as i64)
}

/// Runs the full import for one listing UID. The listing record plus its
/// rate, unit, services, terms and media all end up consistent with the
/// remote payload; re-running updates in place.
pub async fn import_property<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    uid: &str,
    log: &mut ImportLog,
) -> AppResult<ImportOutcome> {
    log.push(format!("Fetching listing {uid}"));
    let detail = fetch_property_detail(api, uid).await?;

    let existing = find_imported_listing(store, uid);
    let created = existing.is_none();
    let title = listing_title(&detail, uid);
    let record = store.upsert_record(RecordKind::Accommodation, existing, &title);
    store.set_record_meta(record, META_PROPERTY_UID, json!(uid));
    log.push(format!(
        "{} listing \"{title}\"",
        if created { "Creating" } else { "Updating" }
    ));

    import_occupancy(store, record, &detail);
    import_pricing_meta(store, record, &detail);
    import_description(store, record, &detail);

    // Steps below are independently best-effort: one failing sub-import is
    // logged and the rest still run.
    match import_amenities(api, store, settings, uid, &detail, log).await {
        Ok(terms) => {
            store.set_object_terms(record, TAX_AMENITY, &terms);
            log.push(format!("Assigned {} amenity term(s)", terms.len()));
        }
        Err(e) => log.push(format!("Amenity import failed: {e}")),
    }
    if let Err(e) = import_categories_and_tags(store, record, &detail, log) {
        log.push(format!("Category/tag import failed: {e}"));
    }
    if let Err(e) = import_attributes(store, record, &detail, log) {
        log.push(format!("Attribute import failed: {e}"));
    }
    if let Err(e) = import_services(store, record, uid, &detail, log) {
        log.push(format!("Service import failed: {e}"));
    }
    import_media(api, store, settings, record, uid, &detail, log).await;

    let rate = import_rate(store, record, uid, &title, &detail, log)?;
    log.debug(format!("Rate record {rate}"));
    let unit = import_unit(store, record, uid, &title);
    log.debug(format!("Unit record {unit}"));

    log.push(format!(
        "Listing {uid} {}",
        if created { "created" } else { "updated" }
    ));
    Ok(ImportOutcome { record, created })
}

fn import_occupancy(store: &mut Store, record: RecordId, detail: &Value) {
    let adults = find_number(
        detail,
        &[
            &["availability", "maxGuests"],
            &["maxGuests"],
            &["baseGuests"],
        ],
    )
    .map(|n| n as i64)
    .filter(|n| *n > 0)
    .unwrap_or(DEFAULT_OCCUPANCY);
    store.set_record_meta(record, META_ADULTS, json!(adults));
    store.set_record_meta(record, META_CHILDREN, json!(0));
}

fn import_pricing_meta(store: &mut Store, record: RecordId, detail: &Value) {
    // A listing with no resolvable nightly price still gets an explicit "0".
    let price = base_price(detail).unwrap_or(0.0);
    store.set_record_meta(record, META_PRICE, json!(round_price(price)));
    if let Some(min) = find_number(detail, &[&["minimumStay"], &["availability", "minimumStay"]]) {
        if min > 0.0 {
            store.set_record_meta(record, META_MIN_STAY, json!(min as i64));
        }
    }
    if let Some(max) = find_number(detail, &[&["maximumStay"], &["availability", "maximumStay"]]) {
        if max > 0.0 {
            store.set_record_meta(record, META_MAX_STAY, json!(max as i64));
        }
    }
}

fn base_price(detail: &Value) -> Option<f64> {
    find_number(
        detail,
        &[
            &["baseDailyRate"],
            &["basePrice"],
            &["dailyRate"],
            &["pricing", "dailyRate"],
            &["pricing", "baseDailyRate"],
            &["pricing", "basePrice"],
        ],
    )
    .filter(|n| *n > 0.0)
}

/// Body text comes from the remote description when present, otherwise a
/// short factual summary is synthesized so listings never render empty.
fn import_description(store: &mut Store, record: RecordId, detail: &Value) {
    let description = find_string(
        detail,
        &[
            &["description"],
            &["summary"],
            &["publicDescription", "summary"],
            &["shortDescription"],
        ],
    );

    let body = match description {
        Some(text) => text,
        None => {
            let mut parts: Vec<String> = Vec::new();
            if let Some(listing_type) = find_string(detail, &[&["listingType"], &["roomType"]]) {
                parts.push(listing_type);
            }
            if let Some(property_type) = find_string(detail, &[&["propertyType"], &["type"]]) {
                if !parts.contains(&property_type) {
                    parts.push(property_type);
                }
            }
            let mut body = parts.join(" \u{2022} ");
            let city = find_string(detail, &[&["address", "city"], &["city"]]);
            let state = find_string(detail, &[&["address", "state"], &["state"]]);
            let location = match (city, state) {
                (Some(c), Some(s)) => Some(format!("{c}, {s}")),
                (Some(c), None) => Some(c),
                (None, Some(s)) => Some(s),
                (None, None) => None,
            };
            if let Some(location) = location {
                if !body.is_empty() {
                    body.push_str("\n\n");
                }
                body.push_str(&format!("Location: {location}"));
            }
            body
        }
    };

    store.set_record_body(record, &body);
}

const PAYLOAD_AMENITY_KEYS: [&str; 5] =
    ["amenities", "amenity", "features", "amenityUids", "amenitiesUids"];

fn looks_like_code(value: &str) -> bool {
    value.contains('_')
        || (value.chars().any(|c| c.is_ascii_uppercase())
            && value.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
}

fn looks_like_uid(value: &str) -> bool {
    value.len() >= 16
        && value.contains('-')
        && value
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-')
}

fn payload_amenities(detail: &Value) -> Vec<RemoteAmenity> {
    let mut amenities = Vec::new();
    for key in PAYLOAD_AMENITY_KEYS {
        let Some(items) = detail.get(key).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            match item {
                Value::String(s) => {
                    let s = s.trim();
                    if s.is_empty() {
                        continue;
                    }
                    if looks_like_code(s) {
                        amenities.push(RemoteAmenity {
                            uid: String::new(),
                            name: prettify_amenity_code(s),
                        });
                    } else if looks_like_uid(s) {
                        // Bare UID. The name is unknown here; the catalog
                        // dictionary resolves it, or it gets skipped.
                        amenities.push(RemoteAmenity {
                            uid: s.to_string(),
                            name: String::new(),
                        });
                    } else {
                        // A plain display name like "Pool".
                        amenities.push(RemoteAmenity {
                            uid: String::new(),
                            name: s.to_string(),
                        });
                    }
                }
                Value::Object(map) => {
                    let uid = ["uid", "id", "amenityUid"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_str))
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    let name = ["name", "label", "title"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_str))
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .or_else(|| {
                            ["code", "amenityCode", "type"]
                                .iter()
                                .find_map(|k| map.get(*k).and_then(Value::as_str))
                                .map(prettify_amenity_code)
                        })
                        .unwrap_or_default();
                    if !uid.is_empty() || !name.is_empty() {
                        amenities.push(RemoteAmenity { uid, name });
                    }
                }
                _ => {}
            }
        }
        if !amenities.is_empty() {
            break;
        }
    }
    amenities
}

/// Amenities from the listing payload itself win. When the payload has
/// none and API enrichment is enabled, the per-listing endpoints are asked,
/// with a cache in front so bulk runs do not hammer them.
async fn import_amenities<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    uid: &str,
    detail: &Value,
    log: &mut ImportLog,
) -> AppResult<Vec<TermId>> {
    let mut amenities = payload_amenities(detail);

    if amenities.is_empty() && settings.allow_enrich_api {
        amenities = match cached_amenities(store, uid, settings.amenities_cache_hours) {
            Some(cached) => {
                log.debug(format!("Amenities for {uid} served from cache"));
                cached
            }
            None => {
                let fetched = enrich_amenities(api, uid, settings, log).await;
                cache_amenities(store, uid, &fetched);
                fetched
            }
        };
    }

    let mut terms = Vec::new();
    for amenity in &amenities {
        let term = if amenity.name.is_empty() {
            // UID-only entry: resolvable only through the catalog dictionary.
            match ensure_known_amenity(store, &amenity.uid) {
                Some(term) => Some((term, false)),
                None => {
                    log.debug(format!("Unknown amenity UID {} skipped", amenity.uid));
                    None
                }
            }
        } else {
            ensure_amenity_term(store, &amenity.uid, &amenity.name, log)?
        };
        if let Some((term, _)) = term {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
    }
    Ok(terms)
}

fn ensure_known_amenity(store: &Store, uid: &str) -> Option<TermId> {
    store
        .find_term_by_meta(TAX_AMENITY, crate::config::META_AMENITY_UID, uid)
        .filter(|term| store.term_exists(TAX_AMENITY, *term))
}

async fn enrich_amenities<R: RemoteApi>(
    api: &R,
    uid: &str,
    settings: &Settings,
    log: &mut ImportLog,
) -> Vec<RemoteAmenity> {
    let property_query = vec![("propertyUid".to_string(), uid.to_string())];
    let custom_query = vec![
        ("objectUid".to_string(), uid.to_string()),
        ("objectType".to_string(), "PROPERTY".to_string()),
    ];
    let chain: [(&str, &[(String, String)], bool); 3] = [
        (EP_AMENITIES, &property_query, false),
        (EP_CUSTOM_AMENITIES, &custom_query, false),
        (EP_AVAILABLE_AMENITIES, &property_query, settings.require_channel_flag),
    ];

    for (endpoint, query, filter_channels) in chain {
        match api.get(endpoint, query).await {
            Ok(response) => {
                let amenities = parse_amenity_list(&response.body, filter_channels);
                if !amenities.is_empty() {
                    return amenities;
                }
            }
            Err(e) => log.debug(format!("{endpoint} for {uid} failed: {e}")),
        }
    }
    Vec::new()
}

fn import_categories_and_tags(
    store: &mut Store,
    record: RecordId,
    detail: &Value,
    log: &mut ImportLog,
) -> AppResult<()> {
    if let Some(property_type) = find_string(detail, &[&["propertyType"], &["type"]]) {
        let terms = upsert_terms(store, TAX_CATEGORY, TAX_CATEGORY_LABEL, &[property_type], log)?;
        store.set_object_terms(record, TAX_CATEGORY, &terms);
    }

    let mut tags: Vec<String> = Vec::new();
    for paths in [
        [["roomType"].as_slice(), ["availability", "roomType"].as_slice()],
        [["listingType"].as_slice(), ["category"].as_slice()],
        [["address", "city"].as_slice(), ["city"].as_slice()],
        [["address", "state"].as_slice(), ["state"].as_slice()],
    ] {
        if let Some(tag) = find_string(detail, &paths) {
            tags.push(tag);
        }
    }
    if !tags.is_empty() {
        let terms = upsert_terms(store, TAX_TAG, TAX_TAG_LABEL, &tags, log)?;
        store.set_object_terms(record, TAX_TAG, &terms);
    }
    Ok(())
}

const SERVICE_FEES: [(&str, &str); 3] = [
    ("cleaningFee", "Cleaning Fee"),
    ("securityDeposit", "Security Deposit"),
    ("extraGuestFee", "Extra Guest Fee"),
];

/// Monetary extras become bookable service records, one per fee kind, keyed
/// by listing UID plus fee name so re-imports update rather than duplicate.
fn import_services(
    store: &mut Store,
    record: RecordId,
    uid: &str,
    detail: &Value,
    log: &mut ImportLog,
) -> AppResult<()> {
    let mut service_ids: Vec<RecordId> = Vec::new();

    for (fee_key, title) in SERVICE_FEES {
        let amount = find_number(
            detail,
            &[&[fee_key], &["pricing", fee_key], &["fees", fee_key]],
        );
        let Some(amount) = amount.filter(|n| *n > 0.0) else {
            continue;
        };

        let service_key = format!("{uid}:{fee_key}");
        let existing = store.find_record_by_meta(RecordKind::Service, META_SERVICE_KEY, &service_key);
        let service = store.upsert_record(RecordKind::Service, existing, title);
        store.set_record_meta(service, META_SERVICE_KEY, json!(service_key));
        store.set_record_meta(service, META_PRICE, json!(round_price(amount)));
        store.set_record_meta(service, META_PRICE_PERIODICITY, json!("once"));
        store.set_record_meta(service, META_MIN_QUANTITY, json!("1"));
        service_ids.push(service);
        log.debug(format!("Service {title}: {}", round_price(amount)));
    }

    if !service_ids.is_empty() {
        store.set_record_meta(record, META_SERVICES, json!(service_ids));
    }
    Ok(())
}

fn file_name_for(url: &str, uid: &str, index: usize) -> String {
    url.split('?')
        .next()
        .and_then(|clean| clean.rsplit('/').next())
        .filter(|name| !name.is_empty() && name.contains('.'))
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("{uid}-{index}.jpg"))
}

/// Downloads the gallery (and a featured image) for a listing. Previously
/// downloaded photos are reused via the persisted photo map; the map is
/// written back even when individual downloads fail.
async fn import_media<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    record: RecordId,
    uid: &str,
    detail: &Value,
    log: &mut ImportLog,
) {
    let mut photo_map: serde_json::Map<String, Value> =
        match store.record_meta(record, META_PHOTO_MAP) {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

    let mut featured: Option<RecordId> = None;
    if let Some(url) = find_string(detail, &[&["pictureLink"], &["picture"], &["thumbnailUrl"]]) {
        featured = attach_photo(api, store, &mut photo_map, &url, &url, uid, 0, log).await;
    }

    let mut gallery: Vec<RecordId> = Vec::new();
    match fetch_photos(api, uid).await {
        Ok(photos) => {
            // The cap counts photos actually attached, so entries without a
            // usable URL or with a failed download do not burn a slot.
            for (index, photo) in photos.iter().enumerate() {
                if gallery.len() >= settings.max_photos {
                    break;
                }
                let Some(url) = photo.best_url() else { continue };
                let url = url.to_string();
                // Map key is the remote photo UID so a changed CDN URL does
                // not force a re-download of the same photo.
                let map_key = photo.uid.clone().unwrap_or_else(|| url.clone());
                if let Some(id) =
                    attach_photo(api, store, &mut photo_map, &map_key, &url, uid, index + 1, log)
                        .await
                {
                    if !gallery.contains(&id) {
                        gallery.push(id);
                    }
                }
            }
        }
        Err(e) => log.push(format!("Photo listing for {uid} failed: {e}")),
    }

    store.set_record_meta(record, META_PHOTO_MAP, Value::Object(photo_map));
    if !gallery.is_empty() {
        store.set_record_meta(record, META_GALLERY, json!(gallery));
    }
    if featured.is_none() {
        featured = gallery.first().copied();
    }
    if let Some(featured) = featured {
        store.set_record_meta(record, META_FEATURED_IMAGE, json!(featured));
    }
    log.push(format!("Gallery: {} image(s)", gallery.len()));
}

#[allow(clippy::too_many_arguments)]
async fn attach_photo<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    photo_map: &mut serde_json::Map<String, Value>,
    map_key: &str,
    url: &str,
    uid: &str,
    index: usize,
    log: &mut ImportLog,
) -> Option<RecordId> {
    if let Some(id) = photo_map.get(map_key).and_then(Value::as_u64) {
        if store.attachment(id).is_some() {
            return Some(id);
        }
    }

    let bytes = match api.download(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log.push(format!("Download failed for {url}: {e}"));
            return None;
        }
    };
    let file_name = file_name_for(url, uid, index);
    match store.attach_media(&file_name, url, &bytes) {
        Ok(id) => {
            photo_map.insert(map_key.to_string(), json!(id));
            Some(id)
        }
        Err(e) => {
            log.push(format!("Storing {file_name} failed: {e}"));
            None
        }
    }
}

fn find_default_season(store: &mut Store) -> RecordId {
    let existing = store
        .record_ids(RecordKind::Season)
        .into_iter()
        .find(|id| store.record(*id).is_some_and(|r| r.title == "All Year"));
    if let Some(id) = existing {
        return id;
    }

    let season = store.upsert_record(RecordKind::Season, None, "All Year");
    let year = chrono::Utc::now().format("%Y");
    store.set_record_meta(season, META_SEASON_START, json!(format!("{year}-01-01")));
    store.set_record_meta(season, META_SEASON_END, json!(format!("{year}-12-31")));
    store.set_record_meta(season, META_SEASON_REPEAT, json!("annually"));
    store.set_record_meta(season, META_SEASON_DAYS, json!([0, 1, 2, 3, 4, 5, 6]));
    season
}

/// One standard rate per listing, priced for the shared "All Year" season.
fn import_rate(
    store: &mut Store,
    record: RecordId,
    uid: &str,
    title: &str,
    detail: &Value,
    log: &mut ImportLog,
) -> AppResult<RecordId> {
    let existing = store.find_record_by_meta(RecordKind::Rate, META_PROPERTY_UID, uid);
    let rate = store.upsert_record(RecordKind::Rate, existing, &format!("Standard \u{2013} {title}"));
    store.set_record_meta(rate, META_PROPERTY_UID, json!(uid));
    store.set_record_meta(rate, META_ROOM_TYPE_ID, json!(record));

    let currency = find_string(
        detail,
        &[&["baseCurrency"], &["currency"], &["pricing", "currency"]],
    )
    .unwrap_or_else(|| "ZAR".to_string());
    store.set_record_meta(rate, META_CURRENCY, json!(currency));

    if let Some(price) = base_price(detail) {
        let season = find_default_season(store);
        upsert_season_price(store, rate, season, &round_price(price));
        log.debug(format!("Season price {} {currency}", round_price(price)));
    }
    Ok(rate)
}

fn upsert_season_price(store: &mut Store, rate: RecordId, season: RecordId, price: &str) {
    let mut rows: Vec<Value> = match store.record_meta(rate, META_SEASON_PRICES) {
        Some(Value::Array(rows)) => rows.clone(),
        _ => Vec::new(),
    };
    let row = json!({"season": season, "price": price});
    match rows
        .iter_mut()
        .find(|r| r.get("season").and_then(Value::as_u64) == Some(season))
    {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
    store.set_record_meta(rate, META_SEASON_PRICES, Value::Array(rows));
}

fn import_unit(store: &mut Store, record: RecordId, uid: &str, title: &str) -> RecordId {
    let existing = store.find_record_by_meta(RecordKind::Unit, META_PROPERTY_UID, uid);
    let unit = store.upsert_record(RecordKind::Unit, existing, &format!("Unit 1 \u{2013} {title}"));
    store.set_record_meta(unit, META_PROPERTY_UID, json!(uid));
    store.set_record_meta(unit, META_ROOM_TYPE_ID, json!(record));
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::StubApi;

    fn beach_house_api() -> StubApi {
        StubApi::default()
            .with_body(
                "/properties/p-1",
                serde_json::json!({"property": {
                    "uid": "p-1",
                    "name": "Beach House",
                    "propertyType": "House",
                    "address": {"city": "Cape Town", "state": "Western Cape"},
                    "availability": {"maxGuests": 4},
                    "bedrooms": 2,
                    "bathrooms": 1,
                    "pricing": {"dailyRate": 150.4},
                    "baseCurrency": "ZAR",
                    "minimumStay": 2,
                    "cleaningFee": 25,
                    "amenities": [{"uid": "am-1", "name": "Pool"}, {"code": "HAS_WIFI"}],
                    "pictureLink": "https://cdn.example/featured.jpg",
                }}),
            )
            .with_body(
                "/photos?p-1",
                serde_json::json!({"photos": [
                    {"uid": "ph-2", "displayOrder": 2, "largeScaleImageUrl": "https://cdn.example/2.jpg"},
                    {"uid": "ph-1", "displayOrder": 1, "largeScaleImageUrl": "https://cdn.example/1.jpg"},
                ]}),
            )
    }

    #[tokio::test]
    async fn full_import_builds_the_listing() {
        let api = beach_house_api();
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);
        let settings = Settings::default();

        let outcome = import_property(&api, &mut store, &settings, "p-1", &mut log)
            .await
            .unwrap();
        assert!(outcome.created);

        let record = outcome.record;
        assert_eq!(
            store.record(record).map(|r| r.title.clone()),
            Some("Beach House".to_string())
        );
        assert_eq!(store.record_meta(record, META_ADULTS), Some(&json!(4)));
        assert_eq!(store.record_meta(record, META_CHILDREN), Some(&json!(0)));
        assert_eq!(store.record_meta(record, META_PRICE), Some(&json!("150")));
        assert_eq!(store.record_meta(record, META_MIN_STAY), Some(&json!(2)));
        assert!(store.record_meta(record, META_MAX_STAY).is_none());

        // Amenities from the payload, no enrichment call needed.
        assert_eq!(store.object_terms(record, TAX_AMENITY).len(), 2);
        assert!(store.find_term_by_name(TAX_AMENITY, "WiFi").is_some());
        assert_eq!(api.call_count("/amenities?p-1"), 0);

        // Category, tags, attributes.
        assert_eq!(store.object_terms(record, TAX_CATEGORY).len(), 1);
        assert!(store.find_term_by_name(TAX_TAG, "Cape Town").is_some());
        assert!(store.find_term_by_name("ra_bedroom", "2").is_some());

        // Cleaning fee became a service.
        let services = store.record_meta(record, META_SERVICES).unwrap();
        assert_eq!(services.as_array().map(Vec::len), Some(1));

        // Gallery ordered by display order, featured from pictureLink.
        let gallery = store.record_meta(record, META_GALLERY).unwrap();
        assert_eq!(gallery.as_array().map(Vec::len), Some(2));
        let featured = store
            .record_meta(record, META_FEATURED_IMAGE)
            .and_then(Value::as_u64)
            .unwrap();
        assert_eq!(
            store.attachment(featured).map(|a| a.source_url.clone()),
            Some("https://cdn.example/featured.jpg".to_string())
        );

        // Rate wired to the listing with an all-year season price.
        let rate = store
            .find_record_by_meta(RecordKind::Rate, META_PROPERTY_UID, "p-1")
            .unwrap();
        assert_eq!(
            store.record(rate).map(|r| r.title.clone()),
            Some("Standard \u{2013} Beach House".to_string())
        );
        let rows = store.record_meta(rate, META_SEASON_PRICES).unwrap();
        assert_eq!(rows[0]["price"], json!("150"));

        let unit = store
            .find_record_by_meta(RecordKind::Unit, META_PROPERTY_UID, "p-1")
            .unwrap();
        assert_eq!(
            store.record_meta(unit, META_ROOM_TYPE_ID),
            Some(&json!(record))
        );
    }

    #[tokio::test]
    async fn second_import_updates_in_place_and_skips_downloads() {
        let api = beach_house_api();
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);
        let settings = Settings::default();

        let first = import_property(&api, &mut store, &settings, "p-1", &mut log)
            .await
            .unwrap();
        let downloads_after_first = api
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("download"))
            .count();

        let second = import_property(&api, &mut store, &settings, "p-1", &mut log)
            .await
            .unwrap();
        assert_eq!(first.record, second.record);
        assert!(!second.created);
        assert_eq!(store.record_ids(RecordKind::Accommodation).len(), 1);
        assert_eq!(store.record_ids(RecordKind::Rate).len(), 1);
        assert_eq!(store.record_ids(RecordKind::Unit).len(), 1);
        assert_eq!(store.record_ids(RecordKind::Season).len(), 1);
        assert_eq!(store.record_ids(RecordKind::Service).len(), 1);

        // Photo map reuse: nothing downloaded the second time.
        let downloads_after_second = api
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("download"))
            .count();
        assert_eq!(downloads_after_first, downloads_after_second);
    }

    #[tokio::test]
    async fn description_synthesized_when_remote_has_none() {
        let api = StubApi::default()
            .with_body(
                "/properties/p-2",
                serde_json::json!({
                    "uid": "p-2",
                    "name": "Bare Flat",
                    "listingType": "Entire place",
                    "propertyType": "Apartment",
                    "maxGuests": 2,
                    "address": {"city": "Durban"},
                }),
            )
            .with_body("/photos?p-2", serde_json::json!({"photos": []}));
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let outcome = import_property(&api, &mut store, &Settings::default(), "p-2", &mut log)
            .await
            .unwrap();
        let body = store.record(outcome.record).unwrap().body.clone();
        assert_eq!(body, "Entire place \u{2022} Apartment\n\nLocation: Durban");
        // No resolvable nightly price still yields an explicit zero.
        assert_eq!(store.record_meta(outcome.record, META_PRICE), Some(&json!("0")));
    }

    #[tokio::test]
    async fn plain_string_amenities_become_named_terms() {
        let api = StubApi::default()
            .with_body(
                "/properties/p-6",
                serde_json::json!({
                    "uid": "p-6",
                    "name": "Name Soup",
                    "amenities": ["Pool", "Gym", "HAS_WIFI"],
                }),
            )
            .with_body("/photos?p-6", serde_json::json!({"photos": []}));
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let outcome = import_property(&api, &mut store, &Settings::default(), "p-6", &mut log)
            .await
            .unwrap();
        assert_eq!(store.object_terms(outcome.record, TAX_AMENITY).len(), 3);
        assert!(store.find_term_by_name(TAX_AMENITY, "Pool").is_some());
        assert!(store.find_term_by_name(TAX_AMENITY, "Gym").is_some());
        assert!(store.find_term_by_name(TAX_AMENITY, "WiFi").is_some());
        // A bare UUID without a catalog entry is the only shape skipped.
        assert!(looks_like_uid("3f6c1a2b-9d4e-4f08-b1c2-aa00bb11cc22"));
        assert!(!looks_like_uid("Pool"));
    }

    #[tokio::test]
    async fn gallery_cap_counts_attached_photos_only() {
        let api = StubApi::default()
            .with_body(
                "/properties/p-7",
                serde_json::json!({"uid": "p-7", "name": "One Photo"}),
            )
            .with_body(
                "/photos?p-7",
                serde_json::json!({"photos": [
                    {"uid": "ph-a", "displayOrder": 1},
                    {"uid": "ph-b", "displayOrder": 2, "largeScaleImageUrl": "https://cdn.example/b.jpg"},
                ]}),
            );
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);
        let settings = Settings {
            max_photos: 1,
            ..Settings::default()
        };

        let outcome = import_property(&api, &mut store, &settings, "p-7", &mut log)
            .await
            .unwrap();
        // The URL-less first photo does not burn the single slot.
        let gallery = store.record_meta(outcome.record, META_GALLERY).unwrap();
        assert_eq!(gallery.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn enrichment_runs_only_when_enabled_and_payload_empty() {
        let api = StubApi::default()
            .with_body(
                "/properties/p-3",
                serde_json::json!({"uid": "p-3", "name": "No Amenities"}),
            )
            .with_body("/photos?p-3", serde_json::json!({"photos": []}))
            .with_body(
                "/amenities?p-3",
                serde_json::json!({"amenities": [{"uid": "am-7", "name": "Braai"}]}),
            );
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let settings = Settings::default();
        import_property(&api, &mut store, &settings, "p-3", &mut log)
            .await
            .unwrap();
        assert_eq!(api.call_count("/amenities?p-3"), 0);

        let settings = Settings {
            allow_enrich_api: true,
            ..Settings::default()
        };
        let outcome = import_property(&api, &mut store, &settings, "p-3", &mut log)
            .await
            .unwrap();
        assert_eq!(api.call_count("/amenities?p-3"), 1);
        assert_eq!(store.object_terms(outcome.record, TAX_AMENITY).len(), 1);

        // Third run hits the cache.
        import_property(&api, &mut store, &settings, "p-3", &mut log)
            .await
            .unwrap();
        assert_eq!(api.call_count("/amenities?p-3"), 1);
    }

    #[tokio::test]
    async fn photo_failure_does_not_abort_import() {
        let api = StubApi::default()
            .with_body(
                "/properties/p-4",
                serde_json::json!({"uid": "p-4", "name": "No Photos"}),
            )
            .with_error("/photos?p-4", crate::error::AppError::api(500, "boom"));
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let outcome = import_property(&api, &mut store, &Settings::default(), "p-4", &mut log)
            .await
            .unwrap();
        assert!(store.record_meta(outcome.record, META_GALLERY).is_none());
    }
}
