//! Amenity catalog synchronizer.
//!
//! The agency-wide `/amenities` listing is the cheap path. Some accounts are
//! not allowed to call it without a property scope; those report a scope
//! error, and the sync falls back to walking every property and collecting
//! amenities per listing through a chain of endpoints.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::api::fetchers::{extract_list, fetch_properties, next_cursor};
use crate::api::RemoteApi;
use crate::config::{
    Settings, EP_AMENITIES, EP_AVAILABLE_AMENITIES, EP_CUSTOM_AMENITIES, MAX_CURSOR_PAGES,
    MAX_FALLBACK_CALLS, OPT_AMENITY_CACHE_PREFIX,
};
use crate::error::{AppError, AppResult};
use crate::logging::ImportLog;
use crate::resolve::prettify_amenity_code;
use crate::store::Store;

use super::mapper::ensure_amenity_term;

#[derive(Debug, Default, Serialize)]
pub struct CatalogReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub source: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemoteAmenity {
    pub(crate) uid: String,
    pub(crate) name: String,
}

impl RemoteAmenity {
    fn dedupe_key(&self) -> String {
        if self.uid.is_empty() {
            format!("name:{}", self.name.to_lowercase())
        } else {
            self.uid.clone()
        }
    }
}

/// Recognizes the "you may not list amenities agency-wide" refusal. The
/// wording varies across API revisions.
fn is_scope_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("hotel_or_property_uid_required")
        || (lower.contains("propertyuid") && lower.contains("hoteluid") && lower.contains("required"))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        _ => false,
    }
}

/// An enabled-amenities entry counts only when some channel flag is on.
fn has_enabled_channel(item: &Value) -> bool {
    match item.get("channels") {
        Some(Value::Object(map)) => map.values().any(truthy),
        Some(Value::Array(items)) => items.iter().any(|entry| match entry {
            Value::Object(map) => map.values().any(truthy),
            other => truthy(other),
        }),
        _ => item
            .as_object()
            .map(|map| {
                map.iter()
                    .any(|(key, value)| key.to_lowercase().contains("channel") && truthy(value))
            })
            .unwrap_or(false),
    }
}

fn parse_amenity_item(item: &Value, filter_channels: bool) -> Option<RemoteAmenity> {
    if filter_channels && !has_enabled_channel(item) {
        return None;
    }

    let uid = ["uid", "id", "amenityUid"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();

    let name = ["name", "label", "title", "amenityName"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            ["code", "amenityCode", "type"]
                .iter()
                .find_map(|key| item.get(*key).and_then(Value::as_str))
                .map(prettify_amenity_code)
                .filter(|s| !s.is_empty())
        })?;

    Some(RemoteAmenity { uid, name })
}

pub(crate) fn parse_amenity_list(body: &Value, filter_channels: bool) -> Vec<RemoteAmenity> {
    extract_list(body, &["amenities", "customAmenities", "data", "items"])
        .iter()
        .filter_map(|item| parse_amenity_item(item, filter_channels))
        .collect()
}

fn cache_key(property_uid: &str) -> String {
    format!("{OPT_AMENITY_CACHE_PREFIX}{property_uid}")
}

pub(crate) fn cached_amenities(
    store: &Store,
    property_uid: &str,
    max_age_hours: i64,
) -> Option<Vec<RemoteAmenity>> {
    let entry = store.option(&cache_key(property_uid))?;
    let fetched_at = entry.get("fetched_at").and_then(Value::as_i64)?;
    let age = chrono::Utc::now().timestamp() - fetched_at;
    if age < 0 || age >= max_age_hours * 3600 {
        return None;
    }
    let items = entry.get("items")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                Some(RemoteAmenity {
                    uid: item.get("uid")?.as_str()?.to_string(),
                    name: item.get("name")?.as_str()?.to_string(),
                })
            })
            .collect(),
    )
}

pub(crate) fn cache_amenities(store: &mut Store, property_uid: &str, amenities: &[RemoteAmenity]) {
    let items: Vec<Value> = amenities
        .iter()
        .map(|a| json!({"uid": a.uid, "name": a.name}))
        .collect();
    store.set_option(
        &cache_key(property_uid),
        json!({"fetched_at": chrono::Utc::now().timestamp(), "items": items}),
    );
}

/// Collects one listing's amenities through the endpoint chain. First
/// endpoint that responds with a non-empty list wins; failures just move the
/// chain along. Returns the amenities plus the number of API calls spent.
pub(crate) async fn fetch_property_amenities<R: RemoteApi>(
    api: &R,
    property_uid: &str,
    require_channel_flag: bool,
    log: &mut ImportLog,
) -> (Vec<RemoteAmenity>, usize) {
    let property_query = vec![("propertyUid".to_string(), property_uid.to_string())];
    let custom_query = vec![
        ("objectUid".to_string(), property_uid.to_string()),
        ("objectType".to_string(), "PROPERTY".to_string()),
    ];
    let chain: [(&str, &[(String, String)], bool); 3] = [
        (EP_AVAILABLE_AMENITIES, &property_query, require_channel_flag),
        (EP_AMENITIES, &property_query, false),
        (EP_CUSTOM_AMENITIES, &custom_query, false),
    ];

    let mut calls = 0;
    for (endpoint, query, filter_channels) in chain {
        calls += 1;
        match api.get(endpoint, query).await {
            Ok(response) => {
                let amenities = parse_amenity_list(&response.body, filter_channels);
                if !amenities.is_empty() {
                    return (amenities, calls);
                }
            }
            Err(e) => {
                log.debug(format!("{endpoint} for {property_uid} failed: {e}"));
            }
        }
    }
    (Vec::new(), calls)
}

async fn sync_agency_wide<R: RemoteApi>(
    api: &R,
    agency_uid: &str,
    page_limit: i64,
    log: &mut ImportLog,
) -> AppResult<Vec<RemoteAmenity>> {
    let mut amenities: Vec<RemoteAmenity> = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_CURSOR_PAGES {
        let mut query: Vec<(String, String)> = vec![("_limit".to_string(), page_limit.to_string())];
        if !agency_uid.is_empty() {
            query.push(("agencyUid".to_string(), agency_uid.to_string()));
        }
        if let Some(c) = &cursor {
            query.push(("_cursor".to_string(), c.clone()));
        }

        let response = api.get(EP_AMENITIES, &query).await?;
        let page_items = parse_amenity_list(&response.body, false);
        log.debug(format!("Amenity page {}: {} item(s)", page + 1, page_items.len()));
        if page_items.is_empty() {
            break;
        }
        amenities.extend(page_items);

        let next = next_cursor(&response);
        if next.is_none() || next == cursor {
            break;
        }
        cursor = next;
    }

    Ok(amenities)
}

async fn sync_per_property<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    log: &mut ImportLog,
) -> AppResult<Vec<RemoteAmenity>> {
    let properties = fetch_properties(api, &settings.agency_uid, settings.api_page_limit, log).await?;
    log.push(format!(
        "Scanning {} listing(s) for amenities",
        properties.len()
    ));

    let mut amenities: Vec<RemoteAmenity> = Vec::new();
    let mut calls = 0usize;

    for property in &properties {
        let Some(uid) = property.get("uid").and_then(Value::as_str) else {
            continue;
        };

        if let Some(cached) = cached_amenities(store, uid, settings.amenities_cache_hours) {
            amenities.extend(cached);
            continue;
        }

        if calls >= MAX_FALLBACK_CALLS {
            log.push("Per-listing call cap reached, stopping amenity scan");
            break;
        }

        let (found, spent) =
            fetch_property_amenities(api, uid, settings.require_channel_flag, log).await;
        calls += spent;
        cache_amenities(store, uid, &found);
        amenities.extend(found);
    }

    Ok(amenities)
}

/// Synchronizes the amenity catalog into local terms. Failures are folded
/// into the report instead of propagated, so a broken API never aborts a
/// bulk run that only wanted fresher amenity names.
pub async fn sync_catalog<R: RemoteApi>(
    api: &R,
    store: &mut Store,
    settings: &Settings,
    log: &mut ImportLog,
) -> AppResult<CatalogReport> {
    let mut report = CatalogReport {
        source: "agency".to_string(),
        ..CatalogReport::default()
    };

    log.push("Synchronizing amenity catalog");
    let amenities = match sync_agency_wide(api, &settings.agency_uid, settings.api_page_limit, log).await
    {
        Ok(amenities) => amenities,
        Err(AppError::Api { message, .. }) if is_scope_error(&message) => {
            log.push("Agency-wide amenity listing not permitted, falling back to per-listing scan");
            report.source = "per_property".to_string();
            match sync_per_property(api, store, settings, log).await {
                Ok(amenities) => amenities,
                Err(e) => {
                    log.push(format!("Amenity catalog sync failed: {e}"));
                    report.error = Some(e.to_string());
                    return Ok(report);
                }
            }
        }
        Err(e) => {
            log.push(format!("Amenity catalog sync failed: {e}"));
            report.error = Some(e.to_string());
            return Ok(report);
        }
    };

    let mut deduped: BTreeMap<String, RemoteAmenity> = BTreeMap::new();
    for amenity in amenities {
        deduped.entry(amenity.dedupe_key()).or_insert(amenity);
    }

    for amenity in deduped.values() {
        if let Some((_, created)) = ensure_amenity_term(store, &amenity.uid, &amenity.name, log)? {
            report.total += 1;
            if created {
                report.created += 1;
            } else {
                report.updated += 1;
            }
        }
    }

    log.push(format!(
        "Catalog sync done: {} amenities ({} new, {} existing)",
        report.total, report.created, report.updated
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::StubApi;
    use crate::config::TAX_AMENITY;

    fn settings() -> Settings {
        Settings {
            agency_uid: "agency-1".to_string(),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn agency_listing_dedupes_by_uid() {
        let api = StubApi::default().with_body(
            "/amenities",
            serde_json::json!({"amenities": [
                {"uid": "am-1", "name": "Pool"},
                {"uid": "am-1", "name": "Pool"},
                {"uid": "am-2", "code": "HAS_WIFI"},
            ]}),
        );
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let report = sync_catalog(&api, &mut store, &settings(), &mut log)
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.source, "agency");
        assert!(store.find_term_by_name(TAX_AMENITY, "WiFi").is_some());
    }

    #[tokio::test]
    async fn scope_error_switches_to_per_property_scan() {
        let api = StubApi::default()
            .with_error(
                "/amenities",
                AppError::api(400, "HOTEL_OR_PROPERTY_UID_REQUIRED"),
            )
            .with_body(
                "/properties",
                serde_json::json!({"properties": [{"uid": "p-1"}]}),
            )
            .with_body(
                "/available-amenities?p-1",
                serde_json::json!({"amenities": [
                    {"uid": "am-1", "name": "Pool", "channels": {"direct": true}},
                    {"uid": "am-2", "name": "Hidden", "channels": {"direct": false}},
                ]}),
            );
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let report = sync_catalog(&api, &mut store, &settings(), &mut log)
            .await
            .unwrap();
        assert_eq!(report.source, "per_property");
        assert_eq!(report.total, 1);
        assert!(store.find_term_by_name(TAX_AMENITY, "Pool").is_some());
        assert!(store.find_term_by_name(TAX_AMENITY, "Hidden").is_none());
    }

    #[tokio::test]
    async fn per_property_chain_falls_through_to_custom() {
        let api = StubApi::default()
            .with_error("/amenities", AppError::api(400, "propertyUid or hotelUid is required"))
            .with_body(
                "/properties",
                serde_json::json!({"properties": [{"uid": "p-1"}]}),
            )
            .with_error("/available-amenities?p-1", AppError::api(404, "not found"))
            .with_error("/amenities?p-1", AppError::api(404, "not found"))
            .with_body(
                "/custom-amenities?p-1",
                serde_json::json!([{"uid": "cx-1", "name": "Wine Cellar"}]),
            );
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let report = sync_catalog(&api, &mut store, &settings(), &mut log)
            .await
            .unwrap();
        assert_eq!(report.total, 1);
        assert!(store.find_term_by_name(TAX_AMENITY, "Wine Cellar").is_some());
    }

    #[tokio::test]
    async fn per_property_results_come_from_cache_when_fresh() {
        let api = StubApi::default()
            .with_error(
                "/amenities",
                AppError::api(400, "HOTEL_OR_PROPERTY_UID_REQUIRED"),
            )
            .with_body(
                "/properties",
                serde_json::json!({"properties": [{"uid": "p-1"}]}),
            );
        let mut store = Store::in_memory();
        store.set_option(
            &cache_key("p-1"),
            serde_json::json!({
                "fetched_at": chrono::Utc::now().timestamp(),
                "items": [{"uid": "am-9", "name": "Cached Sauna"}],
            }),
        );
        let mut log = ImportLog::new(false);

        let report = sync_catalog(&api, &mut store, &settings(), &mut log)
            .await
            .unwrap();
        assert_eq!(report.total, 1);
        assert!(store.find_term_by_name(TAX_AMENITY, "Cached Sauna").is_some());
        assert_eq!(api.call_count("/available-amenities?p-1"), 0);
    }

    #[tokio::test]
    async fn non_scope_failure_reports_instead_of_erroring() {
        let api = StubApi::default()
            .with_error("/amenities", AppError::api(500, "server exploded"));
        let mut store = Store::in_memory();
        let mut log = ImportLog::new(false);

        let report = sync_catalog(&api, &mut store, &settings(), &mut log)
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.error.is_some());
    }

    #[test]
    fn scope_error_wordings() {
        assert!(is_scope_error("HOTEL_OR_PROPERTY_UID_REQUIRED"));
        assert!(is_scope_error("propertyUid or hotelUid is required"));
        assert!(!is_scope_error("invalid api key"));
    }
}
