//! Cursor-paginated listing fetches shared by the catalog synchronizer and
//! the importer.

use serde_json::Value;

use crate::config::{CURSOR_BODY_POINTERS, CURSOR_HEADER_KEYS, EP_PHOTOS, EP_PROPERTIES, MAX_CURSOR_PAGES};
use crate::error::{AppError, AppResult};
use crate::logging::ImportLog;

use super::model::ApiPhoto;
use super::{ApiResponse, RemoteApi};

/// Pulls the next-page cursor out of a response, headers first.
pub fn next_cursor(response: &ApiResponse) -> Option<String> {
    for key in CURSOR_HEADER_KEYS {
        if let Some(value) = response.headers.get(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    for pointer in CURSOR_BODY_POINTERS {
        if let Some(Value::String(s)) = response.body.pointer(pointer) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Unwraps a list out of a response body: either the body itself is an array
/// or it sits under one of the given wrapper keys.
pub fn extract_list(body: &Value, keys: &[&str]) -> Vec<Value> {
    if let Some(items) = body.as_array() {
        return items.clone();
    }
    for key in keys {
        if let Some(items) = body.get(*key).and_then(Value::as_array) {
            return items.clone();
        }
    }
    Vec::new()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Fetches the full agency property list, following cursors until the API
/// stops handing them out. Duplicate UIDs across pages are collapsed. Any
/// page failure aborts the whole fetch so a partial list is never mistaken
/// for the complete catalog.
pub async fn fetch_properties<R: RemoteApi>(
    api: &R,
    agency_uid: &str,
    page_limit: i64,
    log: &mut ImportLog,
) -> AppResult<Vec<Value>> {
    let mut properties: Vec<Value> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_CURSOR_PAGES {
        let mut query: Vec<(String, String)> = vec![("_limit".to_string(), page_limit.to_string())];
        if !agency_uid.is_empty() {
            query.push(("agencyUid".to_string(), agency_uid.to_string()));
        }
        if let Some(c) = &cursor {
            query.push(("_cursor".to_string(), c.clone()));
        }

        let response = api.get(EP_PROPERTIES, &query).await?;
        let items = extract_list(&response.body, &["properties", "data", "items", "results"]);
        log.debug(format!("Properties page {}: {} item(s)", page + 1, items.len()));

        if items.is_empty() {
            break;
        }
        for item in items {
            match string_field(&item, "uid") {
                Some(uid) if !seen.contains(&uid) => {
                    seen.push(uid);
                    properties.push(item);
                }
                _ => {}
            }
        }

        let next = next_cursor(&response);
        // An empty or repeating cursor ends the walk.
        if next.is_none() || next == cursor {
            break;
        }
        cursor = next;
    }

    Ok(properties)
}

/// Fetches the detail payload for one listing. Unwraps a `property` envelope
/// when the API uses one.
pub async fn fetch_property_detail<R: RemoteApi>(api: &R, uid: &str) -> AppResult<Value> {
    let path = format!("{EP_PROPERTIES}/{uid}");
    let response = api.get(&path, &[]).await?;
    let detail = match response.body.get("property") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => response.body,
    };
    let has_uid = detail
        .get("uid")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !detail.is_object() || !has_uid {
        return Err(AppError::ResponseInvalid(format!(
            "listing detail for {uid} has no usable uid"
        )));
    }
    Ok(detail)
}

pub async fn fetch_photos<R: RemoteApi>(api: &R, property_uid: &str) -> AppResult<Vec<ApiPhoto>> {
    let query = vec![("propertyUid".to_string(), property_uid.to_string())];
    let response = api.get(EP_PHOTOS, &query).await?;
    let items = extract_list(&response.body, &["photos", "data", "items"]);
    let mut photos: Vec<ApiPhoto> = Vec::with_capacity(items.len());
    for item in items {
        if let Ok(photo) = serde_json::from_value::<ApiPhoto>(item) {
            photos.push(photo);
        }
    }
    photos.sort_by_key(|p| p.display_order);
    Ok(photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::StubApi;
    use crate::error::AppError;
    use serde_json::json;

    #[tokio::test]
    async fn property_pages_follow_body_cursor_and_dedupe() {
        let api = StubApi::default().with_body(
            "/properties",
            json!({
                "properties": [{"uid": "p-1"}, {"uid": "p-2"}, {"uid": "p-1"}],
            }),
        );
        let mut log = ImportLog::new(false);
        let properties = fetch_properties(&api, "agency-1", 100, &mut log)
            .await
            .unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(api.call_count("/properties"), 1);
    }

    #[tokio::test]
    async fn property_fetch_fails_closed() {
        let api = StubApi::default()
            .with_error("/properties", AppError::api(500, "server exploded"));
        let mut log = ImportLog::new(false);
        let result = fetch_properties(&api, "agency-1", 100, &mut log).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn detail_unwraps_property_envelope() {
        let api = StubApi::default()
            .with_body("/properties/p-1", json!({"property": {"uid": "p-1", "name": "A"}}));
        let detail = fetch_property_detail(&api, "p-1").await.unwrap();
        assert_eq!(detail["name"], json!("A"));
    }

    #[tokio::test]
    async fn photos_sorted_by_display_order() {
        let api = StubApi::default().with_body(
            "/photos?p-1",
            json!({"photos": [
                {"uid": "b", "displayOrder": 2, "originalImageUrl": "https://x/b.jpg"},
                {"uid": "a", "displayOrder": 1, "originalImageUrl": "https://x/a.jpg"},
            ]}),
        );
        let photos = fetch_photos(&api, "p-1").await.unwrap();
        let uids: Vec<_> = photos.iter().filter_map(|p| p.uid.as_deref()).collect();
        assert_eq!(uids, vec!["a", "b"]);
    }

    #[test]
    fn cursor_header_beats_body() {
        let mut response = ApiResponse::new(json!({"nextCursor": "body-cursor"}));
        response
            .headers
            .insert("x-next-cursor".to_string(), "header-cursor".to_string());
        assert_eq!(next_cursor(&response), Some("header-cursor".to_string()));

        let body_only = ApiResponse::new(json!({"pagination": {"nextCursor": "deep"}}));
        assert_eq!(next_cursor(&body_only), Some("deep".to_string()));

        let blank = ApiResponse::new(json!({"nextCursor": "  "}));
        assert_eq!(next_cursor(&blank), None);
    }
}
