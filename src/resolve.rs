//! Tolerant extraction from remote listing payloads. Hostfully moves fields
//! around between API revisions, so every logical field is resolved through an
//! ordered list of candidate paths and the first hit wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\d+(?:\.\d+)?").unwrap_or_else(|e| panic!("invalid number regex: {e}"))
});

/// Walks `data` down a path of object keys. Any non-object intermediate or
/// missing key short-circuits to `None`.
pub fn value_at_path<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = data;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Coerces a scalar to a number. Strings go through a digit-run scan so
/// values like `"120 m2"` or `"about 3 beds"` still resolve.
pub fn extract_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(n) = trimmed.parse::<f64>() {
                return Some(n);
            }
            NUMBER_RE
                .find(trimmed)
                .and_then(|m| m.as_str().parse::<f64>().ok())
        }
        _ => None,
    }
}

/// First candidate path that resolves to a usable number wins.
pub fn find_number(data: &Value, paths: &[&[&str]]) -> Option<f64> {
    for path in paths {
        if let Some(v) = value_at_path(data, path) {
            if let Some(n) = extract_number(v) {
                return Some(n);
            }
        }
    }
    None
}

/// First candidate path that resolves to a non-empty string wins. Plain
/// numbers are accepted and rendered, since several fields flip between the
/// two representations.
pub fn find_string(data: &Value, paths: &[&[&str]]) -> Option<String> {
    for path in paths {
        match value_at_path(data, path) {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

const SUM_KEYS: [&str; 7] = ["count", "quantity", "number", "bedCount", "beds", "amount", "qty"];

/// Sums per-item counts out of an array of objects (e.g. a bed inventory).
/// Scalar array entries count as themselves; objects contribute their first
/// recognized count key, defaulting to 1 when none is present.
pub fn sum_numeric_array(value: &Value) -> Option<f64> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for item in items {
        match item {
            Value::Object(map) => {
                let mut found = None;
                for key in SUM_KEYS {
                    if let Some(n) = map.get(key).and_then(extract_number) {
                        found = Some(n);
                        break;
                    }
                }
                total += found.unwrap_or(1.0);
            }
            other => {
                if let Some(n) = extract_number(other) {
                    total += n;
                }
            }
        }
    }
    if total > 0.0 {
        Some(total)
    } else {
        None
    }
}

/// Turns machine amenity codes like `HAS_AIR_CONDITIONING` into display names.
pub fn prettify_amenity_code(code: &str) -> String {
    let mut body = code.trim();
    for prefix in ["HAS_", "IS_", "WITH_"] {
        if let Some(rest) = body.strip_prefix(prefix) {
            body = rest;
            break;
        }
    }

    let words: Vec<String> = body
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| match word.to_ascii_uppercase().as_str() {
            "TV" => "TV".to_string(),
            "WIFI" => "WiFi".to_string(),
            _ => {
                let lower = word.to_ascii_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect();

    words.join(" ")
}
