//! Lenient wire types. The photo endpoint in particular flips between
//! numeric and string scalars, so the relevant fields go through forgiving
//! deserializers instead of strict ones.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

pub fn deserialize_flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleI64;

    impl<'de> Visitor<'de> for FlexibleI64 {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer, float, numeric string, or null")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(v as i64)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            Ok(v as i64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            let trimmed = v.trim();
            trimmed
                .parse::<i64>()
                .or_else(|_| trimmed.parse::<f64>().map(|f| f as i64))
                .or(Ok(0))
        }

        fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_none<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<i64, D2::Error> {
            d.deserialize_any(FlexibleI64)
        }
    }

    deserializer.deserialize_any(FlexibleI64)
}

pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPhoto {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub uid: Option<String>,
    #[serde(
        default,
        alias = "displayOrder",
        deserialize_with = "deserialize_flexible_i64"
    )]
    pub display_order: i64,
    #[serde(
        default,
        alias = "largeScaleImageUrl",
        deserialize_with = "deserialize_optional_string"
    )]
    pub large_scale_image_url: Option<String>,
    #[serde(
        default,
        alias = "mediumScaleImageUrl",
        deserialize_with = "deserialize_optional_string"
    )]
    pub medium_scale_image_url: Option<String>,
    #[serde(
        default,
        alias = "originalImageUrl",
        deserialize_with = "deserialize_optional_string"
    )]
    pub original_image_url: Option<String>,
}

impl ApiPhoto {
    /// Largest scaled rendition first, original as last resort.
    pub fn best_url(&self) -> Option<&str> {
        self.large_scale_image_url
            .as_deref()
            .or(self.medium_scale_image_url.as_deref())
            .or(self.original_image_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn photo_tolerates_sloppy_scalars() {
        let photo: ApiPhoto = serde_json::from_value(json!({
            "uid": "ph-1",
            "displayOrder": "3",
            "largeScaleImageUrl": " https://cdn.example/large.jpg ",
            "originalImageUrl": null
        }))
        .unwrap();
        assert_eq!(photo.display_order, 3);
        assert_eq!(photo.best_url(), Some("https://cdn.example/large.jpg"));
    }

    #[test]
    fn photo_url_fallback_order() {
        let photo: ApiPhoto = serde_json::from_value(json!({
            "mediumScaleImageUrl": "https://cdn.example/medium.jpg",
            "originalImageUrl": "https://cdn.example/orig.jpg"
        }))
        .unwrap();
        assert_eq!(photo.best_url(), Some("https://cdn.example/medium.jpg"));
        assert_eq!(photo.uid, None);
        assert_eq!(photo.display_order, 0);
    }
}
