use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::store::Store;

pub const DEFAULT_STATE_DIR: &str = "./hostfully-state";
pub const DEFAULT_BASE_URL: &str = "https://api.hostfully.com/api/v3.2";

pub const HTTP_TIMEOUT_SECONDS: u64 = 30;
pub const HTTP_CONNECT_TIMEOUT: u64 = 10;
pub const MAX_RETRIES: u32 = 2;
pub const RETRY_DELAY_BASE_SECS: f32 = 1.5;

/// Hard cap on cursor-pagination loops so a pathological API can never spin
/// the catalog or listing fetch forever.
pub const MAX_CURSOR_PAGES: usize = 500;
/// Hard cap on per-listing fallback calls during a single catalog sync.
pub const MAX_FALLBACK_CALLS: usize = 1000;

pub const EP_PROPERTIES: &str = "/properties";
pub const EP_PHOTOS: &str = "/photos";
pub const EP_AMENITIES: &str = "/amenities";
pub const EP_AVAILABLE_AMENITIES: &str = "/available-amenities";
pub const EP_CUSTOM_AMENITIES: &str = "/custom-amenities";

/// Cursor token candidates, checked in order: response headers first, then
/// well-known body fields. Hostfully places the token inconsistently.
pub const CURSOR_HEADER_KEYS: [&str; 5] = [
    "x-next-cursor",
    "x-nextcursor",
    "next-cursor",
    "x-cursor-next",
    "x-next-page-cursor",
];
pub const CURSOR_BODY_POINTERS: [&str; 5] = [
    "/nextCursor",
    "/next_cursor",
    "/cursor/next",
    "/pagination/nextCursor",
    "/extensions/nextCursor",
];

// Persisted option slots.
pub const OPT_SETTINGS: &str = "settings";
pub const OPT_QUEUE: &str = "queue";
pub const OPT_PROGRESS: &str = "progress";
pub const OPT_AMENITY_MAP: &str = "amenity_map";
pub const OPT_ATTR_REGISTRY: &str = "attribute_registry";
pub const OPT_LAST_ERROR: &str = "last_error";
pub const OPT_LEGACY_BEDROOM_CLEANED: &str = "legacy_bedroom_cleaned";
pub const OPT_AMENITY_CACHE_PREFIX: &str = "amenity_cache:";

// Local taxonomy slugs.
pub const TAX_AMENITY: &str = "facility";
pub const TAX_AMENITY_LABEL: &str = "Amenities";
pub const TAX_CATEGORY: &str = "category";
pub const TAX_CATEGORY_LABEL: &str = "Categories";
pub const TAX_TAG: &str = "tag";
pub const TAX_TAG_LABEL: &str = "Tags";
/// Prefix for dynamically-created room-attribute taxonomies (e.g. `ra_bedroom`).
pub const ATTR_TAX_PREFIX: &str = "ra_";

// Metadata keys. The `_hostfully_*` keys are back-references to remote UIDs
// and form the upsert join keys; the rest is the booking content model.
pub const META_PROPERTY_UID: &str = "_hostfully_property_uid";
pub const META_AMENITY_UID: &str = "_hostfully_amenity_uid";
pub const META_SERVICE_KEY: &str = "_hostfully_service_key";
pub const META_PHOTO_MAP: &str = "_hostfully_photo_map";
pub const META_ADULTS: &str = "adults";
pub const META_CHILDREN: &str = "children";
pub const META_PRICE: &str = "price";
pub const META_MIN_STAY: &str = "min_stay";
pub const META_MAX_STAY: &str = "max_stay";
pub const META_CURRENCY: &str = "currency";
pub const META_FEATURED_IMAGE: &str = "featured_image";
pub const META_GALLERY: &str = "gallery";
pub const META_ROOM_TYPE_ID: &str = "room_type_id";
pub const META_SEASON_PRICES: &str = "season_prices";
pub const META_SERVICES: &str = "services";
pub const META_PRICE_PERIODICITY: &str = "price_periodicity";
pub const META_MIN_QUANTITY: &str = "min_quantity";
pub const META_SEASON_START: &str = "start_date";
pub const META_SEASON_END: &str = "end_date";
pub const META_SEASON_REPEAT: &str = "repeat";
pub const META_SEASON_DAYS: &str = "days";

pub const DEFAULT_OCCUPANCY: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub agency_uid: String,
    pub base_url: String,
    pub max_photos: usize,
    pub bulk_limit: usize,
    pub api_page_limit: i64,
    pub allow_enrich_api: bool,
    pub amenities_cache_hours: i64,
    /// Treat an enabled-amenities entry as actually enabled only when at
    /// least one channel flag is truthy. Empirical per-account behavior;
    /// disable if the endpoint already returns only enabled entries.
    pub require_channel_flag: bool,
    pub verbose_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_key: String::new(),
            agency_uid: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_photos: 8,
            bulk_limit: 10,
            api_page_limit: 100,
            allow_enrich_api: false,
            amenities_cache_hours: 24,
            require_channel_flag: true,
            verbose_log: false,
        }
    }
}

impl Settings {
    pub fn sanitize(&mut self) {
        self.api_key = self.api_key.trim().to_string();
        self.agency_uid = self.agency_uid.trim().to_string();
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        self.bulk_limit = self.bulk_limit.max(1);
        self.api_page_limit = self.api_page_limit.clamp(1, 100);
        self.amenities_cache_hours = self.amenities_cache_hours.clamp(1, 168);
    }

    pub fn load(store: &Store) -> Settings {
        let mut settings: Settings = store
            .option(OPT_SETTINGS)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        settings.sanitize();
        settings
    }

    pub fn save(&self, store: &mut Store) -> AppResult<()> {
        store.set_option(OPT_SETTINGS, serde_json::to_value(self)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_and_defaults() {
        let mut settings = Settings {
            api_key: " key ".to_string(),
            base_url: "https://api.example.com/v3/".to_string(),
            api_page_limit: 500,
            amenities_cache_hours: 0,
            bulk_limit: 0,
            ..Settings::default()
        };
        settings.sanitize();
        assert_eq!(settings.api_key, "key");
        assert_eq!(settings.base_url, "https://api.example.com/v3");
        assert_eq!(settings.api_page_limit, 100);
        assert_eq!(settings.amenities_cache_hours, 1);
        assert_eq!(settings.bulk_limit, 1);

        let mut blank = Settings {
            base_url: "  ".to_string(),
            ..Settings::default()
        };
        blank.sanitize();
        assert_eq!(blank.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn settings_round_trip_through_store() {
        let mut store = Store::in_memory();
        let settings = Settings {
            api_key: "secret".to_string(),
            agency_uid: "agency-1".to_string(),
            ..Settings::default()
        };
        settings.save(&mut store).unwrap();

        let loaded = Settings::load(&store);
        assert_eq!(loaded.api_key, "secret");
        assert_eq!(loaded.agency_uid, "agency-1");
        assert_eq!(loaded.max_photos, 8);
    }
}
