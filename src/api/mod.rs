pub mod client;
pub mod fetchers;
pub mod model;

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

use crate::error::AppResult;

pub use client::ApiClient;

/// One parsed API response: JSON body plus lower-cased response headers.
/// Headers matter because pagination cursors sometimes arrive there.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn new(body: Value) -> Self {
        ApiResponse {
            body,
            headers: HashMap::new(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    async fn get(&self, path: &str, query: &[(String, String)]) -> AppResult<ApiResponse>;
    async fn download(&self, url: &str) -> AppResult<Bytes>;
}

#[cfg(test)]
pub mod stub {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde_json::Value;

    use crate::error::{AppError, AppResult};

    use super::{ApiResponse, RemoteApi};

    /// Canned-response API for tests. Responses are keyed by path, optionally
    /// qualified with the target UID so per-listing endpoints can differ.
    #[derive(Default)]
    pub struct StubApi {
        pub bodies: HashMap<String, Value>,
        pub errors: HashMap<String, AppError>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubApi {
        pub fn with_body(mut self, key: &str, body: Value) -> Self {
            self.bodies.insert(key.to_string(), body);
            self
        }

        pub fn with_error(mut self, key: &str, error: AppError) -> Self {
            self.errors.insert(key.to_string(), error);
            self
        }

        pub fn call_count(&self, key: &str) -> usize {
            self.calls
                .lock()
                .map(|calls| calls.iter().filter(|c| c.as_str() == key).count())
                .unwrap_or(0)
        }

        fn key_for(path: &str, query: &[(String, String)]) -> String {
            let uid = query
                .iter()
                .find(|(k, _)| k == "propertyUid" || k == "objectUid")
                .map(|(_, v)| v.as_str());
            match uid {
                Some(uid) => format!("{path}?{uid}"),
                None => path.to_string(),
            }
        }
    }

    impl RemoteApi for StubApi {
        async fn get(&self, path: &str, query: &[(String, String)]) -> AppResult<ApiResponse> {
            let key = Self::key_for(path, query);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(key.clone());
            }
            if let Some(err) = self.errors.get(&key) {
                return Err(err.clone());
            }
            self.bodies
                .get(&key)
                .map(|body| ApiResponse::new(body.clone()))
                .ok_or_else(|| AppError::api(404, format!("no stub for {key}")))
        }

        async fn download(&self, url: &str) -> AppResult<Bytes> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("download {url}"));
            }
            Ok(Bytes::from_static(b"image-bytes"))
        }
    }
}
