use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::config::{HTTP_CONNECT_TIMEOUT, HTTP_TIMEOUT_SECONDS, MAX_RETRIES, RETRY_DELAY_BASE_SECS};
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};

use super::{ApiResponse, RemoteApi};

const API_KEY_HEADER: &str = "X-HOSTFULLY-APIKEY";

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT))
            .build()?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn send(&self, url: &str, query: &[(String, String)]) -> AppResult<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let result = self
                .client
                .get(url)
                .header(API_KEY_HEADER, &self.api_key)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(query)
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                    attempt += 1;
                    let delay = RETRY_DELAY_BASE_SECS * 2f32.powi(attempt as i32 - 1);
                    log(
                        LogLevel::Warning,
                        &format!("Request to {url} failed ({e}), retry {attempt}/{MAX_RETRIES} in {delay:.1}s"),
                    );
                    tokio::time::sleep(Duration::from_secs_f32(delay)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl RemoteApi for ApiClient {
    async fn get(&self, path: &str, query: &[(String, String)]) -> AppResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send(&url, query).await?;
        let status = response.status();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let text = response.text().await?;

        if !status.is_success() {
            let snippet: String = text.chars().take(300).collect();
            return Err(AppError::api(status.as_u16(), snippet));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::ResponseInvalid(format!("{path}: {e}")))?;

        // The API reports some failures inside a 200 body.
        if let Some(message) = body.get("apiErrorMessage").and_then(Value::as_str) {
            if !message.trim().is_empty() {
                return Err(AppError::api(status.as_u16(), message.trim()));
            }
        }

        Ok(ApiResponse { body, headers })
    }

    async fn download(&self, url: &str) -> AppResult<Bytes> {
        let response = self.send(url, &[]).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::api(status.as_u16(), format!("download failed: {url}")));
        }
        Ok(response.bytes().await?)
    }
}
