use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Postgres SQLSTATE for a range-exclusion constraint violation. PostgREST
/// forwards it in the error body when the appointments no-overlap constraint
/// rejects an insert.
const SQLSTATE_EXCLUSION_VIOLATION: &str = "23P01";
/// Postgres SQLSTATE for a unique constraint violation, fired by the
/// webhook ledger's unique provider_event_id index.
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("exclusion constraint violated: {message}")]
    ExclusionViolation { message: String },

    #[error("unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("storage api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl StorageError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::ExclusionViolation { .. } | StorageError::UniqueViolation { .. }
        )
    }
}

/// Thin client for the PostgREST storage API. All persistence in the booking
/// and webhook paths goes through this client so that constraint violations
/// surface as typed errors instead of opaque strings.
pub struct PostgrestClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl PostgrestClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.storage_url.clone(),
            service_key: config.storage_service_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making storage request to {}", url);

        let mut headers = self.get_headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Storage API error ({}): {}", status, error_text);
            return Err(Self::classify_error(status.as_u16(), &error_text));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Insert that asks PostgREST to return the created representation.
    pub async fn insert_returning<T>(&self, path: &str, body: Value) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        self.request_with_headers(Method::POST, path, Some(body), Some(headers))
            .await
    }

    /// Patch that asks PostgREST to return the updated representation.
    pub async fn update_returning<T>(&self, path: &str, body: Value) -> Result<T, StorageError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        self.request_with_headers(Method::PATCH, path, Some(body), Some(headers))
            .await
    }

    fn classify_error(status: u16, error_text: &str) -> StorageError {
        // PostgREST reports the underlying SQLSTATE in the error body.
        let code = serde_json::from_str::<Value>(error_text)
            .ok()
            .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_owned));

        match code.as_deref() {
            Some(SQLSTATE_EXCLUSION_VIOLATION) => StorageError::ExclusionViolation {
                message: error_text.to_string(),
            },
            Some(SQLSTATE_UNIQUE_VIOLATION) => StorageError::UniqueViolation {
                message: error_text.to_string(),
            },
            _ => match status {
                401 | 403 => StorageError::Auth(error_text.to_string()),
                404 => StorageError::NotFound(error_text.to_string()),
                409 => {
                    // Conflict without a recognizable SQLSTATE still means a
                    // constraint fired; treat unknown 409s as unique violations.
                    StorageError::UniqueViolation {
                        message: error_text.to_string(),
                    }
                }
                _ => StorageError::Api {
                    status,
                    message: error_text.to_string(),
                },
            },
        }
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
