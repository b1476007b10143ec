//! HTTP client implementation

use std::time::Duration;

use openapi_client::models::{ErrorResponse, FieldError};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::errors::HangarError;
use crate::utils::version_info;

/// HTTP client for a remote Hangar server
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str) -> Result<Self, HangarError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, HangarError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(version_info().user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HangarError> {
        let url = self.url(path);
        debug!("GET {}", url);
        self.execute(self.client.get(&url)).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HangarError> {
        let url = self.url(path);
        debug!("POST {}", url);
        self.execute(self.client.post(&url).json(body)).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, HangarError> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        self.execute(self.client.delete(&url)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HangarError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP request failed: {} - {}", status, body);
            return Err(error_from_response(status, &body));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

/// Map an error response back onto the error the server raised
pub(crate) fn error_from_response(status: StatusCode, body: &str) -> HangarError {
    let Ok(error) = serde_json::from_str::<ErrorResponse>(body) else {
        return match status {
            StatusCode::NOT_FOUND => HangarError::NotFound(body.to_string()),
            _ => HangarError::ServerError(format!("{}: {}", status, body)),
        };
    };

    match (status, error.error.as_str()) {
        (_, "validation_error") => {
            let mut fields = error.fields;
            if fields.is_empty() {
                fields.push(FieldError::new("request", error.message));
            }
            HangarError::ValidationError(fields)
        }
        (_, "invalid_transition") => HangarError::InvalidTransition(error.message),
        (StatusCode::NOT_FOUND, _) | (_, "not_found") => HangarError::NotFound(error.message),
        _ => HangarError::ServerError(format!("{}: {}", status, error.message)),
    }
}
