//! HTTP client for the relay API with bearer-auth injection.
//!
//! The relay only ever sees encrypted bytes and signed records; this client
//! is a dumb pipe with uniform timeout and error-kind mapping.

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::VaultError;

/// Per-request timeout. Relay calls past this are NetworkTransient.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client wrapper for relay communication.
///
/// Manages base URL and access token; all error mapping to the crate
/// taxonomy happens here so callers never see `reqwest` types.
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client with the given base URL.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Store the access token for authenticated requests.
    pub async fn set_access_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Clear the access token (used on logout).
    pub async fn clear_access_token(&self) {
        let mut guard = self.access_token.write().await;
        *guard = None;
    }

    /// Send an authenticated GET request to a relative API path.
    pub async fn get(&self, path: &str) -> Result<Response, VaultError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self.client.get(&url);
        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await.map_err(map_request_error)
    }

    /// Send an authenticated POST request with a JSON body.
    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, VaultError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self.client.post(&url).json(body);
        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await.map_err(map_request_error)
    }

    /// Send an authenticated POST request with an opaque byte body.
    pub async fn post_bytes(&self, path: &str, body: Vec<u8>) -> Result<Response, VaultError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(body);
        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await.map_err(map_request_error)
    }

    /// Send an authenticated DELETE request.
    pub async fn delete(&self, path: &str) -> Result<Response, VaultError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await;

        let mut builder = self.client.delete(&url);
        if let Some(ref t) = *token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await.map_err(map_request_error)
    }
}

/// Map a transport-level failure to the crate taxonomy. Timeouts and
/// connection errors are transient; everything else at this layer is too
/// (a malformed URL never reaches the network in practice).
fn map_request_error(err: reqwest::Error) -> VaultError {
    VaultError::NetworkTransient(err.to_string())
}

/// Map a non-success HTTP status to the crate taxonomy:
/// 401/403 → Unauthorized, other 4xx → NetworkFatal, 5xx → NetworkTransient.
pub fn map_status_error(status: StatusCode, body: String) -> VaultError {
    match status.as_u16() {
        401 | 403 => VaultError::Unauthorized,
        400..=499 => VaultError::NetworkFatal(format!("{}: {}", status, body)),
        _ => VaultError::NetworkTransient(format!("{}: {}", status, body)),
    }
}

/// Check a response status, consuming the body on failure.
pub async fn check_status(resp: Response) -> Result<Response, VaultError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(map_status_error(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(StatusCode::UNAUTHORIZED, String::new()),
            VaultError::Unauthorized
        ));
        assert!(matches!(
            map_status_error(StatusCode::FORBIDDEN, String::new()),
            VaultError::Unauthorized
        ));
        assert!(matches!(
            map_status_error(StatusCode::NOT_FOUND, String::new()),
            VaultError::NetworkFatal(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            VaultError::NetworkTransient(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, String::new()),
            VaultError::NetworkTransient(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://relay.example.com/");
        assert_eq!(client.base_url, "https://relay.example.com");
    }
}
