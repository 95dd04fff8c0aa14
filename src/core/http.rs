//! HTTP client utilities.
//!
//! Provides the client used to download the remote price table.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{Result, TallyError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("cctally/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TallyError::Network(e.to_string()))
}

/// Fetch JSON from a URL.
///
/// # Errors
///
/// Returns error on network failure or JSON parse failure.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    fetch_json_with_timeout(client, url, DEFAULT_TIMEOUT).await
}

/// Fetch JSON from a URL with a per-request timeout.
///
/// # Errors
///
/// `Timeout` when the request exceeds `timeout`, `Network` on connection failure or a
/// non-success status, `ParseResponse` when the body is not the expected JSON.
pub async fn fetch_json_with_timeout<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<T> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                TallyError::Timeout(timeout.as_secs())
            } else {
                TallyError::Network(e.to_string())
            }
        })?;

    if !response.status().is_success() {
        return Err(TallyError::Network(format!(
            "HTTP {} from {}",
            response.status(),
            url
        )));
    }

    response.json().await.map_err(|e| {
        if e.is_timeout() {
            TallyError::Timeout(timeout.as_secs())
        } else {
            TallyError::ParseResponse(e.to_string())
        }
    })
}
