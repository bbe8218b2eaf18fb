use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{RagError, Result};

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Turns a non-2xx response into an upstream error carrying a short body excerpt.
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(240).collect();
    log::warn!("{} returned {}: {}", service, status, snippet);
    Err(RagError::upstream(service, format!("HTTP {status}: {snippet}")))
}
