use std::time::Duration;

use axum::body::Bytes;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue, LOCATION},
    redirect::Policy,
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to fetch encrypted data: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("failed to fetch encrypted data: upstream answered {0}")]
    Status(StatusCode),
}

impl UpstreamError {
    /// Short message safe to hand back to the browser.
    pub fn summary(&self) -> &'static str {
        match self {
            UpstreamError::Client(_) | UpstreamError::Request(_) => "upstream request failed",
            UpstreamError::Fetch(_) | UpstreamError::Status(_) => "failed to fetch encrypted data",
        }
    }
}

/// Upstream response relayed without inspection.
#[derive(Debug)]
pub struct Relayed {
    pub status: StatusCode,
    pub location: Option<HeaderValue>,
    pub body: Bytes,
}

#[derive(Clone, Debug)]
pub struct UpstreamClient {
    /// Never follows redirects so the employee API's answer is relayed as sent.
    relay: Client,
    http: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let relay = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(UpstreamError::Client)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self { relay, http })
    }

    /// Calls the employee API with the bearer token and returns whatever it sent.
    #[instrument(skip(self, token))]
    pub async fn fetch_encrypted(&self, api_url: &str, token: &str) -> Result<Relayed, UpstreamError> {
        let response = self
            .relay
            .get(api_url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(UpstreamError::Request)?;
        let status = response.status();
        let location = response.headers().get(LOCATION).cloned();
        let body = response.bytes().await.map_err(UpstreamError::Request)?;
        debug!(%status, bytes = body.len(), "upstream answered");
        Ok(Relayed {
            status,
            location,
            body,
        })
    }

    /// Fetches the sealed payload served by the payload route.
    #[instrument(skip(self))]
    pub async fn fetch_payload(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::Fetch)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }
        response.text().await.map_err(UpstreamError::Fetch)
    }
}
