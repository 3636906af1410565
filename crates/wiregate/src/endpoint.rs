//! Gateway endpoint lookup.
//!
//! The connection engine asks an [`EndpointProvider`] for the socket address
//! before every connection attempt. [`RestEndpoint`] queries the REST API;
//! [`StaticEndpoint`] always returns a fixed address.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors raised while looking up the gateway endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The HTTP request failed.
    #[error("endpoint request failed: {0}")]
    Http(String),

    /// The API answered with a non-success status.
    #[error("endpoint request returned status {0}")]
    Status(u16),

    /// The returned address is not a valid URL.
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}

impl EndpointError {
    /// Whether the lookup was rejected because of bad credentials.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Status(401 | 403))
    }
}

/// Where to open the gateway socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    /// Base socket address.
    pub url: Url,
    /// Shard count recommended by the API, if it sent one.
    pub recommended_shards: Option<u32>,
}

impl GatewayEndpoint {
    /// An endpoint with no shard recommendation.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            recommended_shards: None,
        }
    }

    /// Socket address with the protocol version and encoding appended.
    #[must_use]
    pub fn connect_url(&self, api_version: u8) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("v", &api_version.to_string())
            .append_pair("encoding", "json");
        url
    }
}

/// Looks up the gateway endpoint.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    /// Fetch the current gateway endpoint.
    async fn gateway_endpoint(&self) -> Result<GatewayEndpoint, EndpointError>;
}

/// Always returns the same endpoint.
#[derive(Debug, Clone)]
pub struct StaticEndpoint {
    endpoint: GatewayEndpoint,
}

impl StaticEndpoint {
    /// Endpoint provider for a fixed URL.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            endpoint: GatewayEndpoint::new(url),
        }
    }

    /// Parse `url` and build a provider for it.
    pub fn parse(url: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(url).map_err(|e| EndpointError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(url))
    }
}

#[async_trait]
impl EndpointProvider for StaticEndpoint {
    async fn gateway_endpoint(&self) -> Result<GatewayEndpoint, EndpointError> {
        Ok(self.endpoint.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GatewayBotResponse {
    url: String,
    #[serde(default)]
    shards: Option<u32>,
}

/// Looks the endpoint up with `GET {api_base}/gateway/bot`.
#[derive(Clone)]
pub struct RestEndpoint {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl RestEndpoint {
    /// Provider querying `api_base` with the given bot token.
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn request_url(&self) -> String {
        format!("{}/gateway/bot", self.api_base.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for RestEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestEndpoint")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EndpointProvider for RestEndpoint {
    async fn gateway_endpoint(&self) -> Result<GatewayEndpoint, EndpointError> {
        let response = self
            .client
            .get(self.request_url())
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| EndpointError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status(status.as_u16()));
        }

        let body: GatewayBotResponse = response
            .json()
            .await
            .map_err(|e| EndpointError::Http(e.to_string()))?;

        debug!(url = %body.url, shards = ?body.shards, "Fetched gateway endpoint");

        let url = Url::parse(&body.url).map_err(|e| EndpointError::InvalidUrl(e.to_string()))?;
        Ok(GatewayEndpoint {
            url,
            recommended_shards: body.shards,
        })
    }
}
