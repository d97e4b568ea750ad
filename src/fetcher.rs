//! Packet feed transport.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::Value;
use tracing::info;

use crate::error::MeshStatusError;
use crate::service::TelemetryConfig;

/// Source of raw packets. One call is one fetch attempt.
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Returns the feed as a list of JSON packets, not yet validated.
    async fn fetch_packets(&self) -> Result<Vec<Value>, MeshStatusError>;
}

/// Fetches packets from the letsmesh filtered-packets endpoint.
#[derive(Debug, Clone)]
pub struct HttpPacketSource {
    client: reqwest::Client,
    url: Url,
    region: String,
}

impl HttpPacketSource {
    pub fn new(config: &TelemetryConfig) -> Result<Self, MeshStatusError> {
        let url = Self::feed_url(config)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("meshstatus/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url,
            region: config.region.clone(),
        })
    }

    fn feed_url(config: &TelemetryConfig) -> Result<Url, MeshStatusError> {
        let limit = config.packet_limit.to_string();
        Url::parse_with_params(
            &config.api_url,
            [
                ("observer", config.observer_key.as_str()),
                ("region", config.region.as_str()),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| MeshStatusError::Config(format!("api url {:?}: {}", config.api_url, e)))
    }
}

/// The request URL carries the observer key, so it never goes into error text.
fn without_url(e: reqwest::Error) -> MeshStatusError {
    MeshStatusError::HttpRequest(e.without_url())
}

/// Accepts only a top-level JSON array.
pub fn into_packet_list(body: Value) -> Result<Vec<Value>, MeshStatusError> {
    match body {
        Value::Array(packets) => Ok(packets),
        other => Err(MeshStatusError::InvalidApiResponse(format!(
            "expected a packet array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl PacketSource for HttpPacketSource {
    async fn fetch_packets(&self) -> Result<Vec<Value>, MeshStatusError> {
        info!(
            "Fetching repeater data from {} (region {})",
            self.url.path(),
            self.region
        );

        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(without_url)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeshStatusError::HttpStatus(status));
        }

        let body = response.json::<Value>().await.map_err(without_url)?;
        let packets = into_packet_list(body)?;
        info!("Retrieved {} packets from API", packets.len());
        Ok(packets)
    }
}
