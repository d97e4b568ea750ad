use std::env;
use std::str::FromStr;
use tera::Tera;

use crate::error::MeshStatusError;
use crate::service::{TelemetryConfig, TelemetryService};

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Cron expression for data refresh schedule.
    pub refresh_cron: String,
    /// Optional JSON file replacing the compiled-in repeater metadata.
    pub metadata_path: Option<String>,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Creates Config from environment variables with defaults.
    pub fn from_env() -> Result<Self, MeshStatusError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, MeshStatusError> {
        let defaults = TelemetryConfig::default();
        let telemetry = TelemetryConfig {
            api_url: get("MESH_API_URL").unwrap_or(defaults.api_url),
            observer_key: get("MESH_OBSERVER_KEY").unwrap_or(defaults.observer_key),
            region: get("MESH_REGION").unwrap_or(defaults.region),
            packet_limit: parse_or(&get, "MESH_PACKET_LIMIT", defaults.packet_limit)?,
            online_timeout_minutes: parse_or(
                &get,
                "MESH_ONLINE_TIMEOUT_MINUTES",
                defaults.online_timeout_minutes,
            )?,
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8201".into()),
            refresh_cron: get("REFRESH_CRON").unwrap_or_else(|| "0 */10 * * * *".into()),
            metadata_path: get("MESH_METADATA_PATH").filter(|p| !p.is_empty()),
            telemetry,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, MeshStatusError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| MeshStatusError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

/// Shared application state passed to all request handlers.
pub struct AppState {
    /// Template engine for rendering HTML pages.
    pub tera: Tera,
    pub service: TelemetryService,
}

impl AppState {
    pub fn new(tera: Tera, service: TelemetryService) -> Self {
        Self { tera, service }
    }
}
