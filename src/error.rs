//! Error types for meshstatus.
//!
//! `MeshStatusError` covers everything that can make a whole fetch fail.
//! Failures scoped to a single packet or record have their own small enums,
//! because those never abort a batch: they are collected and reported.

use thiserror::Error;

/// Errors that make a fetch, a config load or a metadata load fail.
#[derive(Debug, Error)]
pub enum MeshStatusError {
    /// Error reading a file from disk (metadata table).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing JSON data.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Network-level failure talking to the telemetry API.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The telemetry API answered with a non-success status.
    #[error("API returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    /// Error when API returns unexpected data format.
    #[error("Invalid API response: {0}")]
    InvalidApiResponse(String),

    /// A configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Why a single packet was skipped during extraction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PacketError {
    /// The element could not be decoded into a packet at all.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// A relevant repeater advert carried no `heard_at`.
    #[error("packet for {0} has no heard_at timestamp")]
    MissingHeardAt(String),
}

/// Why a single extracted record was left out of the report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("record has an empty public key")]
    EmptyKey,

    #[error("rssi {0} is not a finite number")]
    InvalidRssi(f64),
}
