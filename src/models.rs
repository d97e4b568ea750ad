//! Data models: raw packets from the telemetry feed and the public status report.

use serde::{Deserialize, Serialize};

/// One observed radio transmission, as returned by the packet feed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Packet {
    pub public_key: Option<String>,
    pub payload_type: Option<String>,
    pub decoded_payload: Option<DecodedPayload>,
    /// ISO-8601 UTC, fixed format.
    pub heard_at: Option<String>,
    /// dBm. Missing and zero both mean "no reading".
    pub rssi: Option<f64>,
    pub node_name: Option<String>,
}

/// Decoded body of an advert packet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DecodedPayload {
    pub mode: Option<String>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Latest advert heard from one repeater.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub public_key: String,
    pub heard_at: String,
    pub rssi: f64,
    pub node_name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    pub fn is_online(self) -> bool {
        self == Status::Online
    }
}

/// Top-level report consumed by the dashboard and the JSON API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusReport {
    /// Generation instant, `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    pub timestamp: String,
    pub region: String,
    pub summary: Summary,
    pub repeaters: Vec<RepeaterStatus>,
}

impl StatusReport {
    pub fn find(&self, id: &str) -> Option<&RepeaterStatus> {
        self.repeaters.iter().find(|r| r.id == id)
    }

    /// Online repeaters in report order.
    pub fn online(&self) -> impl Iterator<Item = &RepeaterStatus> {
        self.repeaters.iter().filter(|r| r.status.is_online())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_repeaters: usize,
    pub online_repeaters: usize,
    pub offline_repeaters: usize,
    pub average_signal_strength: u8,
    pub network_health: u8,
}

/// Public status of one repeater.
///
/// `battery_level`, `uptime` and the message/health counters have no source
/// data; they are always `null` but kept so consumers see a stable schema.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepeaterStatus {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub location: Location,
    pub last_seen: String,
    /// Percentage, 0..=100.
    pub signal_strength: u8,
    pub battery_level: Option<u8>,
    pub uptime: Option<u64>,
    pub hardware: Hardware,
    pub network_stats: NetworkStats,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Hardware {
    pub model: String,
    pub firmware: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub average_signal: u8,
    #[serde(rename = "messageCount24h")]
    pub message_count_24h: Option<u64>,
    pub mesh_health: Option<u8>,
}
