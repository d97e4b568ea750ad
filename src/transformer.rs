//! Status transformation: turn extracted records into the public report.

use chrono::{DateTime, Duration, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use itertools::{Either, Itertools};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::warn;

use crate::error::RecordError;
use crate::metadata::MetadataLookup;
use crate::models::{
    ExtractedRecord, Hardware, Location, NetworkStats, RepeaterStatus, Status, StatusReport,
    Summary,
};

/// Weakest reading mapped to 0%.
pub const RSSI_MIN: f64 = -120.0;
/// Strongest reading mapped to 100%.
pub const RSSI_MAX: f64 = 0.0;

const ADDRESS_PLACEHOLDER: &str = "Location TBD";
const UNKNOWN: &str = "Unknown";

/// Display format for `lastSeen`, e.g. `Feb 27, 2026, 04:56:07 PM`.
const LAST_SEEN_FORMAT: &str = "%b %-d, %Y, %I:%M:%S %p";

/// Result of one transformation pass.
#[derive(Debug)]
pub struct Transformation {
    pub report: StatusReport,
    /// Records left out of the report, by public key.
    pub skipped: Vec<(String, RecordError)>,
}

/// Converts an RSSI reading in dBm to a 0-100 percentage.
///
/// Linear over [`RSSI_MIN`, `RSSI_MAX`]. A reading of exactly 0 dBm is the
/// feed's "no reading" value and maps to 0%.
pub fn calculate_signal_strength(rssi: f64) -> u8 {
    if rssi == 0.0 {
        return 0;
    }
    let clamped = rssi.clamp(RSSI_MIN, RSSI_MAX);
    let percentage = ((clamped - RSSI_MIN) / (RSSI_MAX - RSSI_MIN) * 100.0).round();
    percentage.clamp(0.0, 100.0) as u8
}

/// Parses a feed timestamp. Offset-less timestamps are taken as UTC.
pub fn parse_heard_at(heard_at: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(heard_at)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(heard_at, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Online iff heard less than `timeout` before `now`; unparseable is offline.
pub fn determine_status(heard_at: &str, now: DateTime<Utc>, timeout: Duration) -> Status {
    match parse_heard_at(heard_at) {
        Some(heard) if now.signed_duration_since(heard) < timeout => Status::Online,
        Some(_) => Status::Offline,
        None => {
            warn!("Could not parse timestamp {:?}, treating as offline", heard_at);
            Status::Offline
        }
    }
}

/// Formats `heard_at` in the server's local time zone.
pub fn format_last_seen(heard_at: &str) -> String {
    format_last_seen_in(heard_at, &Local)
}

/// Formats `heard_at` in `tz`, passing the input through if it does not parse.
pub fn format_last_seen_in<Tz>(heard_at: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match parse_heard_at(heard_at) {
        Some(heard) => heard.with_timezone(tz).format(LAST_SEEN_FORMAT).to_string(),
        None => heard_at.to_string(),
    }
}

fn or_placeholder(value: Option<&String>, placeholder: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| placeholder.to_string())
}

fn transform_record(
    record: &ExtractedRecord,
    metadata: &dyn MetadataLookup,
    online_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<RepeaterStatus, RecordError> {
    if record.public_key.is_empty() {
        return Err(RecordError::EmptyKey);
    }
    if !record.rssi.is_finite() {
        return Err(RecordError::InvalidRssi(record.rssi));
    }

    let status = determine_status(&record.heard_at, now, online_timeout);
    let signal = calculate_signal_strength(record.rssi);
    let meta = metadata.lookup(&record.public_key);

    Ok(RepeaterStatus {
        id: record.public_key.clone(),
        name: record.node_name.clone(),
        status,
        location: Location {
            latitude: record.lat,
            longitude: record.lon,
            address: or_placeholder(meta.and_then(|m| m.address.as_ref()), ADDRESS_PLACEHOLDER),
        },
        last_seen: format_last_seen(&record.heard_at),
        signal_strength: signal,
        battery_level: None,
        uptime: None,
        hardware: Hardware {
            model: or_placeholder(meta.and_then(|m| m.hardware.as_ref()), UNKNOWN),
            firmware: or_placeholder(meta.and_then(|m| m.firmware.as_ref()), UNKNOWN),
        },
        network_stats: NetworkStats {
            average_signal: signal,
            message_count_24h: None,
            mesh_health: None,
        },
    })
}

fn rounded_ratio(numerator: f64, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (numerator / total as f64).round().clamp(0.0, 100.0) as u8
}

/// Aggregates over the repeaters that made it into the report.
pub fn summarize(repeaters: &[RepeaterStatus]) -> Summary {
    let total = repeaters.len();
    let online = repeaters.iter().filter(|r| r.status.is_online()).count();
    let signal_sum: f64 = repeaters.iter().map(|r| f64::from(r.signal_strength)).sum();

    Summary {
        total_repeaters: total,
        online_repeaters: online,
        offline_repeaters: total - online,
        average_signal_strength: rounded_ratio(signal_sum, total),
        network_health: rounded_ratio(100.0 * online as f64, total),
    }
}

/// Builds the status report for `records` as of `now`.
///
/// Records that fail to convert are logged, listed in
/// [`Transformation::skipped`] and excluded from every aggregate.
pub fn transform(
    records: &BTreeMap<String, ExtractedRecord>,
    region: &str,
    metadata: &dyn MetadataLookup,
    online_timeout: Duration,
    now: DateTime<Utc>,
) -> Transformation {
    let (repeaters, skipped): (Vec<_>, Vec<_>) = records.iter().partition_map(|(key, record)| {
        match transform_record(record, metadata, online_timeout, now) {
            Ok(repeater) => Either::Left(repeater),
            Err(e) => {
                warn!("Error transforming repeater {}: {}", key, e);
                Either::Right((key.clone(), e))
            }
        }
    });

    let report = StatusReport {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        region: region.to_string(),
        summary: summarize(&repeaters),
        repeaters,
    };

    Transformation { report, skipped }
}
