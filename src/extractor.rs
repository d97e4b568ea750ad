//! Packet extraction: reduce a raw packet feed to the latest advert per repeater.

use serde::Deserialize;
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::PacketError;
use crate::models::{ExtractedRecord, Packet};

const ADVERT: &str = "Advert";
const REPEATER: &str = "Repeater";
const UNKNOWN_NAME: &str = "Unknown";

/// Result of one extraction pass.
#[derive(Debug, Default)]
pub struct Extraction {
    /// One record per public key, ordered by key.
    pub records: BTreeMap<String, ExtractedRecord>,
    /// Relevant packets that could not be used, by position in the feed.
    pub skipped: Vec<(usize, PacketError)>,
}

impl Extraction {
    /// Keeps `record` if its key is new or it was heard strictly later.
    fn offer(&mut self, record: ExtractedRecord) {
        match self.records.entry(record.public_key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                // Fixed-format UTC timestamps order correctly as strings.
                if record.heard_at > slot.get().heard_at {
                    slot.insert(record);
                }
            }
        }
    }
}

/// Returns true for repeater adverts with a usable public key.
///
/// Checked on the raw JSON so that irrelevant packets are dropped whatever
/// shape the rest of their fields have.
fn is_repeater_advert(value: &Value) -> bool {
    let payload_type = value.get("payload_type").and_then(Value::as_str);
    let mode = value
        .get("decoded_payload")
        .and_then(|decoded| decoded.get("mode"))
        .and_then(Value::as_str);
    let has_key = value
        .get("public_key")
        .and_then(Value::as_str)
        .is_some_and(|key| !key.is_empty());

    payload_type == Some(ADVERT) && mode == Some(REPEATER) && has_key
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

fn to_record(value: &Value) -> Result<ExtractedRecord, PacketError> {
    let packet =
        Packet::deserialize(value).map_err(|e| PacketError::Malformed(e.to_string()))?;
    let public_key = non_empty(packet.public_key)
        .ok_or_else(|| PacketError::Malformed("missing public_key".into()))?;
    let heard_at = match non_empty(packet.heard_at) {
        Some(heard_at) => heard_at,
        None => return Err(PacketError::MissingHeardAt(public_key)),
    };
    let decoded = packet
        .decoded_payload
        .ok_or_else(|| PacketError::Malformed("missing decoded_payload".into()))?;

    let node_name = non_empty(packet.node_name)
        .or_else(|| non_empty(decoded.name))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    Ok(ExtractedRecord {
        public_key,
        heard_at,
        rssi: packet.rssi.unwrap_or(0.0),
        node_name,
        lat: decoded.lat,
        lon: decoded.lon,
    })
}

/// Filters `packets` down to repeater adverts and keeps the most recently
/// heard one for each public key.
///
/// A malformed relevant packet is skipped and reported in
/// [`Extraction::skipped`]; it never produces a partial record and never
/// stops the pass.
pub fn extract(packets: &[Value]) -> Extraction {
    let mut extraction = Extraction::default();

    for (index, value) in packets.iter().enumerate() {
        if !is_repeater_advert(value) {
            continue;
        }
        match to_record(value) {
            Ok(record) => extraction.offer(record),
            Err(e) => {
                debug!("Skipping packet {}: {}", index, e);
                extraction.skipped.push((index, e));
            }
        }
    }

    info!(
        "Extracted data for {} unique repeaters from {} packets",
        extraction.records.len(),
        packets.len()
    );
    extraction
}
