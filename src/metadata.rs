//! Static repeater metadata: operator-maintained names, addresses and hardware.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::MeshStatusError;

/// Operator-supplied facts about a repeater that the radio feed does not carry.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RepeaterMetadata {
    pub name: Option<String>,
    pub address: Option<String>,
    pub hardware: Option<String>,
    pub firmware: Option<String>,
}

/// Read-only lookup of repeater metadata by public key.
pub trait MetadataLookup: Send + Sync {
    fn lookup(&self, public_key: &str) -> Option<&RepeaterMetadata>;
}

/// In-memory metadata table. Keys match regardless of hex case.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<String, RepeaterMetadata>,
}

impl MetadataTable {
    pub fn new(entries: impl IntoIterator<Item = (String, RepeaterMetadata)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, meta)| (key.to_ascii_uppercase(), meta))
                .collect(),
        }
    }

    /// The repeaters known to the Columbus deployment.
    pub fn builtin() -> Self {
        Self::new([
            (
                "0D99036FDF510A790C2FC9257CA41ED132AB5FF35288927F61CD8EF45D2F0EC7".to_string(),
                RepeaterMetadata {
                    name: Some("BexleyMesh☀️♻️".into()),
                    address: Some("Ohio State Fair Park, Columbus, OH".into()),
                    hardware: Some("Meshtastic T-Beam V1.1".into()),
                    firmware: Some("Meshtastic".into()),
                },
            ),
            (
                "CC540240BAF29FF141A5F70D87622C3716B6E810AF1097E80D4D2A442E1414E4".to_string(),
                RepeaterMetadata {
                    name: Some("TJ00".into()),
                    address: Some("Downtown Columbus, OH".into()),
                    hardware: Some("Unknown".into()),
                    firmware: Some("Meshtastic".into()),
                },
            ),
        ])
    }

    /// Loads a table from a JSON object mapping public keys to metadata.
    ///
    /// # Errors
    ///
    /// Returns `MeshStatusError::Io` if the file cannot be read.
    /// Returns `MeshStatusError::JsonParse` if the JSON is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshStatusError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, MeshStatusError> {
        let entries: HashMap<String, RepeaterMetadata> = serde_json::from_str(content)?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataLookup for MetadataTable {
    fn lookup(&self, public_key: &str) -> Option<&RepeaterMetadata> {
        self.entries.get(&public_key.to_ascii_uppercase())
    }
}
