//! Story-state data model. Serialized as camelCase JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Which process produced a value, and how sure it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub transform_name: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

impl Provenance {
    pub fn new(transform_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            transform_name: transform_name.into(),
            confidence,
            source_snippet: None,
            chunk_index: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.source_snippet = Some(snippet.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub other_character_id: String,
    pub relation: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub id: String,
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub traits: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub provenance: Provenance,
}

impl CharacterRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            aliases: Vec::new(),
            traits: BTreeMap::new(),
            relationships: Vec::new(),
            last_seen: None,
            provenance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub provenance: Provenance,
}

impl InventoryItem {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            quantity: None,
            notes: None,
            provenance,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryState {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<InventoryItem>,
    pub provenance: Provenance,
}

impl InventoryState {
    pub fn empty(transform_name: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            provenance: Provenance::new(transform_name, 1.0),
        }
    }
}

impl Default for InventoryState {
    fn default() -> Self {
        Self::empty("init")
    }
}

/// Per-session narrative memory.
///
/// `version` starts at 0 and grows by exactly one per merge. Characters and
/// inventory items are kept sorted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryState {
    pub session_id: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<CharacterRecord>,
    #[serde(default)]
    pub inventory: InventoryState,
}

impl StoryState {
    /// A fresh state; a blank session id becomes `default`.
    pub fn empty(session_id: &str, transform_name: &str) -> Self {
        let session_id = if session_id.trim().is_empty() {
            "default"
        } else {
            session_id
        };
        Self {
            session_id: session_id.to_string(),
            version: 0,
            last_updated: None,
            summary: None,
            characters: Vec::new(),
            inventory: InventoryState::empty(transform_name),
        }
    }

    pub fn character(&self, id: &str) -> Option<&CharacterRecord> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&InventoryItem> {
        self.inventory.items.iter().find(|i| i.id == id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse embedded state; blank or invalid JSON yields `None`.
    pub fn from_json(json: &str) -> Option<Self> {
        if json.trim().is_empty() {
            return None;
        }
        serde_json::from_str(json).ok()
    }
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
