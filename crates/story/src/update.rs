//! Update documents produced by LLM stages.

use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::model::{CharacterRecord, InventoryItem, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryOperation {
    #[serde(alias = "Upsert")]
    Upsert,
    #[serde(alias = "Remove")]
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemUpdate {
    pub operation: InventoryOperation,
    pub item: InventoryItem,
}

impl InventoryItemUpdate {
    pub fn upsert(item: InventoryItem) -> Self {
        Self {
            operation: InventoryOperation::Upsert,
            item,
        }
    }

    pub fn remove(item: InventoryItem) -> Self {
        Self {
            operation: InventoryOperation::Remove,
            item,
        }
    }
}

/// A partial change to a [`StoryState`](crate::StoryState). Absent parts
/// leave the state untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryStateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters_to_upsert: Option<Vec<CharacterRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_updates: Option<Vec<InventoryItemUpdate>>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateParseError {
    #[error("update text is empty")]
    Empty,

    #[error("update is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoryStateUpdate {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn characters(characters: Vec<CharacterRecord>) -> Self {
        Self {
            characters_to_upsert: Some(characters),
            ..Default::default()
        }
    }

    pub fn inventory(updates: Vec<InventoryItemUpdate>) -> Self {
        Self {
            inventory_updates: Some(updates),
            ..Default::default()
        }
    }

    /// Parse model output. A surrounding Markdown code fence is tolerated.
    ///
    /// Confidence values are clamped into `0.0..=1.0`.
    pub fn parse(text: &str) -> Result<Self, UpdateParseError> {
        let body = strip_code_fence(text.trim());
        if body.is_empty() {
            return Err(UpdateParseError::Empty);
        }
        let mut update: Self = serde_json::from_str(body)?;
        update.clamp_confidence();
        Ok(update)
    }

    fn clamp_confidence(&mut self) {
        for character in self.characters_to_upsert.iter_mut().flatten() {
            clamp(&mut character.provenance);
            for relationship in &mut character.relationships {
                clamp(&mut relationship.provenance);
            }
        }
        for update in self.inventory_updates.iter_mut().flatten() {
            clamp(&mut update.item.provenance);
        }
    }
}

fn clamp(provenance: &mut Provenance) {
    let confidence = provenance.confidence;
    if !(0.0..=1.0).contains(&confidence) {
        warn!(
            transform = %provenance.transform_name,
            confidence,
            "Confidence out of range; clamping"
        );
        provenance.confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
