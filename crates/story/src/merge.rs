//! The confidence-gated merge engine.
//!
//! [`apply_update`] is a pure function of its inputs. Collections are
//! rebuilt through ordered maps, so a fixed sequence of updates always
//! yields the same state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{CharacterRecord, InventoryItem, InventoryState, Provenance, StoryState};
use crate::update::{InventoryItemUpdate, InventoryOperation, StoryStateUpdate};

/// Merge `update` into `current`, producing the next version.
///
/// The version always advances by one, even for an empty update. An
/// incoming record whose confidence is at least the existing one wins on
/// scalar fields; equal confidence counts as a win for the incoming record.
pub fn apply_update(
    current: &StoryState,
    update: &StoryStateUpdate,
    transform_name: &str,
    now: DateTime<Utc>,
) -> StoryState {
    StoryState {
        session_id: current.session_id.clone(),
        version: current.version + 1,
        last_updated: Some(now),
        summary: update.summary.clone().or_else(|| current.summary.clone()),
        characters: merge_characters(&current.characters, update.characters_to_upsert.as_deref()),
        inventory: merge_inventory(
            &current.inventory,
            update.inventory_updates.as_deref(),
            transform_name,
        ),
    }
}

fn merge_characters(
    current: &[CharacterRecord],
    updates: Option<&[CharacterRecord]>,
) -> Vec<CharacterRecord> {
    let Some(updates) = updates.filter(|u| !u.is_empty()) else {
        return current.to_vec();
    };

    let mut by_id: BTreeMap<String, CharacterRecord> =
        current.iter().map(|c| (c.id.clone(), c.clone())).collect();

    for incoming in updates {
        let merged = match by_id.remove(&incoming.id) {
            Some(existing) => merge_character(existing, incoming),
            None => incoming.clone(),
        };
        by_id.insert(merged.id.clone(), merged);
    }

    by_id.into_values().collect()
}

fn merge_character(existing: CharacterRecord, incoming: &CharacterRecord) -> CharacterRecord {
    let wins = incoming.provenance.confidence >= existing.provenance.confidence;

    let mut merged = existing;
    merged.aliases.extend(incoming.aliases.iter().cloned());
    merged.relationships.extend(incoming.relationships.iter().cloned());
    for (key, value) in &incoming.traits {
        if wins || !merged.traits.contains_key(key) {
            merged.traits.insert(key.clone(), value.clone());
        }
    }

    if wins {
        merged.display_name = incoming.display_name.clone();
        if incoming.last_seen.is_some() {
            merged.last_seen = incoming.last_seen.clone();
        }
        merged.provenance = incoming.provenance.clone();
    }
    merged
}

fn merge_inventory(
    current: &InventoryState,
    updates: Option<&[InventoryItemUpdate]>,
    transform_name: &str,
) -> InventoryState {
    let Some(updates) = updates.filter(|u| !u.is_empty()) else {
        return current.clone();
    };

    let mut by_id: BTreeMap<String, InventoryItem> = current
        .items
        .iter()
        .map(|i| (i.id.clone(), i.clone()))
        .collect();

    for update in updates {
        let incoming = &update.item;
        match update.operation {
            InventoryOperation::Remove => {
                by_id.remove(&incoming.id);
            }
            InventoryOperation::Upsert => {
                let merged = match by_id.remove(&incoming.id) {
                    Some(existing) => merge_item(existing, incoming),
                    None => incoming.clone(),
                };
                by_id.insert(merged.id.clone(), merged);
            }
        }
    }

    InventoryState {
        items: by_id.into_values().collect(),
        provenance: Provenance::new(transform_name, 1.0),
    }
}

fn merge_item(existing: InventoryItem, incoming: &InventoryItem) -> InventoryItem {
    if incoming.provenance.confidence < existing.provenance.confidence {
        return existing;
    }
    InventoryItem {
        id: existing.id,
        display_name: incoming.display_name.clone(),
        quantity: incoming.quantity.or(existing.quantity),
        notes: incoming.notes.clone().or(existing.notes),
        provenance: incoming.provenance.clone(),
    }
}
