//! Fixed prompt templates for the LLM stages.
//!
//! Every builder quotes the narration between triple double quotes so the
//! model can tell instructions from story text.

pub const REWRITE_INSTRUCTIONS: &str = "You are a rewriting assistant for a narrated interactive story. \
Rewrite the input narration to be grammatically correct and narration-ready while preserving meaning. \
Make minimal changes when the text is already good. \
Return ONLY the rewritten narration text, with no additional commentary.";

pub const SUMMARY_INSTRUCTIONS: &str = "You are a story summarizer. Given the prior summary (may be empty) and new narration text, \
produce an updated rolling summary that preserves important prior context and adds new key events. \
Return ONLY the updated summary text.";

pub const CHARACTER_INSTRUCTIONS: &str = "You extract and update a structured character roster from story narration. \
Return ONLY valid JSON matching the requested schema. Do not invent characters or facts; \
if uncertain, set confidence low and include a supporting sourceSnippet.";

pub const INVENTORY_INSTRUCTIONS: &str = "You extract and update the player's inventory from story narration. \
Return ONLY valid JSON matching the requested schema. Do not invent items; \
if uncertain, set confidence low and include a supporting sourceSnippet.";

const CHARACTER_SHAPE: &str = "{\n  \"charactersToUpsert\": [ /* CharacterRecord[] */ ],\n  \"inventoryUpdates\": null,\n  \"summary\": null\n}";

const INVENTORY_SHAPE: &str = "{\n  \"charactersToUpsert\": null,\n  \"inventoryUpdates\": [ /* InventoryItemUpdate[] */ ],\n  \"summary\": null\n}";

fn quoted(label: &str, text: &str) -> String {
    format!("{label}:\n\n\"\"\"\n{text}\n\"\"\"\n")
}

/// Blank narration yields the bare instructions.
pub fn rewrite(narration: &str) -> String {
    if narration.trim().is_empty() {
        return REWRITE_INSTRUCTIONS.to_string();
    }
    format!("{REWRITE_INSTRUCTIONS}\n\n{}", quoted("INPUT NARRATION", narration))
}

pub fn summary(prior_summary: Option<&str>, narration: &str) -> String {
    format!(
        "{SUMMARY_INSTRUCTIONS}\n\n{}\n{}",
        quoted("PRIOR SUMMARY", prior_summary.unwrap_or_default()),
        quoted("NEW NARRATION", narration)
    )
}

pub fn characters(summary: Option<&str>, narration: &str) -> String {
    extraction(CHARACTER_INSTRUCTIONS, CHARACTER_SHAPE, summary, narration)
}

pub fn inventory(summary: Option<&str>, narration: &str) -> String {
    extraction(INVENTORY_INSTRUCTIONS, INVENTORY_SHAPE, summary, narration)
}

fn extraction(instructions: &str, shape: &str, summary: Option<&str>, narration: &str) -> String {
    format!(
        "{instructions}\n\nOUTPUT JSON SHAPE:\n{shape}\n\n{}\n{}",
        quoted("CURRENT SUMMARY", summary.unwrap_or_default()),
        quoted("NARRATION", narration)
    )
}
