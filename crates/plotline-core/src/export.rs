//! # Canonical Export Module
//!
//! Writes a normalized graph back to story JSON.
//!
//! The exported document is itself a valid input: normalizing it again
//! yields an equal graph. Every field is written under its canonical name
//! and under each legacy alias that readers of older dialects look for,
//! always with identical values.
//!
//! The export is also the source of truth for story identity:
//! `canonical_checksum` hashes its bytes, so two stories with the same
//! checksum normalize to the same graph.

use crate::PlotlineError;
use crate::graph::{Choice, Effect, Graph, ListShape, Node, StateMutation};
use serde_json::{Map, Value as Json, json};

// =============================================================================
// DOCUMENT
// =============================================================================

/// Export `graph` as a canonical story document.
#[must_use]
pub fn export(graph: &Graph) -> Json {
    let mut doc = Map::new();

    if let Some(title) = graph.declared_title() {
        put_all(&mut doc, &["title", "game_title"], json!(title));
    }
    if let Some(start) = graph.declared_start() {
        put_all(&mut doc, &["start", "start_branch_id"], json!(start));
    }

    let meta = graph.meta();
    if let Some(description) = &meta.description {
        doc.insert("description".to_string(), json!(description));
    }
    if let Some(author) = &meta.author {
        doc.insert("author".to_string(), json!(author));
    }
    if !meta.tags.is_empty() {
        doc.insert("tags".to_string(), json!(meta.tags));
    }
    if let Some(version) = &meta.version {
        doc.insert("version".to_string(), json!(version));
    }

    if !graph.states().is_empty() {
        let states: Vec<Json> = graph
            .states()
            .iter()
            .map(|decl| {
                let mut obj = Map::new();
                obj.insert("name".to_string(), json!(decl.name));
                if let Some(initial) = &decl.initial {
                    obj.insert("initial_value".to_string(), json!(initial));
                }
                if let Some(min) = decl.min {
                    obj.insert("min".to_string(), json!(min));
                }
                if let Some(max) = decl.max {
                    obj.insert("max".to_string(), json!(max));
                }
                Json::Object(obj)
            })
            .collect();
        doc.insert("game_states".to_string(), Json::Array(states));
    }

    let nodes: Vec<Json> = graph.nodes().iter().map(export_node).collect();
    doc.insert("branches".to_string(), Json::Array(nodes));

    Json::Object(doc)
}

/// Export `graph` as pretty-printed JSON text.
pub fn export_string(graph: &Graph) -> Result<String, PlotlineError> {
    serde_json::to_string_pretty(&export(graph))
        .map_err(|e| PlotlineError::SerializationError(e.to_string()))
}

fn export_node(node: &Node) -> Json {
    let mut obj = Map::new();

    if let Some(id) = &node.id {
        put_all(&mut obj, &["id", "branch_id"], json!(id));
    }
    if let Some(title) = &node.title {
        put_all(&mut obj, &["title", "branch_title", "chapter"], json!(title));
    }
    if let Some(body) = &node.body {
        put_all(&mut obj, &["content", "scene_detail", "text"], json!(body));
    }

    match &node.choice_list {
        ListShape::Present => {
            let choices: Vec<Json> = node.choices.iter().map(export_choice).collect();
            put_all(&mut obj, &["options", "choices"], Json::Array(choices));
        }
        ListShape::Missing => {}
        ListShape::NotArray(raw) => put_all(&mut obj, &["options", "choices"], raw.clone()),
    }

    if let Some(condition) = &node.condition {
        obj.insert("condition".to_string(), json!(condition));
    }
    if !node.on_enter.is_empty() {
        obj.insert("status_changes".to_string(), export_effects(&node.on_enter));
    }
    if let Some(message) = &node.message {
        put_all(&mut obj, &["status_update", "message"], json!(message));
    }

    Json::Object(obj)
}

fn export_choice(choice: &Choice) -> Json {
    let mut obj = Map::new();

    put_all(&mut obj, &["id", "option_id"], json!(choice.id));
    if choice.id_generated {
        obj.insert("id_generated".to_string(), json!(true));
    }
    if let Some(text) = &choice.text {
        put_all(&mut obj, &["text", "option_text", "choice"], json!(text));
    }

    // An empty target keeps a non-terminal choice without a link as it was.
    match (&choice.target, choice.terminal) {
        (Some(target), _) => put_all(
            &mut obj,
            &["target", "target_branch_id", "next_branch"],
            json!(target),
        ),
        (None, false) => put_all(
            &mut obj,
            &["target", "target_branch_id", "next_branch"],
            json!(""),
        ),
        (None, true) => {}
    }
    put_all(&mut obj, &["terminal", "end_game"], json!(choice.terminal));

    if let Some(condition) = &choice.condition {
        obj.insert("condition".to_string(), json!(condition));
    }
    if !choice.effects.is_empty() {
        obj.insert("status_changes".to_string(), export_effects(&choice.effects));
    }
    if let Some(message) = &choice.message {
        put_all(&mut obj, &["status_update", "message"], json!(message));
    }

    Json::Object(obj)
}

/// Mutations as `{attribute, operation, value}` descriptors. Malformed
/// entries are written back exactly as they were read.
fn export_effects(effects: &[Effect]) -> Json {
    Json::Array(
        effects
            .iter()
            .map(|effect| match effect {
                Effect::Mutation(mutation) => export_mutation(mutation),
                Effect::Malformed { raw, .. } => raw.clone(),
            })
            .collect(),
    )
}

fn export_mutation(mutation: &StateMutation) -> Json {
    let mut obj = Map::new();
    obj.insert("attribute".to_string(), json!(mutation.attribute));
    obj.insert("operation".to_string(), json!(mutation.operator.as_str()));
    if let Some(value) = &mutation.value {
        obj.insert("value".to_string(), json!(value));
    }
    Json::Object(obj)
}

fn put_all(obj: &mut Map<String, Json>, keys: &[&str], value: Json) {
    for key in keys {
        obj.insert((*key).to_string(), value.clone());
    }
}

// =============================================================================
// CHECKSUMS
// =============================================================================

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn canonical_bytes(graph: &Graph) -> Vec<u8> {
    // Serializing a `serde_json::Value` cannot fail.
    serde_json::to_vec(&export(graph)).unwrap_or_default()
}

/// Deterministic 64-bit checksum (FNV-1a) of the canonical export.
///
/// Fast and stable across runs and platforms. Not collision resistant;
/// enable `crypto-hash` for `story_hash`.
#[must_use]
pub fn canonical_checksum(graph: &Graph) -> u64 {
    canonical_bytes(graph).iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// BLAKE3 hash of the canonical export as a 64-character hex string.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn story_hash(graph: &Graph) -> String {
    blake3::hash(&canonical_bytes(graph)).to_hex().to_string()
}

/// Whether `graph` matches a hash produced by `story_hash`.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn verify_story_hash(graph: &Graph, expected: &str) -> bool {
    story_hash(graph).eq_ignore_ascii_case(expected)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn legacy_story() -> Json {
        json!({
            "game_title": "Harbor",
            "branches": [
                {
                    "branch_id": "dock",
                    "chapter": "The Dock",
                    "scene_detail": "Gulls.",
                    "options": [
                        {
                            "option_text": "Board",
                            "next_branch": "ship",
                            "status_changes": [
                                { "state_id": "coins", "operation": "-", "value": "2" },
                                { "state_id": "mood" }
                            ]
                        },
                        { "option_id": "stay", "option_text": "Stay", "next_branch": "" },
                        "Wave goodbye"
                    ]
                },
                {
                    "branch_id": "ship",
                    "content": "Sails.",
                    "choices": "none yet",
                    "status_update": "Aboard."
                },
                { "text": ["no", "id"] }
            ]
        })
    }

    #[test]
    fn export_is_idempotent() {
        let graph = normalize(&legacy_story()).expect("normalize");
        let again = normalize(&export(&graph)).expect("renormalize");
        assert_eq!(again, graph);
        assert_eq!(export(&again), export(&graph));
    }

    #[test]
    fn aliases_carry_identical_values() {
        let graph = normalize(&legacy_story()).expect("normalize");
        let doc = export(&graph);
        let node = &doc["branches"][0];
        assert_eq!(node["id"], node["branch_id"]);
        assert_eq!(node["title"], node["chapter"]);
        assert_eq!(node["content"], node["text"]);
        assert_eq!(node["options"], node["choices"]);

        let choice = &node["options"][0];
        assert_eq!(choice["id"], "choice_0_0");
        assert_eq!(choice["id"], choice["option_id"]);
        assert_eq!(choice["id_generated"], true);
        assert_eq!(choice["text"], choice["option_text"]);
        assert_eq!(choice["target"], choice["next_branch"]);
        assert_eq!(choice["terminal"], false);
    }

    #[test]
    fn malformed_entries_pass_through() {
        let graph = normalize(&legacy_story()).expect("normalize");
        let doc = export(&graph);
        let changes = &doc["branches"][0]["options"][0]["status_changes"];
        assert_eq!(
            changes[0],
            json!({ "attribute": "coins", "operation": "decrement", "value": 2 })
        );
        assert_eq!(changes[1], json!({ "state_id": "mood" }));
        assert_eq!(doc["branches"][1]["options"], json!("none yet"));
    }

    #[test]
    fn empty_target_stays_non_terminal() {
        let graph = normalize(&legacy_story()).expect("normalize");
        let doc = export(&graph);
        let stay = &doc["branches"][0]["options"][1];
        assert_eq!(stay["target"], "");
        assert_eq!(stay["terminal"], false);
        let wave = &doc["branches"][0]["options"][2];
        assert!(wave.get("target").is_none());
        assert_eq!(wave["end_game"], true);
    }

    #[test]
    fn checksum_is_deterministic_and_sensitive() {
        let graph = normalize(&legacy_story()).expect("normalize");
        assert_eq!(canonical_checksum(&graph), canonical_checksum(&graph.clone()));

        let mut changed = legacy_story();
        changed["game_title"] = json!("Harbour");
        let other = normalize(&changed).expect("normalize");
        assert_ne!(canonical_checksum(&graph), canonical_checksum(&other));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn story_hash_verifies() {
        let graph = normalize(&legacy_story()).expect("normalize");
        let hash = story_hash(&graph);
        assert_eq!(hash.len(), 64);
        assert!(verify_story_hash(&graph, &hash.to_uppercase()));
        assert!(!verify_story_hash(&graph, "00"));
    }
}
