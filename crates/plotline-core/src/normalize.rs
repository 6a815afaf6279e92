//! # Schema Normalizer
//!
//! Projects story JSON written in any of the historical dialects onto the
//! canonical `Graph`.
//!
//! - Every field is resolved through an alias table, first present wins
//! - A key is present when it exists and is not `null`
//! - Missing fields never fail; validation reports them later
//! - Only a non-object document or a malformed node list is an error
//!
//! When both `options` and `choices` exist on a node, `options` wins. The
//! lists are never merged.

use crate::graph::{
    Choice, Effect, Graph, ListShape, Node, NodeId, Operator, StateDeclaration, StateMutation,
    StoryMeta,
};
use crate::primitives::GENERATED_CHOICE_PREFIX;
use crate::types::json_number_to_i64;
use crate::Value;
use serde_json::{Map, Value as Json, json};
use thiserror::Error;

// =============================================================================
// ALIAS TABLES (priority order)
// =============================================================================

const TITLE: &[&str] = &["title", "game_title"];
const NODE_LIST: &[&str] = &["branches", "scenes"];
const START: &[&str] = &["start", "start_branch_id", "start_node"];
const DESCRIPTION: &[&str] = &["description", "game_description"];
const AUTHOR: &[&str] = &["author", "creator"];
const TAGS: &[&str] = &["tags", "categories"];
const VERSION: &[&str] = &["version"];
const STATES: &[&str] = &["game_states", "states"];

const NODE_ID: &[&str] = &["branch_id", "id"];
const NODE_TITLE: &[&str] = &["branch_title", "chapter", "title", "name"];
const NODE_BODY: &[&str] = &["content", "scene_detail", "text"];
const CHOICE_LIST: &[&str] = &["options", "choices"];

const CHOICE_ID: &[&str] = &["option_id", "id", "optionId"];
const CHOICE_TEXT: &[&str] = &["option_text", "choice", "text"];
const CHOICE_TARGET: &[&str] = &["target_branch_id", "next_branch", "target", "to"];
const TERMINAL: &[&str] = &["terminal", "end_game"];

const CONDITION: &[&str] = &["condition"];
const MESSAGE: &[&str] = &["status_update", "effect", "message"];
const STATUS_CHANGES: &str = "status_changes";
const CHOICE_EFFECT_OBJECT: &str = "effect";
const NODE_EFFECT_OBJECT: &str = "onEnter";
const ID_GENERATED: &str = "id_generated";

const MUTATION_ATTRIBUTE: &[&str] = &["attribute", "state_id"];
const MUTATION_OPERATOR: &[&str] = &["operation", "operator", "op"];

const STATE_NAME: &[&str] = &["name", "id"];
const STATE_INITIAL: &[&str] = &["initial_value", "initial"];

/// Longest raw fragment quoted in an error message.
const MAX_FRAGMENT_LENGTH: usize = 120;

// =============================================================================
// ERRORS
// =============================================================================

/// Hard normalization failures. Everything else is left for validation.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The story document is not a JSON object.
    #[error("story document must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    /// The node list exists but is not an array.
    #[error("`{field}` must be an array of node objects, found {found}")]
    NodeListNotArray {
        field: &'static str,
        found: &'static str,
    },

    /// An entry of the node list is not an object.
    #[error("`{field}[{index}]` is not a node object: {fragment}")]
    NodeNotObject {
        field: &'static str,
        index: usize,
        fragment: String,
    },

    /// The input text is not JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Parse story text and normalize it.
pub fn normalize_str(text: &str) -> Result<Graph, NormalizeError> {
    let raw: Json = serde_json::from_str(text)?;
    normalize(&raw)
}

/// Normalize a story document of any dialect into a canonical graph.
pub fn normalize(raw: &Json) -> Result<Graph, NormalizeError> {
    let doc = raw.as_object().ok_or(NormalizeError::NotAnObject {
        found: json_kind(raw),
    })?;
    let meta_obj = doc.get("meta").and_then(Json::as_object);

    let title = resolve_text(doc, TITLE)
        .or_else(|| meta_obj.and_then(|m| resolve_text(m, &["title"])));

    let nodes = match first_present(doc, NODE_LIST) {
        None => Vec::new(),
        Some((field, list)) => {
            // In keyed scene maps the key is the node id; targets refer to it.
            let entries: Vec<(Option<&String>, &Json)> = match list {
                Json::Array(items) => items.iter().map(|item| (None, item)).collect(),
                Json::Object(map) => map.iter().map(|(key, item)| (Some(key), item)).collect(),
                other => {
                    return Err(NormalizeError::NodeListNotArray {
                        field,
                        found: json_kind(other),
                    });
                }
            };
            let mut nodes = Vec::with_capacity(entries.len());
            for (index, (key, item)) in entries.into_iter().enumerate() {
                let obj = item.as_object().ok_or_else(|| NormalizeError::NodeNotObject {
                    field,
                    index,
                    fragment: fragment(item),
                })?;
                let mut node = normalize_node(obj, index);
                if let Some(key) = key.filter(|k| !k.is_empty()) {
                    node.id = Some(NodeId::new(key.as_str()));
                }
                nodes.push(node);
            }
            nodes
        }
    };

    let meta = StoryMeta {
        description: resolve_text(doc, DESCRIPTION)
            .or_else(|| meta_obj.and_then(|m| resolve_text(m, DESCRIPTION))),
        author: resolve_text(doc, AUTHOR)
            .or_else(|| meta_obj.and_then(|m| resolve_text(m, AUTHOR))),
        tags: resolve_string_list(doc, TAGS),
        version: resolve_text(doc, VERSION)
            .or_else(|| meta_obj.and_then(|m| resolve_text(m, VERSION))),
    };

    let mut graph = Graph::new(title, nodes)
        .with_meta(meta)
        .with_states(resolve_states(doc));
    if let Some(start) = resolve_text(doc, START).filter(|s| !s.is_empty()) {
        graph = graph.with_start(start);
    }

    tracing::debug!(
        nodes = graph.node_count(),
        choices = graph.choice_count(),
        "normalized story"
    );
    Ok(graph)
}

// =============================================================================
// NODES & CHOICES
// =============================================================================

fn normalize_node(obj: &Map<String, Json>, node_index: usize) -> Node {
    let (choices, choice_list) = match first_present(obj, CHOICE_LIST) {
        None => (Vec::new(), ListShape::Missing),
        Some((_, Json::Array(items))) => (
            items
                .iter()
                .enumerate()
                .map(|(choice_index, item)| normalize_choice(item, node_index, choice_index))
                .collect(),
            ListShape::Present,
        ),
        Some((_, other)) => (Vec::new(), ListShape::NotArray(other.clone())),
    };

    Node {
        id: resolve_text(obj, NODE_ID)
            .filter(|s| !s.is_empty())
            .map(NodeId::new),
        title: resolve_text(obj, NODE_TITLE),
        body: resolve_text(obj, NODE_BODY),
        choices,
        choice_list,
        condition: resolve_condition(obj),
        on_enter: resolve_effects(obj, NODE_EFFECT_OBJECT),
        message: resolve_message(obj),
    }
}

fn normalize_choice(item: &Json, node_index: usize, choice_index: usize) -> Choice {
    let empty = Map::new();
    let obj = match item {
        Json::Object(obj) => obj,
        // A bare string is a choice that only has display text.
        Json::String(text) => {
            return Choice {
                id: generated_choice_id(node_index, choice_index),
                id_generated: true,
                text: Some(text.clone()),
                target: None,
                terminal: true,
                condition: None,
                effects: Vec::new(),
                message: None,
            };
        }
        _ => &empty,
    };

    let authored_id = resolve_text(obj, CHOICE_ID).filter(|s| !s.is_empty());
    let marked_generated = obj
        .get(ID_GENERATED)
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let (id, id_generated) = match authored_id {
        Some(id) => (id, marked_generated),
        None => (generated_choice_id(node_index, choice_index), true),
    };

    let target_field = first_present(obj, CHOICE_TARGET);
    let target = target_field
        .and_then(|(_, v)| scalar_text(v))
        .filter(|s| !s.is_empty())
        .map(NodeId::new);
    let explicit_terminal = first_present(obj, TERMINAL).map(|(_, v)| json_truthy(v));
    let terminal = match explicit_terminal {
        Some(flag) => flag || target_field.is_none(),
        None => target_field.is_none(),
    };

    Choice {
        id,
        id_generated,
        text: resolve_text(obj, CHOICE_TEXT),
        target,
        terminal,
        condition: resolve_condition(obj),
        effects: resolve_effects(obj, CHOICE_EFFECT_OBJECT),
        message: resolve_message(obj),
    }
}

/// Deterministic id for a choice authored without one.
#[must_use]
pub fn generated_choice_id(node_index: usize, choice_index: usize) -> String {
    format!("{GENERATED_CHOICE_PREFIX}_{node_index}_{choice_index}")
}

fn resolve_condition(obj: &Map<String, Json>) -> Option<String> {
    resolve_text(obj, CONDITION).filter(|c| !c.trim().is_empty())
}

fn resolve_message(obj: &Map<String, Json>) -> Option<String> {
    MESSAGE
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Json::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

// =============================================================================
// EFFECTS
// =============================================================================

/// `status_changes` entries first, then the object effect form.
fn resolve_effects(obj: &Map<String, Json>, object_key: &str) -> Vec<Effect> {
    let mut effects = Vec::new();
    match obj.get(STATUS_CHANGES) {
        None | Some(Json::Null) => {}
        Some(Json::Array(items)) => effects.extend(items.iter().map(parse_descriptor)),
        // A lone descriptor is read as a one-entry list.
        Some(single) => effects.push(parse_descriptor(single)),
    }
    if let Some(Json::Object(effect)) = obj.get(object_key) {
        effects.extend(expand_effect_object(effect));
    }
    effects
}

/// Resolve one `{attribute, operation, value}` descriptor.
pub(crate) fn parse_descriptor(raw: &Json) -> Effect {
    let malformed = |reason: String| Effect::Malformed {
        raw: raw.clone(),
        reason,
    };
    let Some(obj) = raw.as_object() else {
        return malformed("mutation descriptor is not an object".to_string());
    };

    let Some(attribute) = resolve_text(obj, MUTATION_ATTRIBUTE).filter(|a| !a.is_empty()) else {
        return malformed("missing attribute".to_string());
    };
    let Some((_, op)) = first_present(obj, MUTATION_OPERATOR) else {
        return malformed(format!("missing operation for `{attribute}`"));
    };
    let Some(operator) = op.as_str().and_then(Operator::parse) else {
        return malformed(format!("unknown operation {op} for `{attribute}`"));
    };

    let value = obj.get("value").and_then(Value::from_json);
    let value = match operator {
        Operator::Assign => match value {
            Some(v) => Some(v),
            None => return malformed(format!("missing value for `{attribute}`")),
        },
        Operator::Increment | Operator::Decrement => match value.as_ref().and_then(Value::as_number) {
            Some(n) => Some(Value::Number(n)),
            None => return malformed(format!("non-numeric amount for `{attribute}`")),
        },
        Operator::Gain | Operator::Lose | Operator::Emit => None,
    };

    Effect::Mutation(StateMutation {
        attribute,
        operator,
        value,
    })
}

/// Expand `{setFlags, setVariables, addItems, removeItems, emitEvents}`.
///
/// The object form is sugar for descriptors, so each entry goes through
/// `parse_descriptor` and round-trips through export unchanged.
fn expand_effect_object(effect: &Map<String, Json>) -> Vec<Effect> {
    let mut effects = Vec::new();

    for key in ["setFlags", "setVariables"] {
        if let Some(Json::Object(entries)) = effect.get(key) {
            effects.extend(entries.iter().map(|(name, value)| {
                parse_descriptor(&json!({ "attribute": name, "operation": "assign", "value": value }))
            }));
        }
    }

    for (key, operation) in [("addItems", "gain"), ("removeItems", "lose"), ("emitEvents", "emit")] {
        if let Some(Json::Array(items)) = effect.get(key) {
            effects.extend(items.iter().map(|item| {
                parse_descriptor(&json!({ "attribute": item, "operation": operation }))
            }));
        }
    }

    effects
}

// =============================================================================
// STORY-LEVEL FIELDS
// =============================================================================

fn resolve_states(doc: &Map<String, Json>) -> Vec<StateDeclaration> {
    let Some((_, Json::Array(items))) = first_present(doc, STATES) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let name = resolve_text(obj, STATE_NAME).filter(|n| !n.is_empty())?;
            Some(StateDeclaration {
                name,
                initial: first_present(obj, STATE_INITIAL).and_then(|(_, v)| Value::from_json(v)),
                min: obj.get("min").and_then(Json::as_number).map(json_number_to_i64),
                max: obj.get("max").and_then(Json::as_number).map(json_number_to_i64),
            })
        })
        .collect()
}

fn resolve_string_list(obj: &Map<String, Json>, aliases: &[&'static str]) -> Vec<String> {
    match first_present(obj, aliases) {
        Some((_, Json::Array(items))) => items.iter().filter_map(scalar_text).collect(),
        Some((_, other)) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

// =============================================================================
// FIELD PRESENCE HELPERS
// =============================================================================

/// First alias whose key exists with a non-null value.
fn first_present<'a>(
    obj: &'a Map<String, Json>,
    aliases: &[&'static str],
) -> Option<(&'static str, &'a Json)> {
    aliases
        .iter()
        .find_map(|&key| obj.get(key).filter(|v| !v.is_null()).map(|v| (key, v)))
}

/// First present alias as text. Arrays of lines are joined with `\n`.
fn resolve_text(obj: &Map<String, Json>, aliases: &[&'static str]) -> Option<String> {
    let (_, value) = first_present(obj, aliases)?;
    match value {
        Json::Array(lines) => Some(
            lines
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::String(s) => !s.is_empty(),
        Json::Number(n) => json_number_to_i64(n) != 0,
        Json::Array(_) | Json::Object(_) => true,
        Json::Null => false,
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn fragment(value: &Json) -> String {
    let text = value.to_string();
    if text.len() <= MAX_FRAGMENT_LENGTH {
        return text;
    }
    let mut end = MAX_FRAGMENT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

// =============================================================================
// TESTS
// =============================================================================
