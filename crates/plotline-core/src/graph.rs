//! # Story Graph
//!
//! The canonical in-memory model every dialect normalizes into.
//!
//! A `Graph` is built once and never mutated. Nodes are kept in input order,
//! duplicates included, so the validator can see exactly what the author
//! wrote. Lookups go through an index that maps each id to its first
//! occurrence. All maps are `BTreeMap` for deterministic ordering.

use crate::Value;
use crate::primitives::UNTITLED;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a narrative node ("branch" / "scene" in legacy dialects).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// STATE MUTATIONS
// =============================================================================

/// What a mutation does to its attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Set a flag (boolean value) or variable (number / string).
    Assign,
    /// Add to a numeric variable.
    Increment,
    /// Subtract from a numeric variable.
    Decrement,
    /// Put an item into the inventory.
    Gain,
    /// Take an item out of the inventory.
    Lose,
    /// Raise a custom engine event named by the attribute.
    Emit,
}

impl Operator {
    /// Resolve any of the historical operator spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "set" | "assign" => Some(Self::Assign),
            "+" | "add" | "increment" | "inc" => Some(Self::Increment),
            "-" | "subtract" | "decrement" | "dec" => Some(Self::Decrement),
            "gain" | "add_item" => Some(Self::Gain),
            "lose" | "remove_item" => Some(Self::Lose),
            "emit" => Some(Self::Emit),
            _ => None,
        }
    }

    /// Canonical spelling, as written by the exporter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Gain => "gain",
            Self::Lose => "lose",
            Self::Emit => "emit",
        }
    }

    /// Whether the operator needs a value to be meaningful.
    #[must_use]
    pub const fn requires_value(self) -> bool {
        matches!(self, Self::Assign | Self::Increment | Self::Decrement)
    }
}

/// A described change to session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMutation {
    /// Flag, variable, item or event name.
    pub attribute: String,
    pub operator: Operator,
    /// `None` only for operators that take no value.
    pub value: Option<Value>,
}

impl StateMutation {
    #[must_use]
    pub fn assign(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: Operator::Assign,
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub fn increment(attribute: impl Into<String>, amount: i64) -> Self {
        Self {
            attribute: attribute.into(),
            operator: Operator::Increment,
            value: Some(Value::Number(amount)),
        }
    }

    #[must_use]
    pub fn decrement(attribute: impl Into<String>, amount: i64) -> Self {
        Self {
            attribute: attribute.into(),
            operator: Operator::Decrement,
            value: Some(Value::Number(amount)),
        }
    }

    #[must_use]
    pub fn gain(item: impl Into<String>) -> Self {
        Self {
            attribute: item.into(),
            operator: Operator::Gain,
            value: None,
        }
    }

    #[must_use]
    pub fn lose(item: impl Into<String>) -> Self {
        Self {
            attribute: item.into(),
            operator: Operator::Lose,
            value: None,
        }
    }

    #[must_use]
    pub fn emit(event: impl Into<String>) -> Self {
        Self {
            attribute: event.into(),
            operator: Operator::Emit,
            value: None,
        }
    }
}

/// One entry of an effect list.
///
/// Descriptors that could not be resolved are kept verbatim so validation can
/// report them and export can write them back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Mutation(StateMutation),
    Malformed {
        raw: serde_json::Value,
        reason: String,
    },
}

impl From<StateMutation> for Effect {
    fn from(m: StateMutation) -> Self {
        Self::Mutation(m)
    }
}

// =============================================================================
// CHOICE
// =============================================================================

/// A player-selectable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    /// True when the input carried no id and `id` was generated.
    pub id_generated: bool,
    pub text: Option<String>,
    /// Target node. `None` when the input had no target or an empty one.
    pub target: Option<NodeId>,
    /// Ends the story instead of moving to `target`.
    pub terminal: bool,
    pub condition: Option<String>,
    pub effects: Vec<Effect>,
    pub message: Option<String>,
}

impl Choice {
    /// A choice linking to `target`.
    #[must_use]
    pub fn to(id: impl Into<String>, text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_generated: false,
            text: Some(text.into()),
            target: Some(NodeId::new(target)),
            terminal: false,
            condition: None,
            effects: Vec::new(),
            message: None,
        }
    }

    /// A choice that ends the story.
    #[must_use]
    pub fn ending(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            id_generated: false,
            text: Some(text.into()),
            target: None,
            terminal: true,
            condition: None,
            effects: Vec::new(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub fn with_effect(mut self, effect: impl Into<Effect>) -> Self {
        self.effects.push(effect.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether taking this choice ends the story.
    ///
    /// A non-terminal choice with no target also ends it: the engine never
    /// strands a player on an incomplete link.
    #[must_use]
    pub fn ends_story(&self) -> bool {
        self.terminal || self.target.is_none()
    }
}

// =============================================================================
// NODE
// =============================================================================

/// The shape the choice list had in the input document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListShape {
    #[default]
    Present,
    Missing,
    /// The field was present but not an array; the raw value is kept.
    NotArray(serde_json::Value),
}

/// A narrative unit with body text and a list of choices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub id: Option<NodeId>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub choices: Vec<Choice>,
    pub choice_list: ListShape,
    /// Entry condition. Gates presentation only, never traversal.
    pub condition: Option<String>,
    /// Applied when the node is entered.
    pub on_enter: Vec<Effect>,
    pub message: Option<String>,
}

impl Node {
    /// A node with an id, title and body and no choices yet.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Some(NodeId::new(id)),
            title: Some(title.into()),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub fn with_entry_effect(mut self, effect: impl Into<Effect>) -> Self {
        self.on_enter.push(effect.into());
        self
    }

    /// Id as a string slice, if the node has one.
    #[must_use]
    pub fn id_str(&self) -> Option<&str> {
        self.id.as_ref().map(NodeId::as_str)
    }

    /// Iterate the choices with the given id, in list order.
    pub fn choices_with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Choice> + 'a {
        self.choices.iter().filter(move |c| c.id == id)
    }
}

// =============================================================================
// STORY METADATA
// =============================================================================

/// A variable declared up front with its starting value and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDeclaration {
    pub name: String,
    pub initial: Option<Value>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl StateDeclaration {
    /// Clamp a numeric result into the declared bounds.
    #[must_use]
    pub fn clamp(&self, n: i64) -> i64 {
        let n = self.min.map_or(n, |lo| n.max(lo));
        self.max.map_or(n, |hi| n.min(hi))
    }
}

/// Descriptive fields carried along with the story.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryMeta {
    pub description: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub version: Option<String>,
}

// =============================================================================
// GRAPH
// =============================================================================

/// The canonical story graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Graph {
    title: Option<String>,
    meta: StoryMeta,
    start: Option<NodeId>,
    states: Vec<StateDeclaration>,
    nodes: Vec<Node>,
    /// NodeId -> position of its first occurrence in `nodes`.
    index: BTreeMap<NodeId, usize>,
}

impl Graph {
    /// Build a graph from nodes in story order.
    #[must_use]
    pub fn new(title: Option<String>, nodes: Vec<Node>) -> Self {
        let mut index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if let Some(id) = &node.id {
                index.entry(id.clone()).or_insert(i);
            }
        }
        Self {
            title,
            meta: StoryMeta::default(),
            start: None,
            states: Vec::new(),
            nodes,
            index,
        }
    }

    #[must_use]
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(NodeId::new(start));
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: StoryMeta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn with_states(mut self, states: Vec<StateDeclaration>) -> Self {
        self.states = states;
        self
    }

    /// Title, or the `"untitled"` sentinel.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }

    /// Title exactly as declared in the input.
    #[must_use]
    pub fn declared_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn meta(&self) -> &StoryMeta {
        &self.meta
    }

    /// Explicitly declared start node.
    #[must_use]
    pub fn declared_start(&self) -> Option<&NodeId> {
        self.start.as_ref()
    }

    /// Start node: the declared one, else the first node with an id.
    #[must_use]
    pub fn start_node_id(&self) -> Option<&NodeId> {
        self.start
            .as_ref()
            .or_else(|| self.nodes.iter().find_map(|n| n.id.as_ref()))
    }

    #[must_use]
    pub fn states(&self) -> &[StateDeclaration] {
        &self.states
    }

    /// Declaration for a variable, if one exists.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StateDeclaration> {
        self.states.iter().find(|s| s.name == name)
    }

    /// All nodes in input order, duplicates included.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// First node with the given id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).and_then(|&i| self.nodes.get(i))
    }

    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Distinct node ids in deterministic order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.index.keys()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn choice_count(&self) -> usize {
        self.nodes.iter().map(|n| n.choices.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_graph() -> Graph {
        Graph::new(
            Some("Forest".to_string()),
            vec![
                Node::new("a", "Edge", "Trees.").with_choice(Choice::to("go", "Go in", "b")),
                Node::new("b", "Clearing", "Light.").with_choice(Choice::ending("rest", "Rest")),
            ],
        )
    }

    #[test]
    fn operator_spellings_resolve() {
        assert_eq!(Operator::parse("+"), Some(Operator::Increment));
        assert_eq!(Operator::parse("subtract"), Some(Operator::Decrement));
        assert_eq!(Operator::parse("SET"), Some(Operator::Assign));
        assert_eq!(Operator::parse("remove_item"), Some(Operator::Lose));
        assert_eq!(Operator::parse("*"), None);
    }

    #[test]
    fn index_points_at_first_occurrence() {
        let graph = Graph::new(
            None,
            vec![Node::new("x", "First", "1"), Node::new("x", "Second", "2")],
        );
        assert_eq!(graph.node_count(), 2);
        assert_eq!(
            graph.node("x").and_then(|n| n.title.as_deref()),
            Some("First")
        );
    }

    #[test]
    fn untitled_sentinel_when_missing() {
        let graph = Graph::new(None, Vec::new());
        assert_eq!(graph.title(), UNTITLED);
        assert!(graph.declared_title().is_none());
    }

    #[test]
    fn start_defaults_to_first_identified_node() {
        let graph = two_node_graph();
        assert_eq!(graph.start_node_id().map(NodeId::as_str), Some("a"));

        let graph = two_node_graph().with_start("b");
        assert_eq!(graph.start_node_id().map(NodeId::as_str), Some("b"));
    }

    #[test]
    fn choice_without_target_ends_story() {
        let mut choice = Choice::to("c", "Go", "b");
        assert!(!choice.ends_story());
        choice.target = None;
        assert!(choice.ends_story());
    }

    #[test]
    fn declaration_clamps() {
        let decl = StateDeclaration {
            name: "hp".to_string(),
            initial: Some(Value::Number(10)),
            min: Some(0),
            max: Some(100),
        };
        assert_eq!(decl.clamp(-5), 0);
        assert_eq!(decl.clamp(150), 100);
        assert_eq!(decl.clamp(42), 42);
    }

    #[test]
    fn counts() {
        let graph = two_node_graph();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.choice_count(), 2);
        assert!(graph.contains_node("b"));
        assert!(!graph.contains_node("ghost"));
    }
}
