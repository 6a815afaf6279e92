//! # Graph Validator
//!
//! Structural checks over a normalized graph.
//!
//! The validator is total: it visits every node and every choice exactly
//! once, runs every check independently, and returns all defects as data.
//! An empty list means the graph is structurally sound.
//!
//! Target checks are two-pass: the full id set is collected first so a
//! choice may point at a node defined later in the list.

use crate::condition::Condition;
use crate::graph::{Choice, Effect, Graph, ListShape, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

// =============================================================================
// DEFECTS
// =============================================================================

/// The kind of structural problem found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefectKind {
    MissingTitle,
    MissingNodeId,
    DuplicateNodeId,
    MissingBody,
    MissingChoiceList,
    ChoiceListNotArray,
    MissingChoiceId,
    MissingChoiceTarget,
    DanglingTarget,
    DuplicateChoiceId,
    InvalidMutation,
    MalformedCondition,
    UnknownStartNode,
}

/// One structural problem, located as precisely as the input allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defect {
    pub kind: DefectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_id: Option<String>,
    pub detail: String,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        match (self.node_index, &self.node_id) {
            (Some(i), Some(id)) => write!(f, " at node #{i} `{id}`")?,
            (Some(i), None) => write!(f, " at node #{i}")?,
            _ => {}
        }
        if let Some(c) = self.choice_index {
            write!(f, ", choice #{c}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Location context while visiting one node.
struct At<'a> {
    index: usize,
    node: &'a Node,
}

impl At<'_> {
    fn node_defect(&self, kind: DefectKind, detail: impl Into<String>) -> Defect {
        Defect {
            kind,
            node_index: Some(self.index),
            node_id: self.node.id_str().map(str::to_string),
            choice_index: None,
            choice_id: None,
            detail: detail.into(),
        }
    }

    fn choice_defect(
        &self,
        choice_index: usize,
        choice: &Choice,
        kind: DefectKind,
        detail: impl Into<String>,
    ) -> Defect {
        Defect {
            choice_index: Some(choice_index),
            choice_id: Some(choice.id.clone()),
            ..self.node_defect(kind, detail)
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Every structural defect in `graph`, in input order.
#[must_use]
pub fn validate(graph: &Graph) -> Vec<Defect> {
    let mut defects = Vec::new();

    if graph.declared_title().is_none_or(|t| t.trim().is_empty()) {
        defects.push(Defect {
            kind: DefectKind::MissingTitle,
            node_index: None,
            node_id: None,
            choice_index: None,
            choice_id: None,
            detail: "story has no title".to_string(),
        });
    }

    if let Some(start) = graph.declared_start()
        && !graph.contains_node(start.as_str())
    {
        defects.push(Defect {
            kind: DefectKind::UnknownStartNode,
            node_index: None,
            node_id: Some(start.to_string()),
            choice_index: None,
            choice_id: None,
            detail: format!("start node `{start}` does not exist"),
        });
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (index, node) in graph.nodes().iter().enumerate() {
        let at = At { index, node };
        check_node(&at, &mut seen, &mut defects);
        for (choice_index, choice) in node.choices.iter().enumerate() {
            check_choice(graph, &at, choice_index, choice, &mut defects);
        }
    }

    tracing::debug!(defects = defects.len(), "validated story");
    defects
}

fn check_node<'g>(at: &At<'g>, seen: &mut BTreeSet<&'g str>, defects: &mut Vec<Defect>) {
    let node = at.node;
    match node.id_str() {
        None => defects.push(at.node_defect(DefectKind::MissingNodeId, "node has no id")),
        Some(id) => {
            if !seen.insert(id) {
                defects.push(at.node_defect(
                    DefectKind::DuplicateNodeId,
                    format!("node id `{id}` is already used by an earlier node"),
                ));
            }
        }
    }

    if node.body.as_deref().is_none_or(str::is_empty) {
        defects.push(at.node_defect(DefectKind::MissingBody, "node has no body text"));
    }

    match &node.choice_list {
        ListShape::Present => {}
        ListShape::Missing => {
            defects.push(at.node_defect(DefectKind::MissingChoiceList, "node has no choice list"));
        }
        ListShape::NotArray(raw) => defects.push(at.node_defect(
            DefectKind::ChoiceListNotArray,
            format!("choice list is not an array: {raw}"),
        )),
    }

    if let Some(detail) = condition_problem(node.condition.as_deref()) {
        defects.push(at.node_defect(DefectKind::MalformedCondition, detail));
    }
    for detail in mutation_problems(&node.on_enter) {
        defects.push(at.node_defect(DefectKind::InvalidMutation, detail));
    }

    let mut choice_ids: BTreeSet<&str> = BTreeSet::new();
    for (choice_index, choice) in node.choices.iter().enumerate() {
        if !choice_ids.insert(choice.id.as_str()) {
            defects.push(at.choice_defect(
                choice_index,
                choice,
                DefectKind::DuplicateChoiceId,
                format!("choice id `{}` repeats within this node", choice.id),
            ));
        }
    }
}

fn check_choice(
    graph: &Graph,
    at: &At<'_>,
    choice_index: usize,
    choice: &Choice,
    defects: &mut Vec<Defect>,
) {
    if choice.id_generated {
        defects.push(at.choice_defect(
            choice_index,
            choice,
            DefectKind::MissingChoiceId,
            format!("choice has no id; generated `{}`", choice.id),
        ));
    }

    if !choice.terminal {
        match &choice.target {
            None => defects.push(at.choice_defect(
                choice_index,
                choice,
                DefectKind::MissingChoiceTarget,
                "choice is not terminal and has no target",
            )),
            Some(target) if !graph.contains_node(target.as_str()) => {
                defects.push(at.choice_defect(
                    choice_index,
                    choice,
                    DefectKind::DanglingTarget,
                    format!("target `{target}` does not exist"),
                ));
            }
            Some(_) => {}
        }
    }

    if let Some(detail) = condition_problem(choice.condition.as_deref()) {
        defects.push(at.choice_defect(choice_index, choice, DefectKind::MalformedCondition, detail));
    }
    for detail in mutation_problems(&choice.effects) {
        defects.push(at.choice_defect(choice_index, choice, DefectKind::InvalidMutation, detail));
    }
}

fn condition_problem(condition: Option<&str>) -> Option<String> {
    let source = condition?;
    Condition::parse(source)
        .err()
        .map(|e| format!("condition `{source}` does not parse: {e}"))
}

fn mutation_problems(effects: &[Effect]) -> impl Iterator<Item = String> + '_ {
    effects.iter().enumerate().filter_map(|(i, effect)| match effect {
        Effect::Mutation(_) => None,
        Effect::Malformed { raw, reason } => Some(format!("mutation #{i} {raw}: {reason}")),
    })
}

// =============================================================================
// REACHABILITY
// =============================================================================

/// Ids of nodes no path of choices leads to from the start node.
///
/// Conditions are ignored: a node counts as reachable if any choice links to
/// it. Advisory only; unreachable nodes are not defects. Ids are returned in
/// input order, once each.
#[must_use]
pub fn unreachable_nodes(graph: &Graph) -> Vec<NodeId> {
    let mut visited: BTreeSet<&NodeId> = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();
    if let Some(start) = graph.start_node_id().filter(|s| graph.contains_node(s.as_str())) {
        visited.insert(start);
        queue.push_back(start);
    }

    while let Some(id) = queue.pop_front() {
        let Some(node) = graph.node(id.as_str()) else {
            continue;
        };
        for target in node.choices.iter().filter_map(|c| c.target.as_ref()) {
            if graph.contains_node(target.as_str()) && visited.insert(target) {
                queue.push_back(target);
            }
        }
    }

    let mut reported: BTreeSet<&NodeId> = BTreeSet::new();
    graph
        .nodes()
        .iter()
        .filter_map(|n| n.id.as_ref())
        .filter(|id| !visited.contains(id) && reported.insert(*id))
        .cloned()
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
