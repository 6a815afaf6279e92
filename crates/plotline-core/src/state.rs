//! # Session State
//!
//! Immutable session values for one play-through.
//!
//! - `Snapshot` is everything the engine reads: position, flags, variables,
//!   inventory
//! - `SessionState` is a snapshot plus the append-only history of transitions
//! - Every change builds a new value; nothing is mutated in place, so history
//!   entries keep the exact snapshot that preceded each transition
//! - `History` is a shared linked list: appending is O(1) and every older
//!   session keeps pointing at its own unchanged prefix
//!
//! The serde layout is the persisted session format:
//! `{currentNodeId, ended, flags, variables, inventory, history[]}`.

use crate::Variable;
use crate::condition::StateView;
use crate::graph::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// POSITION
// =============================================================================

/// Where a session is in the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position<'a> {
    AtNode(&'a NodeId),
    Ended,
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Session state without history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Current node; after the story ends, the node the final choice was on.
    current_node_id: NodeId,
    #[serde(default)]
    ended: bool,
    #[serde(default)]
    flags: BTreeMap<String, bool>,
    #[serde(default)]
    variables: BTreeMap<String, Variable>,
    #[serde(default)]
    inventory: BTreeSet<String>,
}

impl Snapshot {
    /// Fresh snapshot at `start` with empty state.
    #[must_use]
    pub fn new(start: NodeId) -> Self {
        Self {
            current_node_id: start,
            ended: false,
            flags: BTreeMap::new(),
            variables: BTreeMap::new(),
            inventory: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn current_node_id(&self) -> &NodeId {
        &self.current_node_id
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    #[must_use]
    pub fn position(&self) -> Position<'_> {
        if self.ended {
            Position::Ended
        } else {
            Position::AtNode(&self.current_node_id)
        }
    }

    #[must_use]
    pub fn flags(&self) -> &BTreeMap<String, bool> {
        &self.flags
    }

    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    #[must_use]
    pub fn inventory(&self) -> &BTreeSet<String> {
        &self.inventory
    }

    // -------------------------------------------------------------------------
    // Value-returning updates
    // -------------------------------------------------------------------------

    // A name lives in at most one of `flags` and `variables`; each write
    // evicts the same name from the other map.

    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        let name = name.into();
        self.variables.remove(&name);
        self.flags.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Variable) -> Self {
        let name = name.into();
        self.flags.remove(&name);
        self.variables.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.inventory.insert(item.into());
        self
    }

    #[must_use]
    pub fn without_item(mut self, item: &str) -> Self {
        self.inventory.remove(item);
        self
    }

    #[must_use]
    pub fn at_node(mut self, node: NodeId) -> Self {
        self.current_node_id = node;
        self
    }

    #[must_use]
    pub fn finished(mut self) -> Self {
        self.ended = true;
        self
    }
}

impl StateView for Snapshot {
    fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    fn has_item(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub from_node: NodeId,
    pub choice_id: String,
    /// `None` when the choice ended the story.
    pub to_node: Option<NodeId>,
    /// State immediately before the transition, stored verbatim.
    pub snapshot_before: Snapshot,
}

#[derive(Debug)]
struct HistoryLink {
    entry: HistoryEntry,
    prev: Option<Arc<HistoryLink>>,
    /// Number of entries up to and including this one.
    len: usize,
}

impl Drop for HistoryLink {
    // Unlink iteratively so dropping a long history does not recurse once
    // per entry.
    fn drop(&mut self) {
        let mut prev = self.prev.take();
        while let Some(link) = prev {
            match Arc::try_unwrap(link) {
                Ok(mut owned) => prev = owned.prev.take(),
                Err(_) => break,
            }
        }
    }
}

/// Recorded transitions, oldest first.
///
/// Clones share every entry. `push` returns a new history and leaves the
/// receiver untouched.
#[derive(Debug, Clone, Default)]
pub struct History {
    head: Option<Arc<HistoryLink>>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |link| link.len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Most recent transition.
    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.head.as_ref().map(|link| &link.entry)
    }

    /// Oldest transition.
    #[must_use]
    pub fn first(&self) -> Option<&HistoryEntry> {
        self.links().last().map(|link| &link.entry)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        let len = self.len();
        if index >= len {
            return None;
        }
        self.links().nth(len - 1 - index).map(|link| &link.entry)
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        let mut entries: Vec<&HistoryEntry> = self.links().map(|link| &link.entry).collect();
        entries.reverse();
        entries.into_iter()
    }

    /// New history with `entry` appended.
    #[must_use]
    pub fn push(&self, entry: HistoryEntry) -> Self {
        Self {
            head: Some(Arc::new(HistoryLink {
                entry,
                len: self.len() + 1,
                prev: self.head.clone(),
            })),
        }
    }

    /// The first `len` entries, sharing storage with `self`.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        let mut head = self.head.as_ref();
        while let Some(link) = head {
            if link.len <= len {
                break;
            }
            head = link.prev.as_ref();
        }
        Self {
            head: head.cloned(),
        }
    }

    // Newest first.
    fn links(&self) -> impl Iterator<Item = &HistoryLink> {
        std::iter::successors(self.head.as_deref(), |link| link.prev.as_deref())
    }
}

impl PartialEq for History {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut mine = self.head.as_ref();
        let mut theirs = other.head.as_ref();
        while let (Some(a), Some(b)) = (mine, theirs) {
            if Arc::ptr_eq(a, b) {
                return true;
            }
            if a.entry != b.entry {
                return false;
            }
            mine = a.prev.as_ref();
            theirs = b.prev.as_ref();
        }
        true
    }
}

impl Eq for History {}

impl FromIterator<HistoryEntry> for History {
    fn from_iter<I: IntoIterator<Item = HistoryEntry>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |history, entry| history.push(entry))
    }
}

impl Serialize for History {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for History {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<HistoryEntry>::deserialize(deserializer).map(|entries| entries.into_iter().collect())
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// A snapshot plus its recorded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(flatten)]
    snapshot: Snapshot,
    #[serde(default)]
    history: History,
}

impl SessionState {
    /// Session with no history yet.
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            history: History::new(),
        }
    }

    /// Reassemble a session from decoded parts.
    #[must_use]
    pub(crate) fn from_parts(snapshot: Snapshot, history: History) -> Self {
        Self { snapshot, history }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn current_node_id(&self) -> &NodeId {
        self.snapshot.current_node_id()
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.snapshot.is_ended()
    }

    #[must_use]
    pub fn position(&self) -> Position<'_> {
        self.snapshot.position()
    }

    /// New state with `entry` appended and `next` as the current snapshot.
    #[must_use]
    pub(crate) fn advance(&self, entry: HistoryEntry, next: Snapshot) -> Self {
        Self {
            snapshot: next,
            history: self.history.push(entry),
        }
    }

    /// Keep the first `len` transitions and restore the state they led to.
    ///
    /// The restored snapshot is the one recorded before transition `len`,
    /// which is exactly the state after the retained prefix. A `len` at or
    /// beyond the history length returns an unchanged copy.
    #[must_use]
    pub fn rollback_to(&self, len: usize) -> Self {
        if len >= self.history.len() {
            return self.clone();
        }
        let kept = self.history.prefix(len + 1);
        match kept.last() {
            None => self.clone(),
            Some(entry) => Self {
                snapshot: entry.snapshot_before.clone(),
                history: kept.prefix(len),
            },
        }
    }

    /// Roll back the last `steps` transitions.
    #[must_use]
    pub fn undo(&self, steps: usize) -> Self {
        self.rollback_to(self.history.len().saturating_sub(steps))
    }

    /// The state before any transition was taken.
    #[must_use]
    pub fn initial_snapshot(&self) -> &Snapshot {
        self.history
            .first()
            .map_or(&self.snapshot, |entry| &entry.snapshot_before)
    }
}

impl StateView for SessionState {
    fn flag(&self, name: &str) -> Option<bool> {
        self.snapshot.flag(name)
    }

    fn variable(&self, name: &str) -> Option<&Variable> {
        self.snapshot.variable(name)
    }

    fn has_item(&self, item: &str) -> bool {
        self.snapshot.has_item(item)
    }
}

// =============================================================================
// TESTS
// =============================================================================
