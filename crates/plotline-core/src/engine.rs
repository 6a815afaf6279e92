//! # Narrative Engine
//!
//! The state machine that walks a canonical graph.
//!
//! The engine borrows a read-only `Graph` and never owns session state:
//! callers pass a `SessionState` in and get a new one back in a `Turn`. Any
//! number of sessions can share one engine.
//!
//! ## Transition rules
//!
//! 1. The choice must be on the current node and its condition must hold
//! 2. Choice effects apply to the current snapshot
//! 3. A choice that ends the story moves to `Ended`; otherwise the target
//!    node becomes current and its entry effects apply
//! 4. A history entry records the snapshot taken before step 2
//!
//! A rejected transition leaves the caller's state untouched. Entry
//! conditions never block traversal; `node_available` only reports them.

use crate::condition::{self, StateView};
use crate::effects::{EffectApplier, EffectWarning, EngineEvent};
use crate::graph::{Choice, Graph, NodeId};
use crate::primitives::MAX_HISTORY_LENGTH;
use crate::state::{HistoryEntry, SessionState, Snapshot};
use crate::{Value, Variable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected engine requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The choice is not on the current node or its condition is false.
    #[error("choice `{choice}` is not available at node `{node}`")]
    InvalidChoice { node: String, choice: String },

    /// The story has ended; no further transitions are possible.
    #[error("the story has already ended")]
    AlreadyEnded,

    /// A transition or the session points at a node that does not exist.
    #[error("node `{0}` does not exist")]
    UnknownNode(String),

    /// The graph has no node to start from.
    #[error("story has no start node")]
    NoStartNode,

    /// Replaying recorded history did not reproduce the recorded state.
    #[error("replay diverged at step {step}: {reason}")]
    ReplayDivergence { step: usize, reason: String },

    /// The session reached the transition limit.
    #[error("session history is full ({MAX_HISTORY_LENGTH} transitions)")]
    HistoryFull,
}

// =============================================================================
// TURN OUTPUT
// =============================================================================

/// A choice as presented to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceView {
    pub id: String,
    pub text: Option<String>,
    pub target: Option<NodeId>,
    pub ends_story: bool,
}

impl From<&Choice> for ChoiceView {
    fn from(choice: &Choice) -> Self {
        Self {
            id: choice.id.clone(),
            text: choice.text.clone(),
            target: choice.target.clone(),
            ends_story: choice.ends_story(),
        }
    }
}

/// Everything a caller needs after starting, resuming or transitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub state: SessionState,
    pub available_choices: Vec<ChoiceView>,
    pub events: Vec<EngineEvent>,
    pub is_game_over: bool,
    /// Messages raised by the transition, then the current node's body.
    pub text: Vec<String>,
    pub warnings: Vec<EffectWarning>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Deterministic player over one story graph.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeEngine<'g> {
    graph: &'g Graph,
    applier: EffectApplier<'g>,
}

impl<'g> NarrativeEngine<'g> {
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            applier: EffectApplier::new(graph),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Begin a session at the start node.
    ///
    /// Declared initial values are seeded first, then the start node's
    /// entry effects apply.
    pub fn start(&self) -> Result<Turn, EngineError> {
        let start = self.graph.start_node_id().ok_or(EngineError::NoStartNode)?;
        let node = self
            .graph
            .node(start.as_str())
            .ok_or_else(|| EngineError::UnknownNode(start.to_string()))?;

        let mut seeded = Snapshot::new(start.clone());
        for decl in self.graph.states() {
            seeded = match &decl.initial {
                None => seeded,
                Some(Value::Bool(b)) => seeded.with_flag(decl.name.clone(), *b),
                Some(Value::Number(n)) => {
                    seeded.with_variable(decl.name.clone(), Variable::Number(decl.clamp(*n)))
                }
                Some(Value::Text(s)) => {
                    seeded.with_variable(decl.name.clone(), Variable::Text(s.clone()))
                }
            };
        }

        let entered = self.applier.apply(&node.on_enter, &seeded);
        let mut text = Vec::new();
        text.extend(node.message.clone());
        tracing::debug!(start = %start, "session started");

        Ok(self.turn(
            SessionState::new(entered.snapshot),
            entered.events,
            entered.warnings,
            text,
        ))
    }

    /// Present an existing session without transitioning.
    #[must_use]
    pub fn resume(&self, state: SessionState) -> Turn {
        self.turn(state, Vec::new(), Vec::new(), Vec::new())
    }

    /// Choices on the current node whose conditions hold, in list order.
    #[must_use]
    pub fn available_choices(&self, state: &SessionState) -> Vec<&'g Choice> {
        if state.is_ended() {
            return Vec::new();
        }
        self.graph
            .node(state.current_node_id().as_str())
            .map(|node| {
                node.choices
                    .iter()
                    .filter(|c| condition::evaluate(c.condition.as_deref(), state))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a node's entry condition holds. Unknown nodes are unavailable.
    pub fn node_available(&self, id: &str, state: &impl StateView) -> bool {
        self.graph
            .node(id)
            .is_some_and(|node| condition::evaluate(node.condition.as_deref(), state))
    }

    /// Take the choice `choice_id` from the current node.
    ///
    /// When several choices share the id, the first whose condition holds is
    /// taken.
    pub fn choose(&self, state: &SessionState, choice_id: &str) -> Result<Turn, EngineError> {
        if state.is_ended() {
            return Err(EngineError::AlreadyEnded);
        }
        if state.history().len() >= MAX_HISTORY_LENGTH {
            return Err(EngineError::HistoryFull);
        }

        let from = state.current_node_id();
        let node = self
            .graph
            .node(from.as_str())
            .ok_or_else(|| EngineError::UnknownNode(from.to_string()))?;
        let choice = node
            .choices_with_id(choice_id)
            .find(|c| condition::evaluate(c.condition.as_deref(), state))
            .ok_or_else(|| EngineError::InvalidChoice {
                node: from.to_string(),
                choice: choice_id.to_string(),
            })?;

        let target = match (&choice.target, choice.ends_story()) {
            (Some(target), false) => Some(
                self.graph
                    .node(target.as_str())
                    .map(|n| (target, n))
                    .ok_or_else(|| EngineError::UnknownNode(target.to_string()))?,
            ),
            _ => None,
        };

        let applied = self.applier.apply(&choice.effects, state.snapshot());
        let mut events = applied.events;
        let mut warnings = applied.warnings;
        let mut text = Vec::new();
        if let Some(message) = &choice.message {
            events.push(EngineEvent::Message {
                text: message.clone(),
            });
            text.push(message.clone());
        }

        let (next, to_node) = match target {
            None => {
                events.push(EngineEvent::GameEnd);
                (applied.snapshot.finished(), None)
            }
            Some((target_id, target_node)) => {
                events.push(EngineEvent::SceneChange {
                    from: from.to_string(),
                    to: target_id.to_string(),
                });
                let moved = applied.snapshot.at_node(target_id.clone());
                let entered = self.applier.apply(&target_node.on_enter, &moved);
                events.extend(entered.events);
                warnings.extend(entered.warnings);
                text.extend(target_node.message.clone());
                (entered.snapshot, Some(target_id.clone()))
            }
        };

        tracing::debug!(
            from = %from,
            choice = choice_id,
            to = to_node.as_ref().map_or("<end>", NodeId::as_str),
            "transition"
        );

        let entry = HistoryEntry {
            from_node: from.clone(),
            choice_id: choice.id.clone(),
            to_node,
            snapshot_before: state.snapshot().clone(),
        };
        Ok(self.turn(state.advance(entry, next), events, warnings, text))
    }

    /// Start a session and take `choices` in order.
    pub fn play<S: AsRef<str>>(&self, choices: &[S]) -> Result<Turn, EngineError> {
        let mut turn = self.start()?;
        for choice in choices {
            turn = self.choose(&turn.state, choice.as_ref())?;
        }
        Ok(turn)
    }

    /// Re-run the recorded history of `state` from a fresh start.
    ///
    /// Succeeds with the replayed session when every recorded snapshot is
    /// reproduced exactly; otherwise reports the first step that differs.
    pub fn replay(&self, state: &SessionState) -> Result<SessionState, EngineError> {
        let diverged = |step: usize, reason: String| EngineError::ReplayDivergence { step, reason };
        let mut current = self.start()?.state;

        for (step, entry) in state.history().iter().enumerate() {
            if current.snapshot() != &entry.snapshot_before {
                return Err(diverged(step, "state before the step differs".to_string()));
            }
            current = self
                .choose(&current, &entry.choice_id)
                .map_err(|e| diverged(step, e.to_string()))?
                .state;
            let replayed = current.history().last();
            if replayed.map(|e| &e.to_node) != Some(&entry.to_node) {
                return Err(diverged(step, "transition led elsewhere".to_string()));
            }
        }

        if current.snapshot() != state.snapshot() {
            return Err(diverged(
                state.history().len(),
                "final state differs".to_string(),
            ));
        }
        Ok(current)
    }

    /// Keep the first `len` transitions and continue from there.
    #[must_use]
    pub fn rollback(&self, state: &SessionState, len: usize) -> Turn {
        self.resume(state.rollback_to(len))
    }

    /// Step back `steps` transitions.
    #[must_use]
    pub fn undo(&self, state: &SessionState, steps: usize) -> Turn {
        self.resume(state.undo(steps))
    }

    fn turn(
        &self,
        state: SessionState,
        events: Vec<EngineEvent>,
        warnings: Vec<EffectWarning>,
        mut text: Vec<String>,
    ) -> Turn {
        let available_choices = self
            .available_choices(&state)
            .into_iter()
            .map(ChoiceView::from)
            .collect();
        if !state.is_ended()
            && let Some(body) = self
                .graph
                .node(state.current_node_id().as_str())
                .and_then(|n| n.body.clone())
        {
            text.push(body);
        }
        Turn {
            is_game_over: state.is_ended(),
            state,
            available_choices,
            events,
            text,
            warnings,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
