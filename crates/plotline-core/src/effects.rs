//! # Effect Applier
//!
//! Applies ordered mutation lists to a snapshot and returns a new one.
//!
//! - `assign` with a boolean writes a flag, with a number or string a variable
//! - `increment` / `decrement` treat an absent variable as 0, saturate, then
//!   clamp to the declared bounds
//! - `gain` / `lose` are set operations and silently idempotent
//! - `emit` raises a custom event
//!
//! A mutation that cannot apply is skipped with an `EffectWarning`; the rest
//! of the list still runs.

use crate::graph::{Effect, Graph, Operator, StateDeclaration, StateMutation};
use crate::state::Snapshot;
use crate::{Value, Variable};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// EVENTS
// =============================================================================

/// Something observable that happened during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    SceneChange { from: String, to: String },
    SetFlag { name: String, value: bool },
    SetVariable { name: String, value: Variable },
    GainItem { item: String },
    LoseItem { item: String },
    Custom { name: String },
    Message { text: String },
    GameEnd,
}

// =============================================================================
// WARNINGS
// =============================================================================

/// A mutation that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectWarning {
    /// Position of the mutation in its list.
    pub index: usize,
    /// Attribute name, when the entry had one.
    pub attribute: Option<String>,
    pub reason: String,
}

impl fmt::Display for EffectWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "effect #{} on `{}` skipped: {}", self.index, attr, self.reason),
            None => write!(f, "effect #{} skipped: {}", self.index, self.reason),
        }
    }
}

/// Result of applying an effect list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub snapshot: Snapshot,
    pub events: Vec<EngineEvent>,
    pub warnings: Vec<EffectWarning>,
}

// =============================================================================
// APPLIER
// =============================================================================

/// Applies effects, clamping numeric results to declared bounds.
#[derive(Debug, Clone, Copy)]
pub struct EffectApplier<'g> {
    declarations: &'g [StateDeclaration],
}

impl<'g> EffectApplier<'g> {
    /// Applier that honors the story's declared variable bounds.
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            declarations: graph.states(),
        }
    }

    /// Applier with no declared bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { declarations: &[] }
    }

    /// Apply `effects` in order. The input snapshot is never modified.
    #[must_use]
    pub fn apply(&self, effects: &[Effect], snapshot: &Snapshot) -> Applied {
        let mut applied = Applied {
            snapshot: snapshot.clone(),
            events: Vec::new(),
            warnings: Vec::new(),
        };

        for (index, effect) in effects.iter().enumerate() {
            let outcome = match effect {
                Effect::Mutation(mutation) => self.apply_one(mutation, applied.snapshot.clone()),
                Effect::Malformed { reason, .. } => Err(reason.clone()),
            };
            match outcome {
                Ok((next, event)) => {
                    applied.snapshot = next;
                    applied.events.extend(event);
                }
                Err(reason) => {
                    let warning = EffectWarning {
                        index,
                        attribute: match effect {
                            Effect::Mutation(m) => Some(m.attribute.clone()),
                            Effect::Malformed { .. } => None,
                        },
                        reason,
                    };
                    tracing::warn!(%warning, "mutation skipped");
                    applied.warnings.push(warning);
                }
            }
        }

        applied
    }

    fn declaration(&self, name: &str) -> Option<&StateDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    fn apply_one(
        &self,
        mutation: &StateMutation,
        snapshot: Snapshot,
    ) -> Result<(Snapshot, Option<EngineEvent>), String> {
        let name = mutation.attribute.clone();
        match mutation.operator {
            Operator::Assign => match &mutation.value {
                Some(Value::Bool(b)) => Ok((
                    snapshot.with_flag(name.clone(), *b),
                    Some(EngineEvent::SetFlag { name, value: *b }),
                )),
                Some(Value::Number(n)) => {
                    let n = self.declaration(&name).map_or(*n, |d| d.clamp(*n));
                    Ok(set_variable(snapshot, name, Variable::Number(n)))
                }
                Some(Value::Text(s)) => Ok(set_variable(snapshot, name, Variable::Text(s.clone()))),
                None => Err("assignment without a value".to_string()),
            },
            Operator::Increment | Operator::Decrement => {
                let amount = mutation
                    .value
                    .as_ref()
                    .and_then(Value::as_number)
                    .ok_or_else(|| "non-numeric amount".to_string())?;
                if snapshot.flags().contains_key(&name) {
                    return Err("cannot do arithmetic on a flag".to_string());
                }
                let current = match snapshot.variables().get(&name) {
                    None => 0,
                    Some(Variable::Number(n)) => *n,
                    Some(Variable::Text(_)) => {
                        return Err("cannot do arithmetic on a string variable".to_string());
                    }
                };
                let raw = if mutation.operator == Operator::Increment {
                    current.saturating_add(amount)
                } else {
                    current.saturating_sub(amount)
                };
                let n = self.declaration(&name).map_or(raw, |d| d.clamp(raw));
                Ok(set_variable(snapshot, name, Variable::Number(n)))
            }
            Operator::Gain => {
                if snapshot.inventory().contains(&name) {
                    Ok((snapshot, None))
                } else {
                    Ok((
                        snapshot.with_item(name.clone()),
                        Some(EngineEvent::GainItem { item: name }),
                    ))
                }
            }
            Operator::Lose => {
                if snapshot.inventory().contains(&name) {
                    Ok((
                        snapshot.without_item(&name),
                        Some(EngineEvent::LoseItem { item: name }),
                    ))
                } else {
                    Ok((snapshot, None))
                }
            }
            Operator::Emit => Ok((snapshot, Some(EngineEvent::Custom { name }))),
        }
    }
}

fn set_variable(snapshot: Snapshot, name: String, value: Variable) -> (Snapshot, Option<EngineEvent>) {
    (
        snapshot.with_variable(name.clone(), value.clone()),
        Some(EngineEvent::SetVariable { name, value }),
    )
}

// =============================================================================
// TESTS
// =============================================================================
