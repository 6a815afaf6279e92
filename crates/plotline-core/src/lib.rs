//! # plotline-core
//!
//! The deterministic story engine for Plotline - THE LOGIC.
//!
//! A story is a directed graph of narrative nodes joined by player choices.
//! This crate turns story JSON written in any of the historical dialects
//! into one canonical graph, reports its structural defects, and plays it
//! as a replayable state machine.
//!
//! ## Pipeline
//!
//! - `normalize` → dialect JSON to canonical `Graph`
//! - `validate` → `Graph` to a complete list of `Defect`s
//! - `condition` / `effects` → pure functions over session snapshots
//! - `engine` → transitions producing new `SessionState` values with history
//! - `export` / `formats` → canonical JSON, checksums, binary saves
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network, NO filesystem access
//! - Deterministic: `BTreeMap` only, integer arithmetic only, no randomness
//! - Total: expected problems are returned as data, never panics

// =============================================================================
// MODULES
// =============================================================================

pub mod condition;
pub mod effects;
pub mod engine;
pub mod export;
pub mod formats;
pub mod graph;
pub mod normalize;
pub mod primitives;
pub mod state;
pub mod types;
pub mod validate;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{PlotlineError, Value, Variable};

// =============================================================================
// RE-EXPORTS: Story Model & Pipeline
// =============================================================================

pub use condition::{Condition, ConditionError, StateView};
pub use effects::{Applied, EffectApplier, EffectWarning, EngineEvent};
pub use engine::{ChoiceView, EngineError, NarrativeEngine, Turn};
pub use export::{canonical_checksum, export, export_string};
#[cfg(feature = "crypto-hash")]
pub use export::{story_hash, verify_story_hash};
pub use graph::{
    Choice, Effect, Graph, ListShape, Node, NodeId, Operator, StateDeclaration, StateMutation,
    StoryMeta,
};
pub use normalize::{NormalizeError, normalize, normalize_str};
pub use state::{HistoryEntry, Position, SessionState, Snapshot};
pub use validate::{Defect, DefectKind, unreachable_nodes, validate};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    SaveHeader, session_from_bytes, session_from_json, session_to_bytes, session_to_json,
};
