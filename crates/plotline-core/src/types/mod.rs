//! # Core Type Definitions
//!
//! This module contains the value types shared by every Plotline component:
//! - Literal values carried by mutations and conditions (`Value`)
//! - Session variable values (`Variable`)
//! - The umbrella error type (`PlotlineError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Use saturating arithmetic for counters to prevent overflow

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine::EngineError;
use crate::normalize::NormalizeError;

// =============================================================================
// VALUE
// =============================================================================

/// A literal value as written in story data: mutation values and condition
/// operands.
///
/// Numbers are integers. Story JSON with fractional numbers is truncated
/// toward zero when it is read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl Value {
    /// Convert a JSON scalar into a value. Arrays, objects and `null` have no
    /// literal form.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => Some(Self::Number(json_number_to_i64(n))),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The integer carried by this value, if any. Numeric strings count:
    /// legacy status changes often quote their amounts.
    #[must_use]
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Truthiness used when a bare operand appears in a condition.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Variable> for Value {
    fn from(v: Variable) -> Self {
        match v {
            Variable::Number(n) => Self::Number(n),
            Variable::Text(s) => Self::Text(s),
        }
    }
}

/// Convert a JSON number to `i64`, truncating fractions and saturating
/// out-of-range integers.
pub(crate) fn json_number_to_i64(n: &serde_json::Number) -> i64 {
    if let Some(i) = n.as_i64() {
        i
    } else if n.as_u64().is_some() {
        i64::MAX
    } else {
        // `as` saturates and truncates toward zero.
        n.as_f64().map(|f| f as i64).unwrap_or(0)
    }
}

// =============================================================================
// VARIABLE
// =============================================================================

/// The value of a session variable: a number or a string.
///
/// Booleans never live here; assigning a boolean writes a flag instead.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variable {
    Number(i64),
    Text(String),
}

impl Variable {
    /// Get the number, if this variable is numeric.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Plotline system.
///
/// - No silent failures
/// - Use `Result<T, PlotlineError>` for fallible operations at the app boundary
/// - The CORE should never panic; all errors must be recoverable
#[derive(Debug, Error)]
pub enum PlotlineError {
    /// The story document could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The engine rejected a transition.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The story has structural defects and strict mode refuses to play it.
    #[error("Story has {0} structural defect(s)")]
    InvalidStory(usize),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A named save slot does not exist.
    #[error("Save slot not found: {0}")]
    SlotNotFound(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(true)), Some(Value::Bool(true)));
        assert_eq!(Value::from_json(&json!(7)), Some(Value::Number(7)));
        assert_eq!(Value::from_json(&json!("x")), Some(Value::from("x")));
        assert_eq!(Value::from_json(&json!(null)), None);
        assert_eq!(Value::from_json(&json!([1])), None);
    }

    #[test]
    fn fractional_numbers_truncate() {
        assert_eq!(Value::from_json(&json!(2.9)), Some(Value::Number(2)));
        assert_eq!(Value::from_json(&json!(-2.9)), Some(Value::Number(-2)));
    }

    #[test]
    fn oversized_numbers_saturate() {
        assert_eq!(
            Value::from_json(&json!(u64::MAX)),
            Some(Value::Number(i64::MAX))
        );
    }

    #[test]
    fn numeric_strings_count_as_numbers() {
        assert_eq!(Value::from(" 12 ").as_number(), Some(12));
        assert_eq!(Value::from("twelve").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), None);
    }

    #[test]
    fn untagged_serialization_is_plain() {
        let json = serde_json::to_string(&Variable::Number(3)).expect("serialize");
        assert_eq!(json, "3");
        let back: Variable = serde_json::from_str("\"gold\"").expect("deserialize");
        assert_eq!(back, Variable::Text("gold".to_string()));
    }
}
