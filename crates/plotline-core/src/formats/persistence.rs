//! # Save Format
//!
//! Binary and JSON encodings of a `SessionState`.
//!
//! File I/O is in the app layer; these are pure transformations.
//!
//! Binary format: Header (5 bytes) + postcard-serialized session.
//! - 4 bytes: Magic ("PLOT")
//! - 1 byte: Version
//!
//! postcard is not self-describing, so the payload goes through explicitly
//! tagged mirror types instead of the untagged serde layout used for JSON.
//! Size and header are checked before any payload decoding.

use crate::graph::NodeId;
use crate::primitives::{self, MAX_SAVE_PAYLOAD_SIZE};
use crate::state::{HistoryEntry, SessionState, Snapshot};
use crate::{PlotlineError, Variable};
use serde::{Deserialize, Serialize};

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The save header precedes all session data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SaveHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), PlotlineError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(PlotlineError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(PlotlineError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [a, b, c, d] = self.magic;
        [a, b, c, d, self.version]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PlotlineError> {
        match bytes {
            [a, b, c, d, version, ..] => Ok(Self {
                magic: [*a, *b, *c, *d],
                version: *version,
            }),
            _ => Err(PlotlineError::DeserializationError(
                "Header too short".to_string(),
            )),
        }
    }
}

impl Default for SaveHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// STORED LAYOUT
// =============================================================================

#[derive(Serialize, Deserialize)]
enum StoredVariable {
    Number(i64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    current_node_id: String,
    ended: bool,
    flags: Vec<(String, bool)>,
    variables: Vec<(String, StoredVariable)>,
    inventory: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    from_node: String,
    choice_id: String,
    to_node: Option<String>,
    snapshot_before: StoredSnapshot,
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    snapshot: StoredSnapshot,
    history: Vec<StoredEntry>,
}

impl From<&Snapshot> for StoredSnapshot {
    fn from(s: &Snapshot) -> Self {
        Self {
            current_node_id: s.current_node_id().to_string(),
            ended: s.is_ended(),
            flags: s.flags().iter().map(|(k, v)| (k.clone(), *v)).collect(),
            variables: s
                .variables()
                .iter()
                .map(|(k, v)| {
                    let stored = match v {
                        Variable::Number(n) => StoredVariable::Number(*n),
                        Variable::Text(t) => StoredVariable::Text(t.clone()),
                    };
                    (k.clone(), stored)
                })
                .collect(),
            inventory: s.inventory().iter().cloned().collect(),
        }
    }
}

impl From<StoredSnapshot> for Snapshot {
    fn from(s: StoredSnapshot) -> Self {
        let mut snapshot = Snapshot::new(NodeId(s.current_node_id));
        for (name, value) in s.flags {
            snapshot = snapshot.with_flag(name, value);
        }
        for (name, value) in s.variables {
            let value = match value {
                StoredVariable::Number(n) => Variable::Number(n),
                StoredVariable::Text(t) => Variable::Text(t),
            };
            snapshot = snapshot.with_variable(name, value);
        }
        for item in s.inventory {
            snapshot = snapshot.with_item(item);
        }
        if s.ended { snapshot.finished() } else { snapshot }
    }
}

impl From<&SessionState> for StoredSession {
    fn from(state: &SessionState) -> Self {
        Self {
            snapshot: StoredSnapshot::from(state.snapshot()),
            history: state
                .history()
                .iter()
                .map(|e| StoredEntry {
                    from_node: e.from_node.to_string(),
                    choice_id: e.choice_id.clone(),
                    to_node: e.to_node.as_ref().map(NodeId::to_string),
                    snapshot_before: StoredSnapshot::from(&e.snapshot_before),
                })
                .collect(),
        }
    }
}

impl From<StoredSession> for SessionState {
    fn from(s: StoredSession) -> Self {
        let history = s
            .history
            .into_iter()
            .map(|e| HistoryEntry {
                from_node: NodeId(e.from_node),
                choice_id: e.choice_id,
                to_node: e.to_node.map(NodeId),
                snapshot_before: Snapshot::from(e.snapshot_before),
            })
            .collect();
        SessionState::from_parts(Snapshot::from(s.snapshot), history)
    }
}

// =============================================================================
// BINARY
// =============================================================================

/// Serialize a session to bytes (header + payload).
pub fn session_to_bytes(state: &SessionState) -> Result<Vec<u8>, PlotlineError> {
    let payload = postcard::to_stdvec(&StoredSession::from(state))
        .map_err(|e| PlotlineError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&SaveHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a session from bytes.
///
/// Rejects data that is too short, larger than `MAX_SAVE_PAYLOAD_SIZE`, or
/// carries a foreign header, all before the payload is decoded.
pub fn session_from_bytes(bytes: &[u8]) -> Result<SessionState, PlotlineError> {
    if bytes.len() > MAX_SAVE_PAYLOAD_SIZE {
        return Err(PlotlineError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SAVE_PAYLOAD_SIZE
        )));
    }

    let header = SaveHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    let stored: StoredSession = postcard::from_bytes(payload).map_err(|e| {
        PlotlineError::DeserializationError(format!("Failed to decode session: {e}"))
    })?;
    Ok(SessionState::from(stored))
}

// =============================================================================
// JSON
// =============================================================================

/// Session as pretty-printed JSON in the persisted session layout.
pub fn session_to_json(state: &SessionState) -> Result<String, PlotlineError> {
    serde_json::to_string_pretty(state).map_err(|e| PlotlineError::SerializationError(e.to_string()))
}

pub fn session_from_json(text: &str) -> Result<SessionState, PlotlineError> {
    serde_json::from_str(text).map_err(|e| PlotlineError::DeserializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
