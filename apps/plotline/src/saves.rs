//! # Save Slots
//!
//! Named play sessions persisted in a redb database.
//!
//! Each slot stores the binary session encoding from `plotline-core` next to
//! the canonical checksum of the story it was played against, so a save can
//! be checked before it is resumed or replayed.
//!
//! ## Tables
//!
//! - `slots`: slot name -> `PLOT` header + postcard session
//! - `story_checksums`: slot name -> canonical story checksum

use plotline_core::{PlotlineError, SessionState, session_from_bytes, session_to_bytes};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use std::path::Path;

// =============================================================================
// TABLE DEFINITIONS
// =============================================================================

const SLOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("slots");

const CHECKSUMS: TableDefinition<&str, u64> = TableDefinition::new("story_checksums");

/// Maximum slot name length in bytes.
pub const MAX_SLOT_NAME_LENGTH: usize = 128;

// =============================================================================
// RECORDS
// =============================================================================

/// A session loaded from a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub session: SessionState,
    pub story_checksum: u64,
}

/// One line of the slot listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub name: String,
    pub node: String,
    pub turns: usize,
    pub ended: bool,
    pub story_checksum: u64,
}

fn io_error(e: impl std::fmt::Display) -> PlotlineError {
    PlotlineError::IoError(e.to_string())
}

/// Reject names that cannot be typed back on the command line.
pub fn validate_slot_name(name: &str) -> Result<(), PlotlineError> {
    if name.trim().is_empty() {
        return Err(PlotlineError::IoError(
            "Slot name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_SLOT_NAME_LENGTH {
        return Err(PlotlineError::IoError(format!(
            "Slot name exceeds {} bytes",
            MAX_SLOT_NAME_LENGTH
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(PlotlineError::IoError(
            "Slot name contains control characters".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// STORE
// =============================================================================

/// redb-backed save slots.
pub struct SaveStore {
    db: Database,
}

impl SaveStore {
    /// Open or create the database at `path`, creating both tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlotlineError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        let write_txn = db.begin_write().map_err(io_error)?;
        {
            let _ = write_txn.open_table(SLOTS).map_err(io_error)?;
            let _ = write_txn.open_table(CHECKSUMS).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        Ok(Self { db })
    }

    /// Write `session` to `name`, replacing any previous save.
    pub fn put(
        &self,
        name: &str,
        session: &SessionState,
        story_checksum: u64,
    ) -> Result<(), PlotlineError> {
        validate_slot_name(name)?;
        let bytes = session_to_bytes(session)?;

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut slots = write_txn.open_table(SLOTS).map_err(io_error)?;
            slots.insert(name, bytes.as_slice()).map_err(io_error)?;
            let mut checksums = write_txn.open_table(CHECKSUMS).map_err(io_error)?;
            checksums.insert(name, story_checksum).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        tracing::debug!(slot = name, turns = session.history().len(), "slot saved");
        Ok(())
    }

    /// Load `name`, or `SlotNotFound`.
    pub fn get(&self, name: &str) -> Result<SavedSession, PlotlineError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let slots = read_txn.open_table(SLOTS).map_err(io_error)?;
        let checksums = read_txn.open_table(CHECKSUMS).map_err(io_error)?;

        let session = match slots.get(name).map_err(io_error)? {
            Some(bytes) => session_from_bytes(bytes.value())?,
            None => return Err(PlotlineError::SlotNotFound(name.to_string())),
        };
        let story_checksum = checksums
            .get(name)
            .map_err(io_error)?
            .map(|v| v.value())
            .unwrap_or(0);

        Ok(SavedSession {
            session,
            story_checksum,
        })
    }

    pub fn contains(&self, name: &str) -> Result<bool, PlotlineError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let slots = read_txn.open_table(SLOTS).map_err(io_error)?;
        Ok(slots.get(name).map_err(io_error)?.is_some())
    }

    /// All slots in name order.
    ///
    /// Slots whose payload no longer decodes are skipped with a warning.
    pub fn list(&self) -> Result<Vec<SlotSummary>, PlotlineError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let slots = read_txn.open_table(SLOTS).map_err(io_error)?;
        let checksums = read_txn.open_table(CHECKSUMS).map_err(io_error)?;

        let mut summaries = Vec::new();
        for entry in slots.iter().map_err(io_error)? {
            let (key, value) = entry.map_err(io_error)?;
            let name = key.value().to_string();
            let session = match session_from_bytes(value.value()) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(slot = %name, error = %e, "skipping unreadable slot");
                    continue;
                }
            };
            let story_checksum = checksums
                .get(name.as_str())
                .map_err(io_error)?
                .map(|v| v.value())
                .unwrap_or(0);
            summaries.push(SlotSummary {
                node: session.current_node_id().to_string(),
                turns: session.history().len(),
                ended: session.is_ended(),
                story_checksum,
                name,
            });
        }
        Ok(summaries)
    }

    /// Remove `name`. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, PlotlineError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let existed = {
            let mut slots = write_txn.open_table(SLOTS).map_err(io_error)?;
            let existed = slots.remove(name).map_err(io_error)?.is_some();
            let mut checksums = write_txn.open_table(CHECKSUMS).map_err(io_error)?;
            checksums.remove(name).map_err(io_error)?;
            existed
        };
        write_txn.commit().map_err(io_error)?;
        Ok(existed)
    }
}
