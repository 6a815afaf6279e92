//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Context;
use crate::saves::SaveStore;
use plotline_core::{
    Graph, NarrativeEngine, PlotlineError, Turn, canonical_checksum, export_string,
    normalize_str, story_hash, unreachable_nodes, validate,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum story file size (16 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
pub const MAX_STORY_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), PlotlineError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| PlotlineError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(PlotlineError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path.
///
/// Canonicalizes the path to resolve symlinks and "..", and requires a
/// regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, PlotlineError> {
    let canonical = path.canonicalize().map_err(|e| {
        PlotlineError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(PlotlineError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path. The parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, PlotlineError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        PlotlineError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(PlotlineError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PlotlineError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// STORY LOADING
// =============================================================================

/// Read and normalize a story file.
pub fn load_story(path: &Path) -> Result<Graph, PlotlineError> {
    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, MAX_STORY_FILE_SIZE)?;

    let text = std::fs::read_to_string(&validated_path)
        .map_err(|e| PlotlineError::IoError(format!("Read file: {}", e)))?;
    let graph = normalize_str(&text)?;

    tracing::info!(
        story = graph.title(),
        nodes = graph.node_count(),
        choices = graph.choice_count(),
        "story loaded"
    );
    Ok(graph)
}

/// Log every defect; in strict mode any defect blocks play.
fn check_playable(ctx: &Context, graph: &Graph) -> Result<(), PlotlineError> {
    let defects = validate(graph);
    for defect in &defects {
        tracing::warn!(kind = ?defect.kind, "{}", defect);
    }
    if ctx.strict && !defects.is_empty() {
        return Err(PlotlineError::InvalidStory(defects.len()));
    }
    Ok(())
}

fn print_turn(graph: &Graph, turn: &Turn) {
    for warning in &turn.warnings {
        tracing::warn!("effect skipped: {}", warning);
    }

    if !turn.is_game_over
        && let Some(title) = graph
            .node(turn.state.current_node_id().as_str())
            .and_then(|n| n.title.as_deref())
    {
        println!("== {} ==", title);
    }
    for line in &turn.text {
        println!("{}", line);
    }
    println!();

    if turn.is_game_over {
        println!("*** THE END ***");
    } else if turn.available_choices.is_empty() {
        println!("(no choices available)");
    } else {
        for choice in &turn.available_choices {
            println!(
                "  [{}] {}",
                choice.id,
                choice.text.as_deref().unwrap_or("...")
            );
        }
    }
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Report every defect and unreachable node.
///
/// Fails with `InvalidStory` after printing when defects exist, so the exit
/// status reflects the result.
pub fn cmd_validate(ctx: &Context, file: &Path) -> Result<(), PlotlineError> {
    let graph = load_story(file)?;
    let defects = validate(&graph);
    let unreachable = unreachable_nodes(&graph);

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "title": graph.title(),
            "nodes": graph.node_count(),
            "choices": graph.choice_count(),
            "valid": defects.is_empty(),
            "defects": defects,
            "unreachable": unreachable,
        }));
    } else {
        println!("Story:   {}", graph.title());
        println!("Nodes:   {}", graph.node_count());
        println!("Choices: {}", graph.choice_count());
        println!();
        if defects.is_empty() {
            println!("No defects found.");
        } else {
            println!("{} defect(s):", defects.len());
            for defect in &defects {
                println!("  - {}", defect);
            }
        }
        if !unreachable.is_empty() {
            println!();
            println!("Unreachable from the start node:");
            for id in &unreachable {
                println!("  - {}", id);
            }
        }
    }

    if !defects.is_empty() {
        return Err(PlotlineError::InvalidStory(defects.len()));
    }
    Ok(())
}

// =============================================================================
// NORMALIZE COMMAND
// =============================================================================

/// Write the canonical export to `output`, or stdout.
pub fn cmd_normalize(
    ctx: &Context,
    file: &Path,
    output: Option<&Path>,
) -> Result<(), PlotlineError> {
    let graph = load_story(file)?;
    let text = export_string(&graph)?;

    let Some(output) = output else {
        println!("{}", text);
        return Ok(());
    };

    let validated_output = validate_output_path(output)?;
    std::fs::write(&validated_output, &text)
        .map_err(|e| PlotlineError::IoError(format!("Write file: {}", e)))?;
    let checksum = canonical_checksum(&graph);

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "output": validated_output.to_string_lossy(),
            "bytes": text.len(),
            "checksum": format!("{:016x}", checksum),
        }));
    } else {
        println!("Wrote {} bytes to {:?}", text.len(), validated_output);
        println!("Checksum: {:016x}", checksum);
    }
    Ok(())
}

// =============================================================================
// PLAY COMMAND
// =============================================================================

/// Start a session, or continue the one saved in `slot`, then take `choices`.
///
/// A save made against a different version of the story is replayed first;
/// it is only continued when its history still holds.
pub fn cmd_play(
    ctx: &Context,
    file: &Path,
    slot: Option<&str>,
    choices: &[String],
) -> Result<(), PlotlineError> {
    let graph = load_story(file)?;
    check_playable(ctx, &graph)?;

    let engine = NarrativeEngine::new(&graph);
    let checksum = canonical_checksum(&graph);
    let store = slot.map(|_| SaveStore::open(&ctx.saves)).transpose()?;

    let mut turn = match (&store, slot) {
        (Some(store), Some(name)) if store.contains(name)? => {
            let saved = store.get(name)?;
            let session = if saved.story_checksum == checksum {
                saved.session
            } else {
                tracing::warn!(slot = name, "story changed since save, replaying history");
                engine.replay(&saved.session)?
            };
            tracing::info!(slot = name, turns = session.history().len(), "slot resumed");
            engine.resume(session)
        }
        _ => engine.start()?,
    };

    if !ctx.json_mode {
        print_turn(&graph, &turn);
    }
    for id in choices {
        turn = engine.choose(&turn.state, id)?;
        if !ctx.json_mode {
            println!();
            println!("> {}", id);
            print_turn(&graph, &turn);
        }
    }

    if let (Some(store), Some(name)) = (&store, slot) {
        store.put(name, &turn.state, checksum)?;
        if !ctx.json_mode {
            println!();
            println!("Saved to slot '{}'.", name);
        }
    }

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "slot": slot,
            "turn": turn,
        }));
    }
    Ok(())
}

// =============================================================================
// UNDO COMMAND
// =============================================================================

/// Step a saved session back by `steps` transitions and save it.
pub fn cmd_undo(ctx: &Context, slot: &str, steps: usize) -> Result<(), PlotlineError> {
    let store = SaveStore::open(&ctx.saves)?;
    let saved = store.get(slot)?;

    let before = saved.session.history().len();
    let session = saved.session.undo(steps);
    let after = session.history().len();
    store.put(slot, &session, saved.story_checksum)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "slot": slot,
            "undone": before - after,
            "turns": after,
            "node": session.current_node_id(),
        }));
    } else {
        println!(
            "Rewound '{}' by {} step(s): turn {} at node '{}'",
            slot,
            before - after,
            after,
            session.current_node_id()
        );
    }
    Ok(())
}

// =============================================================================
// REPLAY COMMAND
// =============================================================================

/// Replay the history saved in `slot` against the story in `file`.
pub fn cmd_replay(ctx: &Context, file: &Path, slot: &str) -> Result<(), PlotlineError> {
    let graph = load_story(file)?;
    let store = SaveStore::open(&ctx.saves)?;
    let saved = store.get(slot)?;

    let checksum = canonical_checksum(&graph);
    if saved.story_checksum != checksum {
        tracing::warn!(
            slot,
            saved = %format_args!("{:016x}", saved.story_checksum),
            current = %format_args!("{:016x}", checksum),
            "story checksum differs from save"
        );
    }

    let replayed = NarrativeEngine::new(&graph).replay(&saved.session)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "slot": slot,
            "verified": true,
            "transitions": replayed.history().len(),
            "node": replayed.current_node_id(),
            "ended": replayed.is_ended(),
            "checksumMatches": saved.story_checksum == checksum,
        }));
    } else {
        println!(
            "Replay verified: {} transition(s), now at '{}'{}",
            replayed.history().len(),
            replayed.current_node_id(),
            if replayed.is_ended() { " (ended)" } else { "" }
        );
    }
    Ok(())
}

// =============================================================================
// SAVES COMMAND
// =============================================================================

/// List save slots, or delete one.
pub fn cmd_saves(ctx: &Context, delete: Option<&str>) -> Result<(), PlotlineError> {
    let store = SaveStore::open(&ctx.saves)?;

    if let Some(name) = delete {
        if !store.delete(name)? {
            return Err(PlotlineError::SlotNotFound(name.to_string()));
        }
        if ctx.json_mode {
            print_json(&serde_json::json!({ "deleted": name }));
        } else {
            println!("Deleted slot '{}'.", name);
        }
        return Ok(());
    }

    let slots = store.list()?;
    if ctx.json_mode {
        print_json(&serde_json::json!({
            "database": ctx.saves.to_string_lossy(),
            "slots": slots,
        }));
        return Ok(());
    }

    if slots.is_empty() {
        println!("No save slots in {:?}", ctx.saves);
        return Ok(());
    }
    println!("Save slots in {:?}", ctx.saves);
    for slot in &slots {
        println!(
            "  {:<20} turn {:>4}  at '{}'{}",
            slot.name,
            slot.turns,
            slot.node,
            if slot.ended { " (ended)" } else { "" }
        );
    }
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print the canonical checksum and BLAKE3 hash of a story.
pub fn cmd_hash(ctx: &Context, file: &Path) -> Result<(), PlotlineError> {
    let graph = load_story(file)?;
    let checksum = canonical_checksum(&graph);
    let hash = story_hash(&graph);

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "title": graph.title(),
            "checksum": format!("{:016x}", checksum),
            "blake3": hash,
        }));
    } else {
        println!("Checksum: {:016x}", checksum);
        println!("BLAKE3:   {}", hash);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
