//! Tests for the redb-backed save slot store.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use plotline::saves::SaveStore;
use plotline_core::{Choice, Graph, NarrativeEngine, Node, PlotlineError, SessionState};
use tempfile::tempdir;

fn story() -> Graph {
    Graph::new(
        Some("Slots".to_string()),
        vec![
            Node::new("a", "A", "First room.").with_choice(Choice::to("go", "Go on", "b")),
            Node::new("b", "B", "Second room.")
                .with_choice(Choice::to("back", "Go back", "a"))
                .with_choice(Choice::ending("stop", "Stop here")),
        ],
    )
}

fn played(choices: &[&str]) -> SessionState {
    let graph = story();
    NarrativeEngine::new(&graph).play(choices).unwrap().state
}

#[test]
fn test_put_then_get() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();
    let state = played(&["go", "back", "go"]);

    store.put("main", &state, 42).unwrap();
    let saved = store.get("main").unwrap();

    assert_eq!(saved.session, state);
    assert_eq!(saved.story_checksum, 42);
    assert!(store.contains("main").unwrap());
}

#[test]
fn test_missing_slot() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();

    assert!(matches!(
        store.get("nope"),
        Err(PlotlineError::SlotNotFound(name)) if name == "nope"
    ));
    assert!(!store.contains("nope").unwrap());
}

#[test]
fn test_put_overwrites() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();

    store.put("main", &played(&["go"]), 1).unwrap();
    store.put("main", &played(&["go", "stop"]), 2).unwrap();

    let saved = store.get("main").unwrap();
    assert!(saved.session.is_ended());
    assert_eq!(saved.story_checksum, 2);
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_list_in_name_order() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();

    store.put("zeta", &played(&[]), 7).unwrap();
    store.put("alpha", &played(&["go", "stop"]), 7).unwrap();

    let slots = store.list().unwrap();
    let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);

    assert_eq!(slots[0].turns, 2);
    assert!(slots[0].ended);
    assert_eq!(slots[1].node, "a");
    assert_eq!(slots[1].turns, 0);
}

#[test]
fn test_delete() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();

    store.put("main", &played(&["go"]), 1).unwrap();
    assert!(store.delete("main").unwrap());
    assert!(!store.delete("main").unwrap());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("saves.db");
    let state = played(&["go", "back"]);

    {
        let store = SaveStore::open(&path).unwrap();
        store.put("main", &state, 9).unwrap();
    }

    let reopened = SaveStore::open(&path).unwrap();
    assert_eq!(reopened.get("main").unwrap().session, state);
}

#[test]
fn test_invalid_slot_name_rejected() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open(dir.path().join("saves.db")).unwrap();
    assert!(store.put("", &played(&[]), 0).is_err());
}
