//! # Property-Based Tests
//!
//! Verification tests using proptest.
//!
//! These tests ensure determinism and correctness invariants over generated
//! stories written in mixed dialects.

use plotline_core::{
    Condition, DefectKind, NarrativeEngine, Snapshot, Turn, condition, export, normalize,
    session_from_bytes, session_to_bytes, validate,
};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::{Map, Value as Json, json};

// =============================================================================
// GENERATORS
// =============================================================================

const IDS: [&str; 5] = ["n0", "n1", "n2", "n3", "n4"];

/// One generated choice: (dialect, target slot, terminal flag, condition, mutation slot).
type ChoiceShape = (bool, Option<usize>, Option<bool>, Option<usize>, usize);

fn choice_strategy() -> impl Strategy<Value = ChoiceShape> {
    (
        any::<bool>(),
        prop::option::of(0usize..7),
        prop::option::of(any::<bool>()),
        prop::option::of(0usize..4),
        0usize..6,
    )
}

fn node_strategy() -> impl Strategy<Value = (bool, Option<usize>, Vec<ChoiceShape>)> {
    (
        any::<bool>(),
        prop::option::of(0usize..IDS.len()),
        vec(choice_strategy(), 0..4),
    )
}

fn target_json(slot: usize) -> Json {
    match slot {
        // Slot 5 is an empty target, slot 6 a node that never exists.
        5 => json!(""),
        6 => json!("ghost"),
        i => json!(IDS[i]),
    }
}

fn condition_text(slot: usize) -> &'static str {
    ["lit", "!lit", "gold >= 2", "has(key) || gold < 1"][slot]
}

fn mutation_json(slot: usize) -> Json {
    match slot {
        0 => json!({ "attribute": "lit", "operation": "=", "value": true }),
        1 => json!({ "attribute": "gold", "operation": "+", "value": 1 }),
        2 => json!({ "state_id": "gold", "operation": "subtract", "value": "1" }),
        3 => json!({ "attribute": "key", "operation": "gain" }),
        4 => json!({ "attribute": "key", "operation": "lose" }),
        _ => json!({ "attribute": "broken" }),
    }
}

fn build_story(nodes: &[(bool, Option<usize>, Vec<ChoiceShape>)]) -> Json {
    let branches: Vec<Json> = nodes
        .iter()
        .map(|(legacy, id, choices)| {
            let mut node = Map::new();
            if let Some(i) = id {
                node.insert((if *legacy { "branch_id" } else { "id" }).into(), json!(IDS[*i]));
            }
            node.insert(
                (if *legacy { "content" } else { "text" }).into(),
                json!(format!("body of {id:?}")),
            );
            let list: Vec<Json> = choices
                .iter()
                .enumerate()
                .map(|(c, (legacy_choice, target, terminal, cond, mutation))| {
                    let mut choice = Map::new();
                    if c % 2 == 0 {
                        choice.insert("id".into(), json!(format!("c{c}")));
                    }
                    if let Some(slot) = target {
                        let key = if *legacy_choice { "target_branch_id" } else { "to" };
                        choice.insert(key.into(), target_json(*slot));
                    }
                    if let Some(flag) = terminal {
                        choice.insert("terminal".into(), json!(flag));
                    }
                    if let Some(slot) = cond {
                        choice.insert("condition".into(), json!(condition_text(*slot)));
                    }
                    choice.insert("status_changes".into(), json!([mutation_json(*mutation)]));
                    Json::Object(choice)
                })
                .collect();
            node.insert(
                (if *legacy { "options" } else { "choices" }).into(),
                Json::Array(list),
            );
            Json::Object(node)
        })
        .collect();
    json!({ "title": "Generated", "branches": branches })
}

/// Walk a story picking available choices by index until it ends or stalls.
fn walk(engine: &NarrativeEngine<'_>, picks: &[usize]) -> Option<(Turn, Vec<String>)> {
    let mut turn = engine.start().ok()?;
    let mut taken = Vec::new();
    for pick in picks {
        if turn.is_game_over || turn.available_choices.is_empty() {
            break;
        }
        let choice = &turn.available_choices[pick % turn.available_choices.len()];
        let id = choice.id.clone();
        match engine.choose(&turn.state, &id) {
            Ok(next) => {
                taken.push(id);
                turn = next;
            }
            // Dangling targets are rejected; try the next pick.
            Err(_) => continue,
        }
    }
    Some((turn, taken))
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Normalizing the canonical export reproduces the graph.
    #[test]
    fn normalization_is_idempotent(nodes in vec(node_strategy(), 0..6)) {
        let graph = normalize(&build_story(&nodes)).expect("normalize");
        let again = normalize(&export(&graph)).expect("renormalize");
        prop_assert_eq!(&again, &graph);
        prop_assert_eq!(validate(&again), validate(&graph));
    }

    /// Dangling targets are counted exactly: one per non-terminal choice whose
    /// target names no node.
    #[test]
    fn dangling_targets_counted_exactly(nodes in vec(node_strategy(), 1..6)) {
        let graph = normalize(&build_story(&nodes)).expect("normalize");
        let expected = graph
            .nodes()
            .iter()
            .flat_map(|n| &n.choices)
            .filter(|c| !c.terminal)
            .filter(|c| c.target.as_ref().is_some_and(|t| !graph.contains_node(t.as_str())))
            .count();
        let actual = validate(&graph)
            .iter()
            .filter(|d| d.kind == DefectKind::DanglingTarget)
            .count();
        prop_assert_eq!(actual, expected);
    }

    /// Replaying recorded history reproduces every snapshot.
    #[test]
    fn replay_law(nodes in vec(node_strategy(), 1..6), picks in vec(0usize..8, 0..20)) {
        let graph = normalize(&build_story(&nodes)).expect("normalize");
        let engine = NarrativeEngine::new(&graph);
        if let Some((turn, _)) = walk(&engine, &picks) {
            let replayed = engine.replay(&turn.state).expect("replay");
            prop_assert_eq!(replayed, turn.state);
        }
    }

    /// Rolling back to prefix k equals playing the first k choices.
    #[test]
    fn rollback_law(
        nodes in vec(node_strategy(), 1..6),
        picks in vec(0usize..8, 0..20),
        k in 0usize..20
    ) {
        let graph = normalize(&build_story(&nodes)).expect("normalize");
        let engine = NarrativeEngine::new(&graph);
        if let Some((turn, taken)) = walk(&engine, &picks) {
            let k = k.min(taken.len());
            let prefix = engine.play(&taken[..k]).expect("prefix");
            prop_assert_eq!(engine.rollback(&turn.state, k).state, prefix.state);
        }
    }

    /// Binary saves decode to the same session.
    #[test]
    fn binary_save_roundtrip(nodes in vec(node_strategy(), 1..6), picks in vec(0usize..8, 0..12)) {
        let graph = normalize(&build_story(&nodes)).expect("normalize");
        let engine = NarrativeEngine::new(&graph);
        if let Some((turn, _)) = walk(&engine, &picks) {
            let bytes = session_to_bytes(&turn.state).expect("encode");
            prop_assert_eq!(session_from_bytes(&bytes).expect("decode"), turn.state);
        }
    }

    /// The evaluator is total and deterministic on arbitrary text.
    #[test]
    fn evaluator_is_total(source in ".{0,64}") {
        let state = Snapshot::new("n0".into()).with_flag("lit", true);
        let first = condition::evaluate(Some(source.as_str()), &state);
        let second = condition::evaluate(Some(source.as_str()), &state);
        prop_assert_eq!(first, second);
        if Condition::parse(&source).is_err() {
            prop_assert!(!first);
        }
    }

    /// Negating a parseable condition flips its result.
    #[test]
    fn negation_flips(slot in 0usize..4, lit in any::<bool>(), gold in -3i64..5) {
        let state = Snapshot::new("n0".into())
            .with_flag("lit", lit)
            .with_variable("gold", plotline_core::Variable::Number(gold));
        let source = condition_text(slot);
        let plain = condition::evaluate(Some(source), &state);
        let negated = condition::evaluate(Some(format!("!({source})").as_str()), &state);
        prop_assert_eq!(plain, !negated);
    }
}
