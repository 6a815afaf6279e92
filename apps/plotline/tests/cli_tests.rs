//! Tests for CLI argument parsing and command execution.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use plotline::cli::{
    Cli, Commands, Context, cmd_normalize, cmd_play, cmd_replay, cmd_saves, cmd_undo,
    cmd_validate, load_story,
};
use plotline::config::Config;
use plotline::saves::SaveStore;
use plotline_core::{EngineError, PlotlineError, canonical_checksum};
use std::path::PathBuf;
use tempfile::TempDir;

const STORY: &str = r#"{
    "title": "Lighthouse",
    "branches": [
        {
            "branch_id": "shore", "branch_title": "Shore", "content": "Waves.",
            "options": [
                { "option_id": "climb", "option_text": "Climb", "target_branch_id": "tower",
                  "status_changes": [{ "attribute": "stamina", "operation": "-", "value": 1 }] }
            ]
        },
        {
            "branch_id": "tower", "branch_title": "Tower", "content": "A lamp.",
            "options": [
                { "option_id": "light", "option_text": "Light it", "end_game": true },
                { "option_id": "down", "option_text": "Go down", "target_branch_id": "shore" }
            ]
        }
    ]
}"#;

const BROKEN_STORY: &str = r#"{
    "title": "Broken",
    "branches": [
        { "branch_id": "a", "content": "A",
          "options": [{ "option_id": "go", "target_branch_id": "ghost" },
                      { "option_id": "end", "end_game": true }] }
    ]
}"#;

fn workspace(story: &str) -> (TempDir, PathBuf, Context) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("story.json");
    std::fs::write(&file, story).unwrap();
    let ctx = Context {
        json_mode: true,
        strict: true,
        saves: dir.path().join("saves.db"),
    };
    (dir, file, ctx)
}

fn choices(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_parse_play() {
    let cli = Cli::try_parse_from([
        "plotline", "play", "-f", "story.json", "--slot", "main", "--choose", "climb", "light",
    ])
    .unwrap();

    match cli.command {
        Some(Commands::Play { file, slot, choose }) => {
            assert_eq!(file, PathBuf::from("story.json"));
            assert_eq!(slot.as_deref(), Some("main"));
            assert_eq!(choose, vec!["climb", "light"]);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_parse_undo_default_steps() {
    let cli = Cli::try_parse_from(["plotline", "undo", "--slot", "main"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Undo { ref slot, steps: 1 }) if slot == "main"
    ));
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "plotline", "saves", "--json-mode", "--saves", "x.db", "-q",
    ])
    .unwrap();
    assert!(cli.json_mode);
    assert!(cli.quiet);
    assert_eq!(cli.saves, Some(PathBuf::from("x.db")));
}

#[test]
fn test_replay_requires_slot() {
    assert!(Cli::try_parse_from(["plotline", "replay", "-f", "story.json"]).is_err());
}

#[test]
fn test_saves_flag_overrides_config() {
    let config = Config::default();
    let cli = Cli::try_parse_from(["plotline", "saves"]).unwrap();
    assert_eq!(Context::resolve(&cli, &config).saves, config.saves.database);

    let cli = Cli::try_parse_from(["plotline", "-S", "other.db", "saves"]).unwrap();
    assert_eq!(
        Context::resolve(&cli, &config).saves,
        PathBuf::from("other.db")
    );
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_validate_clean_story() {
    let (_dir, file, ctx) = workspace(STORY);
    cmd_validate(&ctx, &file).unwrap();
}

#[test]
fn test_validate_reports_defects_as_failure() {
    let (_dir, file, ctx) = workspace(BROKEN_STORY);
    assert!(matches!(
        cmd_validate(&ctx, &file),
        Err(PlotlineError::InvalidStory(1))
    ));
}

#[test]
fn test_non_json_input_is_rejected() {
    let (_dir, file, ctx) = workspace("not json");
    assert!(matches!(
        cmd_validate(&ctx, &file),
        Err(PlotlineError::Normalize(_))
    ));
}

#[test]
fn test_normalize_writes_canonical_file() {
    let (dir, file, ctx) = workspace(STORY);
    let output = dir.path().join("canonical.json");
    cmd_normalize(&ctx, &file, Some(output.as_path())).unwrap();

    let original = load_story(&file).unwrap();
    let canonical = load_story(&output).unwrap();
    assert_eq!(canonical, original);
}

#[test]
fn test_strict_mode_blocks_defective_story() {
    let (_dir, file, ctx) = workspace(BROKEN_STORY);
    assert!(matches!(
        cmd_play(&ctx, &file, None, &[]),
        Err(PlotlineError::InvalidStory(_))
    ));

    let lenient = Context {
        strict: false,
        ..ctx
    };
    cmd_play(&lenient, &file, None, &choices(&["end"])).unwrap();
}

#[test]
fn test_play_saves_and_continues_slot() {
    let (_dir, file, ctx) = workspace(STORY);

    cmd_play(&ctx, &file, Some("main"), &choices(&["climb"])).unwrap();
    cmd_play(&ctx, &file, Some("main"), &choices(&["down", "climb"])).unwrap();

    let store = SaveStore::open(&ctx.saves).unwrap();
    let saved = store.get("main").unwrap();
    assert_eq!(saved.session.history().len(), 3);
    assert_eq!(saved.session.current_node_id().as_str(), "tower");
    assert_eq!(
        saved.story_checksum,
        canonical_checksum(&load_story(&file).unwrap())
    );
}

#[test]
fn test_invalid_choice_is_not_saved() {
    let (_dir, file, ctx) = workspace(STORY);
    cmd_play(&ctx, &file, Some("main"), &choices(&["climb"])).unwrap();

    let err = cmd_play(&ctx, &file, Some("main"), &choices(&["climb"])).unwrap_err();
    assert!(matches!(
        err,
        PlotlineError::Engine(EngineError::InvalidChoice { .. })
    ));

    let store = SaveStore::open(&ctx.saves).unwrap();
    assert_eq!(store.get("main").unwrap().session.history().len(), 1);
}

#[test]
fn test_undo_then_replay() {
    let (_dir, file, ctx) = workspace(STORY);
    cmd_play(&ctx, &file, Some("main"), &choices(&["climb", "down", "climb"])).unwrap();

    cmd_undo(&ctx, "main", 2).unwrap();
    {
        let store = SaveStore::open(&ctx.saves).unwrap();
        let saved = store.get("main").unwrap();
        assert_eq!(saved.session.history().len(), 1);
        assert_eq!(saved.session.current_node_id().as_str(), "tower");
    }

    cmd_replay(&ctx, &file, "main").unwrap();
}

#[test]
fn test_replay_detects_changed_story() {
    let (_dir, file, ctx) = workspace(STORY);
    cmd_play(&ctx, &file, Some("main"), &choices(&["climb"])).unwrap();

    std::fs::write(&file, STORY.replace("\"value\": 1", "\"value\": 4")).unwrap();
    assert!(matches!(
        cmd_replay(&ctx, &file, "main"),
        Err(PlotlineError::Engine(EngineError::ReplayDivergence { .. }))
    ));
}

#[test]
fn test_saves_delete() {
    let (_dir, file, ctx) = workspace(STORY);
    cmd_play(&ctx, &file, Some("main"), &[]).unwrap();

    cmd_saves(&ctx, Some("main")).unwrap();
    assert!(matches!(
        cmd_saves(&ctx, Some("main")),
        Err(PlotlineError::SlotNotFound(_))
    ));
    cmd_saves(&ctx, None).unwrap();
}

#[test]
fn test_undo_missing_slot() {
    let (_dir, _file, ctx) = workspace(STORY);
    assert!(matches!(
        cmd_undo(&ctx, "ghost", 1),
        Err(PlotlineError::SlotNotFound(_))
    ));
}

#[test]
fn test_missing_story_file() {
    let (dir, _file, ctx) = workspace(STORY);
    assert!(matches!(
        cmd_validate(&ctx, &dir.path().join("absent.json")),
        Err(PlotlineError::IoError(_))
    ));
}
