//! # Plotline CLI Module
//!
//! This module implements the CLI interface for Plotline.
//!
//! ## Available Commands
//!
//! - `validate` - Report structural defects of a story
//! - `normalize` - Write the canonical form of a story
//! - `play` - Start or continue a session, taking choices by id
//! - `undo` - Step a saved session back
//! - `replay` - Verify a saved session against its story
//! - `saves` - List or delete save slots
//! - `hash` - Story checksum and BLAKE3 hash

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use plotline_core::PlotlineError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Plotline - branching story engine
///
/// Validates, normalizes and plays interactive fiction written in any of
/// the supported JSON dialects.
#[derive(Parser, Debug)]
#[command(name = "plotline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to plotline.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the save slot database (overrides config and PLOTLINE_SAVES)
    #[arg(short = 'S', long, global = true)]
    pub saves: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report every structural defect of a story
    Validate {
        /// Path to the story JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Write the canonical form of a story
    Normalize {
        /// Path to the story JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start or continue a session
    Play {
        /// Path to the story JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Save slot to continue from and write back to
        #[arg(short, long)]
        slot: Option<String>,

        /// Choice ids to take, in order
        #[arg(long = "choose", num_args = 1..)]
        choose: Vec<String>,
    },

    /// Step a saved session back
    Undo {
        /// Save slot
        #[arg(short, long)]
        slot: String,

        /// Number of transitions to undo
        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// Verify a saved session by replaying its history
    Replay {
        /// Path to the story JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Save slot
        #[arg(short, long)]
        slot: String,
    },

    /// List save slots
    Saves {
        /// Delete this slot instead of listing
        #[arg(long)]
        delete: Option<String>,
    },

    /// Compute the checksum and BLAKE3 hash of a story's canonical form
    Hash {
        /// Path to the story JSON
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Settings every command may need, resolved from flags and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub json_mode: bool,
    pub strict: bool,
    pub saves: PathBuf,
}

impl Context {
    /// CLI flags win over config.
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            json_mode: cli.json_mode,
            strict: config.engine.strict,
            saves: cli
                .saves
                .clone()
                .unwrap_or_else(|| config.saves.database.clone()),
        }
    }
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), PlotlineError> {
    let ctx = Context::resolve(&cli, config);

    match cli.command {
        Some(Commands::Validate { file }) => cmd_validate(&ctx, &file),
        Some(Commands::Normalize { file, output }) => {
            cmd_normalize(&ctx, &file, output.as_deref())
        }
        Some(Commands::Play { file, slot, choose }) => {
            cmd_play(&ctx, &file, slot.as_deref(), &choose)
        }
        Some(Commands::Undo { slot, steps }) => cmd_undo(&ctx, &slot, steps),
        Some(Commands::Replay { file, slot }) => cmd_replay(&ctx, &file, &slot),
        Some(Commands::Saves { delete }) => cmd_saves(&ctx, delete.as_deref()),
        Some(Commands::Hash { file }) => cmd_hash(&ctx, &file),
        None => {
            // No subcommand - list save slots by default
            cmd_saves(&ctx, None)
        }
    }
}
