//! # plotline
//!
//! The application layer around `plotline-core`.
//!
//! - `cli` - clap commands for validating, normalizing and playing stories
//! - `config` - `plotline.toml` loading with environment overrides
//! - `saves` - redb-backed named save slots
//!
//! This is the only part of Plotline that touches the filesystem.

pub mod cli;
pub mod config;
pub mod saves;
