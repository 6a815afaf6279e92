//! # Plotline - Branching Story Engine
//!
//! The main binary for Plotline.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │               apps/plotline (THE BINARY)              │
//! │                                                       │
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────────┐   │
//! │  │    CLI      │   │   Config    │   │ Save slots │   │
//! │  │   (clap)    │   │   (toml)    │   │   (redb)   │   │
//! │  └──────┬──────┘   └──────┬──────┘   └─────┬──────┘   │
//! │         └─────────────────┼────────────────┘          │
//! │                           ▼                           │
//! │                  ┌─────────────────┐                  │
//! │                  │  plotline-core  │                  │
//! │                  │   (THE LOGIC)   │                  │
//! │                  └─────────────────┘                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! plotline validate -f story.json
//! plotline play -f story.json --slot main --choose climb light
//! plotline undo --slot main --steps 1
//! plotline replay -f story.json --slot main
//! ```

use clap::Parser;
use plotline::cli::{self, Cli};
use plotline::config::{Config, LogConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Tracing is not up yet, so configuration errors go straight to stderr.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config.with_process_env(),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log, cli.verbose);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// RUST_LOG wins over the configured filter; `--verbose` wins over both.
fn init_tracing(log: &LogConfig, verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("plotline=debug,plotline_core=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| log.filter.as_str().into())
    };

    // Logs go to stderr so command output on stdout stays pipeable.
    match log.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the Plotline startup banner.
fn print_banner() {
    eprintln!(
        r#"
  ┌─┐┬  ┌─┐┌┬┐┬  ┬┌┐┌┌─┐
  ├─┘│  │ │ │ │  ││││├┤
  ┴  ┴─┘└─┘ ┴ ┴─┘┴┘└┘└─┘  v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
