//! # Configuration
//!
//! `plotline.toml` parsed into a serde struct. Every section and key is
//! optional; missing values take their defaults.
//!
//! ```toml
//! [engine]
//! strict = true
//!
//! [saves]
//! database = "plotline.db"
//!
//! [log]
//! format = "text"
//! filter = "plotline=info"
//! ```
//!
//! Precedence, lowest first: defaults, file, environment
//! (`PLOTLINE_LOG_FORMAT`, `PLOTLINE_SAVES`), CLI flags.

use plotline_core::PlotlineError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "plotline.toml";

/// Environment variable selecting `text` or `json` log output.
pub const ENV_LOG_FORMAT: &str = "PLOTLINE_LOG_FORMAT";

/// Environment variable overriding the save database path.
pub const ENV_SAVES: &str = "PLOTLINE_SAVES";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub saves: SavesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Refuse to play stories that have structural defects.
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SavesConfig {
    pub database: PathBuf,
}

impl Default for SavesConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("plotline.db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse `text` or `json`, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "plotline=info,plotline_core=warn".to_string(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, PlotlineError> {
        toml::from_str(text).map_err(|e| PlotlineError::ConfigError(e.to_string()))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `plotline.toml` in the
    /// working directory is used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, PlotlineError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            PlotlineError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(PlotlineError::ConfigError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            PlotlineError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| PlotlineError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unrecognized log formats keep the configured value. Empty values are
    /// ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(format) = lookup(ENV_LOG_FORMAT).as_deref().and_then(LogFormat::parse) {
            self.log.format = format;
        }
        if let Some(saves) = lookup(ENV_SAVES).filter(|s| !s.trim().is_empty()) {
            self.saves.database = PathBuf::from(saves);
        }
        self
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }
}

// =============================================================================
// TESTS
// =============================================================================
