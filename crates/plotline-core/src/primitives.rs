//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Plotline CORE.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Alias tables live next to the normalizer; this module only holds the
//! values shared across components.

/// Title used when a story declares none of the known title fields.
pub const UNTITLED: &str = "untitled";

/// Prefix for choice ids generated during normalization.
///
/// Generated ids are `choice_{node_index}_{choice_index}`, so the same input
/// always yields the same ids.
pub const GENERATED_CHOICE_PREFIX: &str = "choice";

/// Magic bytes for the Plotline binary save format header.
///
/// - File Header = Magic Bytes ("PLOT") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"PLOT";

/// Current save format version.
///
/// Increment this when making breaking changes to the save format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a condition expression in bytes.
///
/// Longer expressions are treated as unparseable.
pub const MAX_CONDITION_LENGTH: usize = 4096;

/// Maximum nesting depth of parentheses and `!` in a condition.
///
/// Bounds the recursive-descent parser.
pub const MAX_CONDITION_DEPTH: usize = 64;

/// Maximum number of transitions a single session may record.
///
/// Bounds replay cost and save size. Further choices fail with
/// `EngineError::HistoryFull`.
pub const MAX_HISTORY_LENGTH: usize = 100_000;

/// Maximum payload size accepted by the binary save decoder (64 MB).
pub const MAX_SAVE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;
