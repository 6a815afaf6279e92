//! # Formats
//!
//! Serialized forms of session state. Story JSON export lives in `export`.

pub mod persistence;

pub use persistence::{
    SaveHeader, session_from_bytes, session_from_json, session_to_bytes, session_to_json,
};
