//! Domain-level error taxonomy for sanebot.
//!
//! Everything here is fatal to the run. Per-change recoverable conditions
//! (mirror fetch failure, submission failure, oversized worker output) are
//! handled and logged at the call site instead of surfacing as errors.

use crate::merge::MergeError;

/// sanebot domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("missing mandatory configuration key: {0}")]
    MissingConfig(String),

    #[error("configuration key {key} has invalid value {value:?}: {detail}")]
    InvalidConfig {
        key: String,
        value: String,
        detail: String,
    },

    #[error("malformed payload from {origin}: {detail}")]
    MalformedPayload {
        origin: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Result type for sanebot domain operations.
pub type Result<T> = std::result::Result<T, BotError>;
