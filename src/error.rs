//! Daemon-wide error type.

use thiserror::Error;

/// Errors surfaced by the engine and its handlers.
///
/// A handler error is logged and the offending command skipped; it never
/// tears down the engine. Connection-fatal conditions go through the exit
/// path instead of this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed line: {0}")]
    Parse(#[from] weft_proto::LineParseError),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("UID space exhausted")]
    UidExhausted,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used by command handlers.
pub type HandlerResult = Result<(), Error>;
