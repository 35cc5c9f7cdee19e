//! Error taxonomy for the search engine.
//!
//! Only [`ParseError`] (and a fatal discovery failure) ever crosses the
//! `search()` boundary as `Err`; every other failure is folded into the
//! result set as data so a single unreadable file never aborts a run.

use std::path::PathBuf;

/// Error raised while parsing a content query string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },

    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated { what: &'static str, offset: usize },

    #[error("NEAR accepts only term or regex operands, not boolean expressions (offset {offset})")]
    NearOperand { offset: usize },

    #[error("invalid NEAR distance '{value}' at offset {offset}")]
    NearDistance { value: String, offset: usize },

    #[error("invalid regex: {0}")]
    Regex(String),

    #[error("empty query")]
    EmptyQuery,
}

/// Why a candidate file could not be content-matched.
///
/// Attached to the file's result record; never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileError {
    #[error("file exceeds the size limit ({size} > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("binary file skipped")]
    Binary,
}

impl From<std::io::Error> for FileError {
    fn from(e: std::io::Error) -> Self {
        FileError::Io(e.to_string())
    }
}

impl serde::Serialize for FileError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

/// A per-file read failure surfaced to the caller in the outcome lists.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileReadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Errors that abort a run at `search()` entry.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("no search paths given")]
    NoSearchPaths,

    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
