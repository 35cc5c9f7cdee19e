//! Shared types: engine constants, search parameters, result records, and
//! progress events.

use crate::error::{FileError, FileReadError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

// ---------------------------------------------------------------------------
// Engine constants
// ---------------------------------------------------------------------------

/// Largest file the processor will read at all (bytes).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Files at or below this size may be fully materialized; larger files are
/// always streamed in chunks.
pub const MAX_FULL_CONTENT_SIZE: usize = 2 * 1024 * 1024;

/// Streaming read chunk size (bytes).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Conservative average word length used to convert a NEAR word distance
/// into a character overlap for chunked evaluation.
pub const AVG_WORD_LEN: usize = 32;

/// Maximum concurrent file-processing tasks.
pub const FILE_OPERATION_CONCURRENCY_LIMIT: usize = 20;

/// Metadata lookups are batched at this size during filtering.
pub const STAT_BATCH_SIZE: usize = 100;

/// Completions between resident-memory samples.
pub const MEMORY_CHECK_INTERVAL: usize = 500;

/// Resident-set ceiling before back-pressure kicks in: 1.2 GiB.
pub const MEMORY_SOFT_LIMIT: u64 = 6 * 1024 * 1024 * 1024 / 5;

/// Pause applied when the resident set exceeds [`MEMORY_SOFT_LIMIT`].
pub const BACKPRESSURE_DELAY: Duration = Duration::from_millis(500);

/// Bytes sniffed for null bytes when deciding whether a file is binary.
pub const BINARY_SNIFF_LEN: usize = 8192;

// ---------------------------------------------------------------------------
// Search parameters
// ---------------------------------------------------------------------------

/// How the `content_search_term` string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSearchMode {
    /// The whole input is a single literal term.
    #[default]
    Term,
    /// The input is the boolean mini-language (AND/OR/NOT, NEAR, regexes).
    Boolean,
    /// The whole input is a regex pattern.
    Regex,
}

/// How `exclude_folders` patterns are applied to each path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FolderExclusionMode {
    #[default]
    Contains,
    Exact,
    StartsWith,
    EndsWith,
}

/// Parameters for a single search run. Snapshotted at `search()` entry;
/// nothing here is re-read mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    /// Root directories to walk.
    pub search_paths: Vec<PathBuf>,
    /// Include only these extensions (with or without a leading dot).
    /// Empty means all files.
    pub extensions: Vec<String>,
    /// Glob or `/regex/flags` patterns matched against the basename.
    pub exclude_files: Vec<String>,
    /// Patterns matched against path segments, case-insensitively.
    pub exclude_folders: Vec<String>,
    pub folder_exclusion_mode: FolderExclusionMode,
    /// Walk depth bound. `None` means unlimited.
    pub max_depth: Option<usize>,
    pub modified_after: Option<SystemTime>,
    pub modified_before: Option<SystemTime>,
    pub min_size_bytes: Option<u64>,
    pub max_size_bytes: Option<u64>,
    /// Content predicate. `None` means match-by-metadata only.
    pub content_search_term: Option<String>,
    pub content_search_mode: ContentSearchMode,
    pub case_sensitive: bool,
    pub whole_word_matching: bool,
    pub fuzzy_search_boolean_enabled: bool,
    pub fuzzy_search_near_enabled: bool,
    /// Walk dotfiles and dot-directories.
    pub include_hidden: bool,
    /// Null-byte sniff; binary files are reported unmatched without a
    /// content pass.
    pub skip_binary: bool,
    /// Attach content of matched files (≤ [`MAX_FULL_CONTENT_SIZE`]) to
    /// their result records.
    pub include_content: bool,
    /// Override of [`FILE_OPERATION_CONCURRENCY_LIMIT`].
    pub concurrency: Option<usize>,
    /// Override of [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: Option<usize>,
    /// Override of [`DEFAULT_MAX_FILE_SIZE`].
    pub max_file_size: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            extensions: Vec::new(),
            exclude_files: Vec::new(),
            exclude_folders: Vec::new(),
            folder_exclusion_mode: FolderExclusionMode::default(),
            max_depth: None,
            modified_after: None,
            modified_before: None,
            min_size_bytes: None,
            max_size_bytes: None,
            content_search_term: None,
            content_search_mode: ContentSearchMode::default(),
            case_sensitive: false,
            whole_word_matching: false,
            fuzzy_search_boolean_enabled: false,
            fuzzy_search_near_enabled: false,
            include_hidden: false,
            skip_binary: true,
            include_content: false,
            concurrency: None,
            chunk_size: None,
            max_file_size: None,
        }
    }
}

impl SearchParams {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths, ..Default::default() }
    }

    pub(crate) fn effective_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1024)
    }

    pub(crate) fn effective_max_file_size(&self) -> u64 {
        self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE)
    }

    pub(crate) fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(FILE_OPERATION_CONCURRENCY_LIMIT).max(1)
    }
}

// ---------------------------------------------------------------------------
// Match options snapshot
// ---------------------------------------------------------------------------

/// Per-run matching options: the engine settings merged with the search
/// parameters, frozen at compile time so a matcher never observes a
/// settings change mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub fuzzy_boolean: bool,
    pub fuzzy_near: bool,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Metadata for a candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Per-file outcome, in discovery order.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub matched: bool,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    /// Present only when `include_content` was requested, the file matched,
    /// and its size permits full materialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<FileError>,
}

/// Aggregate outcome of one `search()` run.
#[derive(Debug, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<FileResult>,
    pub files_found: usize,
    pub files_processed: usize,
    pub errors_encountered: usize,
    pub was_cancelled: bool,
    pub path_errors: Vec<String>,
    pub file_read_errors: Vec<FileReadError>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Run state carried by every progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Searching,
    Cancelled,
    Completed,
    Error,
}

/// Emitted from the orchestrator thread in completion order.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub message: String,
    pub status: SearchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_defaults_round_trip() {
        let p = SearchParams::new(vec![PathBuf::from("/tmp")]);
        let json = serde_json::to_string(&p).unwrap();
        let back: SearchParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search_paths, p.search_paths);
        assert!(back.skip_binary);
        assert_eq!(back.content_search_mode, ContentSearchMode::Term);
    }

    #[test]
    fn partial_params_deserialize() {
        let p: SearchParams =
            serde_json::from_str(r#"{"searchPaths":["/a"],"contentSearchMode":"boolean"}"#)
                .unwrap();
        assert_eq!(p.content_search_mode, ContentSearchMode::Boolean);
        assert!(p.extensions.is_empty());
    }

    #[test]
    fn effective_overrides_clamp() {
        let mut p = SearchParams::default();
        p.chunk_size = Some(10);
        p.concurrency = Some(0);
        assert_eq!(p.effective_chunk_size(), 1024);
        assert_eq!(p.effective_concurrency(), 1);
    }
}
