//! Pull-based filesystem content search.
//!
//! `scour` locates files by path and metadata filters, then evaluates a
//! content predicate — boolean combinations of literal terms, regexes,
//! fuzzy terms, and `NEAR(a, b, k)` proximity — over each candidate,
//! streaming large files in overlapped chunks. Searches run under a
//! bounded concurrency limit with progress reporting and cooperative
//! cancellation. Nothing is indexed or persisted: every query runs over
//! the raw files, and all caching is in-memory and per-engine.
//!
//! ```no_run
//! use scour::{CancelToken, ContentSearchMode, SearchEngine, SearchParams};
//!
//! let engine = SearchEngine::new();
//! let mut params = SearchParams::new(vec!["./src".into()]);
//! params.extensions = vec!["rs".into()];
//! params.content_search_term = Some(r#"NEAR("reader", buffer, 4) AND NOT test"#.into());
//! params.content_search_mode = ContentSearchMode::Boolean;
//!
//! let cancel = CancelToken::new();
//! let outcome = engine
//!     .search(&params, &mut |event| eprintln!("{}/{}", event.processed, event.total), &cancel)
//!     .unwrap();
//! for result in outcome.results.iter().filter(|r| r.matched) {
//!     println!("{}", result.path.display());
//! }
//! ```

mod boundaries;
pub mod cache;
pub mod cancel;
pub mod engine;
pub mod error;
mod filters;
mod fingerprint;
mod fuzzy;
pub mod matcher;
pub mod metrics;
mod near;
mod orchestrator;
mod processor;
pub mod query;
mod regexes;
pub mod types;
pub mod walk;

pub use cache::CacheStats;
pub use cancel::CancelToken;
pub use engine::{EngineSettings, SearchEngine};
pub use error::{FileError, FileReadError, ParseError, SearchError};
pub use matcher::{ContentMatcher, MatchDetail};
pub use metrics::MetricsSnapshot;
pub use query::QueryNode;
pub use types::{
    ContentSearchMode, FileMeta, FileResult, FolderExclusionMode, MatchOptions, ProgressEvent,
    SearchOutcome, SearchParams, SearchStatus,
};
pub use walk::{FileSystem, ListOptions, Listing, OsFileSystem};
