//! The engine handle and public API.
//!
//! A [`SearchEngine`] owns its caches, metrics, and settings — there are
//! no process-wide singletons. Settings changed through
//! [`SearchEngine::update_settings`] take effect at the next `search()`
//! call; a running search keeps the snapshot it started with.

use crate::cache::{CacheSet, CacheStats};
use crate::cancel::CancelToken;
use crate::error::{ParseError, SearchError};
use crate::matcher::{compile_matcher, compile_node, ContentMatcher};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::orchestrator::Orchestrator;
use crate::query::QueryNode;
use crate::types::{ContentSearchMode, MatchOptions, ProgressEvent, SearchOutcome, SearchParams};
use crate::walk::{FileSystem, OsFileSystem};
use std::sync::{Arc, RwLock};

/// Engine-level toggles, merged with per-search parameters (either source
/// enabling a mode enables it for the run).
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    pub fuzzy_boolean: bool,
    pub fuzzy_near: bool,
    pub whole_word: bool,
}

/// A filesystem content search engine handle.
///
/// Cheap to share behind an `Arc`; all interior state is synchronized.
pub struct SearchEngine {
    fs: Arc<dyn FileSystem>,
    caches: Arc<CacheSet>,
    metrics: Arc<Metrics>,
    settings: RwLock<EngineSettings>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::with_filesystem(Arc::new(OsFileSystem))
    }

    /// Build an engine over a custom filesystem adapter.
    pub fn with_filesystem(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            caches: Arc::new(CacheSet::new()),
            metrics: Arc::new(Metrics::default()),
            settings: RwLock::new(EngineSettings::default()),
        }
    }

    /// Run one search. `progress` receives events in completion order from
    /// the calling thread; `cancel` is polled cooperatively throughout.
    ///
    /// Only a query parse failure (or unusable parameters) returns `Err`;
    /// every per-file problem is folded into the outcome.
    pub fn search(
        &self,
        params: &SearchParams,
        progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> Result<SearchOutcome, SearchError> {
        let settings = *self.settings.read().expect("settings lock poisoned");
        let orchestrator = Orchestrator {
            fs: self.fs.as_ref(),
            caches: Arc::clone(&self.caches),
            metrics: Arc::clone(&self.metrics),
        };
        orchestrator.search(params, settings, progress, cancel)
    }

    /// Replace the engine-level matching toggles.
    pub fn update_settings(&self, fuzzy_boolean: bool, fuzzy_near: bool, whole_word: bool) {
        let mut settings = self.settings.write().expect("settings lock poisoned");
        *settings = EngineSettings { fuzzy_boolean, fuzzy_near, whole_word };
        tracing::debug!(fuzzy_boolean, fuzzy_near, whole_word, "engine settings updated");
    }

    pub fn settings(&self) -> EngineSettings {
        *self.settings.read().expect("settings lock poisoned")
    }

    /// Drop every cache entry. Outcomes are unaffected — caches are pure
    /// memoization.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.caches.stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Compile a query without running a search, for early validation or
    /// standalone matching.
    pub fn compile_matcher(
        &self,
        query: &str,
        mode: ContentSearchMode,
        opts: MatchOptions,
    ) -> Result<ContentMatcher, ParseError> {
        compile_matcher(query, mode, opts, Arc::clone(&self.caches), Arc::clone(&self.metrics))
    }

    /// Compile a structured query tree.
    pub fn compile_query(
        &self,
        ast: QueryNode,
        opts: MatchOptions,
    ) -> Result<ContentMatcher, ParseError> {
        compile_node(ast, opts, Arc::clone(&self.caches), Arc::clone(&self.metrics))
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}
