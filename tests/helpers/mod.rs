//! Test harness for end-to-end engine tests.
//!
//! Builds a fixture tree in a temp dir, runs searches against it through
//! the public API, and records progress events for assertions.

use scour::{CancelToken, ProgressEvent, SearchEngine, SearchOutcome, SearchParams};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestHarness {
    pub engine: SearchEngine,
    temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self { engine: SearchEngine::new(), temp_dir: TempDir::new().expect("temp dir") }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file under the fixture root, creating parent directories.
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dirs");
        }
        std::fs::write(&path, content).expect("write fixture file");
        path
    }

    /// Params rooted at the fixture tree.
    pub fn params(&self) -> SearchParams {
        SearchParams::new(vec![self.root().to_path_buf()])
    }

    /// Run a search, discarding progress.
    pub fn run(&self, params: &SearchParams) -> SearchOutcome {
        self.engine.search(params, &mut |_| {}, &CancelToken::new()).expect("search should run")
    }

    /// Run a search, capturing every progress event.
    pub fn run_with_progress(&self, params: &SearchParams) -> (SearchOutcome, Vec<ProgressEvent>) {
        let mut events = Vec::new();
        let outcome = self
            .engine
            .search(params, &mut |e| events.push(e.clone()), &CancelToken::new())
            .expect("search should run");
        (outcome, events)
    }

    /// Relative paths of matched results, sorted for stable assertions.
    pub fn matched_paths(&self, outcome: &SearchOutcome) -> Vec<String> {
        let mut paths: Vec<String> = outcome
            .results
            .iter()
            .filter(|r| r.matched)
            .map(|r| self.relative(&r.path))
            .collect();
        paths.sort();
        paths
    }

    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.root())
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
