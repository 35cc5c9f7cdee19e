//! Search orchestration.
//!
//! Drives one run end to end: discovery through the filesystem adapter,
//! path and metadata filtering, predicate compilation, bounded-concurrency
//! content matching, progress emission, and cooperative cancellation.
//! Workers report completions over a channel; only the orchestrator thread
//! touches the progress sink, so events arrive in completion order while
//! the final result set keeps discovery order.

use crate::cache::CacheSet;
use crate::cancel::CancelToken;
use crate::engine::EngineSettings;
use crate::error::{FileReadError, SearchError};
use crate::filters::{extension_globs, CandidateFilter};
use crate::matcher::{compile_matcher, ContentMatcher};
use crate::metrics::Metrics;
use crate::processor::{FileProcessor, ProcessOptions, ProcessResult};
use crate::types::{
    FileMeta, FileResult, MatchOptions, ProgressEvent, SearchOutcome, SearchParams, SearchStatus,
    BACKPRESSURE_DELAY, MEMORY_CHECK_INTERVAL, MEMORY_SOFT_LIMIT, STAT_BATCH_SIZE,
};
use crate::walk::{FileSystem, ListOptions};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) struct Orchestrator<'e> {
    pub fs: &'e dyn FileSystem,
    pub caches: Arc<CacheSet>,
    pub metrics: Arc<Metrics>,
}

/// A discovered candidate that survived filtering.
struct Candidate {
    path: PathBuf,
    meta: Option<FileMeta>,
}

/// One worker completion, tagged with the candidate's discovery index.
enum Completion {
    Done(usize, ProcessResult),
    Skipped(usize),
}

impl Orchestrator<'_> {
    pub fn search(
        &self,
        params: &SearchParams,
        settings: EngineSettings,
        progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> Result<SearchOutcome, SearchError> {
        if params.search_paths.is_empty() {
            return Err(SearchError::NoSearchPaths);
        }

        let opts = MatchOptions {
            case_sensitive: params.case_sensitive,
            whole_word: params.whole_word_matching || settings.whole_word,
            fuzzy_boolean: params.fuzzy_search_boolean_enabled || settings.fuzzy_boolean,
            fuzzy_near: params.fuzzy_search_near_enabled || settings.fuzzy_near,
        };

        // Predicate compilation happens before any I/O so a bad query
        // costs nothing; a parse failure is the one error that aborts.
        let matcher = match &params.content_search_term {
            Some(query) => {
                match compile_matcher(
                    query,
                    params.content_search_mode,
                    opts,
                    Arc::clone(&self.caches),
                    Arc::clone(&self.metrics),
                ) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        emit(
                            progress,
                            0,
                            0,
                            format!("query parse error: {e}"),
                            SearchStatus::Error,
                            None,
                            Some(e.to_string()),
                        );
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        let filter = CandidateFilter::build(params)?;

        emit(progress, 0, 0, "discovering files".into(), SearchStatus::Searching, None, None);

        // Phase 1: discovery.
        let list_opts = ListOptions {
            include_globs: extension_globs(&params.extensions),
            max_depth: params.max_depth,
            include_hidden: params.include_hidden,
        };
        let mut discovered: Vec<PathBuf> = Vec::new();
        let mut path_errors: Vec<String> = Vec::new();
        for root in &params.search_paths {
            let listing = self.fs.list_files(root, &list_opts, cancel);
            discovered.extend(listing.paths);
            path_errors.extend(
                listing.errors.into_iter().filter(|e| !filter.is_excluded_permission_error(e)),
            );
            if cancel.is_cancelled() {
                break;
            }
        }
        Metrics::add(&self.metrics.files_discovered, discovered.len() as u64);
        tracing::debug!(
            discovered = discovered.len(),
            errors = path_errors.len(),
            "discovery finished"
        );

        if cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(Vec::new(), 0, 0, path_errors, Vec::new(), progress));
        }

        // Phase 2: filtering.
        let mut file_read_errors: Vec<FileReadError> = Vec::new();
        let candidates =
            self.filter_candidates(discovered, &filter, &mut file_read_errors, cancel);
        let total = candidates.len();
        tracing::debug!(candidates = total, "filtering finished");

        if cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(
                Vec::new(),
                total,
                0,
                path_errors,
                file_read_errors,
                progress,
            ));
        }

        // Phases 3–5: content matching with progress.
        let process_opts = ProcessOptions {
            chunk_size: params.effective_chunk_size(),
            max_file_size: params.effective_max_file_size(),
            early_termination: true,
            collect_content: params.include_content,
            skip_binary: params.skip_binary,
        };

        let (results, processed, was_cancelled) = match &matcher {
            Some(matcher) => self.match_contents(
                &candidates,
                matcher,
                &process_opts,
                params.effective_concurrency(),
                progress,
                cancel,
            ),
            None => self.metadata_only(&candidates, progress, cancel),
        };

        let mut outcome = SearchOutcome {
            results: Vec::with_capacity(processed),
            files_found: total,
            files_processed: processed,
            errors_encountered: 0,
            was_cancelled,
            path_errors,
            file_read_errors,
        };

        for (idx, result) in results.into_iter().enumerate() {
            let Some(result) = result else { continue };
            if let Some(err) = &result.read_error {
                outcome
                    .file_read_errors
                    .push(FileReadError { path: candidates[idx].path.clone(), reason: err.to_string() });
            }
            outcome.results.push(result);
        }
        outcome.errors_encountered =
            outcome.path_errors.len() + outcome.file_read_errors.len();

        if was_cancelled {
            emit(
                progress,
                processed,
                total,
                "search cancelled".into(),
                SearchStatus::Cancelled,
                None,
                None,
            );
        } else {
            emit(
                progress,
                processed,
                total,
                format!("searched {total} files"),
                SearchStatus::Completed,
                None,
                None,
            );
        }

        Ok(outcome)
    }

    /// Path filtering, then metadata fetch in bounded batches, then the
    /// metadata windows.
    fn filter_candidates(
        &self,
        discovered: Vec<PathBuf>,
        filter: &CandidateFilter,
        file_read_errors: &mut Vec<FileReadError>,
        cancel: &CancelToken,
    ) -> Vec<Candidate> {
        let discovered_count = discovered.len();
        let path_ok: Vec<PathBuf> =
            discovered.into_iter().filter(|p| filter.path_allowed(p)).collect();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(path_ok.len());
        for batch in path_ok.chunks(STAT_BATCH_SIZE) {
            if cancel.is_cancelled() {
                break;
            }
            let stats: Vec<(PathBuf, std::io::Result<FileMeta>)> = batch
                .par_iter()
                .map(|path| (path.clone(), self.fs.stat(path)))
                .collect();
            for (path, stat) in stats {
                match stat {
                    Ok(meta) => {
                        if filter.meta_allowed(&meta) {
                            candidates.push(Candidate { path, meta: Some(meta) });
                        }
                    }
                    Err(e) if filter.needs_metadata() => {
                        // The window cannot be checked, so the file cannot
                        // qualify; record why it disappeared.
                        file_read_errors
                            .push(FileReadError { path, reason: e.to_string() });
                    }
                    Err(_) => {
                        // No window to enforce; let the processor surface
                        // the real error during the content pass.
                        candidates.push(Candidate { path, meta: None });
                    }
                }
            }
        }

        let dropped = discovered_count.saturating_sub(candidates.len());
        Metrics::add(&self.metrics.files_filtered_out, dropped as u64);
        candidates
    }

    /// Schedule one processor task per candidate on a pool bounded at
    /// `concurrency`, collecting completions in arrival order.
    fn match_contents(
        &self,
        candidates: &[Candidate],
        matcher: &ContentMatcher,
        process_opts: &ProcessOptions,
        concurrency: usize,
        progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> (Vec<Option<FileResult>>, usize, bool) {
        let total = candidates.len();
        let stride = (total / 100).max(1);
        let mut results: Vec<Option<FileResult>> = (0..total).map(|_| None).collect();
        let mut processed = 0usize;
        let mut was_cancelled = false;

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(concurrency).build() {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(%e, "failed to build worker pool; matching inline");
                return self.match_inline(candidates, matcher, process_opts, progress, cancel);
            }
        };

        let (tx, rx) = crossbeam_channel::unbounded::<Completion>();

        pool.in_place_scope(|scope| {
            for (idx, candidate) in candidates.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    if cancel.is_cancelled() {
                        let _ = tx.send(Completion::Skipped(idx));
                        return;
                    }
                    let processor = FileProcessor::new(self.fs);
                    let result =
                        processor.process(&candidate.path, matcher, process_opts, cancel);
                    let _ = tx.send(Completion::Done(idx, result));
                });
            }
            drop(tx);

            for completion in rx.iter() {
                let (idx, result) = match completion {
                    Completion::Done(idx, result) => (idx, result),
                    Completion::Skipped(_) => {
                        was_cancelled = true;
                        continue;
                    }
                };

                processed += 1;
                Metrics::bump(&self.metrics.files_processed);
                let candidate = &candidates[idx];
                Metrics::add(&self.metrics.bytes_read, candidate.meta.map_or(0, |m| m.size));
                results[idx] = Some(file_result(candidate, result));

                if cancel.is_cancelled() {
                    was_cancelled = true;
                    // Queued tasks observe the flag and drain fast; stop
                    // reporting and let the scope unwind.
                    continue;
                }

                if processed % stride == 0 || processed == total {
                    emit(
                        progress,
                        processed,
                        total,
                        format!("matched {processed}/{total}"),
                        SearchStatus::Searching,
                        Some(candidate.path.clone()),
                        None,
                    );
                }

                if processed % MEMORY_CHECK_INTERVAL == 0 {
                    self.apply_backpressure();
                }
            }
        });

        (results, processed, was_cancelled || cancel.is_cancelled())
    }

    /// Fallback used only when the pool cannot be built.
    fn match_inline(
        &self,
        candidates: &[Candidate],
        matcher: &ContentMatcher,
        process_opts: &ProcessOptions,
        progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> (Vec<Option<FileResult>>, usize, bool) {
        let total = candidates.len();
        let stride = (total / 100).max(1);
        let mut results: Vec<Option<FileResult>> = (0..total).map(|_| None).collect();
        let mut processed = 0usize;

        for (idx, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return (results, processed, true);
            }
            let result = FileProcessor::new(self.fs).process(
                &candidate.path,
                matcher,
                process_opts,
                cancel,
            );
            processed += 1;
            Metrics::bump(&self.metrics.files_processed);
            Metrics::add(&self.metrics.bytes_read, candidate.meta.map_or(0, |m| m.size));
            results[idx] = Some(file_result(candidate, result));
            if processed % stride == 0 || processed == total {
                emit(
                    progress,
                    processed,
                    total,
                    format!("matched {processed}/{total}"),
                    SearchStatus::Searching,
                    Some(candidate.path.clone()),
                    None,
                );
            }
        }
        (results, processed, false)
    }

    /// No content predicate: every filtered candidate is a result.
    fn metadata_only(
        &self,
        candidates: &[Candidate],
        progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> (Vec<Option<FileResult>>, usize, bool) {
        let total = candidates.len();
        let stride = (total / 100).max(1);
        let mut results: Vec<Option<FileResult>> = Vec::with_capacity(total);
        for (i, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return (results, i, true);
            }
            results.push(Some(FileResult {
                path: candidate.path.clone(),
                matched: true,
                size: candidate.meta.map_or(0, |m| m.size),
                mtime: candidate.meta.and_then(|m| m.modified),
                content: None,
                read_error: None,
            }));
            let done = i + 1;
            if done % stride == 0 || done == total {
                emit(
                    progress,
                    done,
                    total,
                    format!("listed {done}/{total}"),
                    SearchStatus::Searching,
                    Some(candidate.path.clone()),
                    None,
                );
            }
        }
        (results, total, false)
    }

    fn cancelled_outcome(
        &self,
        results: Vec<FileResult>,
        files_found: usize,
        files_processed: usize,
        path_errors: Vec<String>,
        file_read_errors: Vec<FileReadError>,
        progress: &mut dyn FnMut(&ProgressEvent),
    ) -> SearchOutcome {
        emit(
            progress,
            files_processed,
            files_found,
            "search cancelled".into(),
            SearchStatus::Cancelled,
            None,
            None,
        );
        let errors_encountered = path_errors.len() + file_read_errors.len();
        SearchOutcome {
            results,
            files_found,
            files_processed,
            errors_encountered,
            was_cancelled: true,
            path_errors,
            file_read_errors,
        }
    }

    /// Sample the resident set and pause when it exceeds the soft limit.
    fn apply_backpressure(&self) {
        let Some(resident) = resident_memory_bytes() else { return };
        if resident > MEMORY_SOFT_LIMIT {
            Metrics::bump(&self.metrics.backpressure_pauses);
            tracing::debug!(resident, "resident set over soft limit; pausing");
            std::thread::sleep(BACKPRESSURE_DELAY);
        }
    }
}

fn file_result(candidate: &Candidate, result: ProcessResult) -> FileResult {
    FileResult {
        path: candidate.path.clone(),
        matched: result.matched,
        size: candidate.meta.map_or(0, |m| m.size),
        mtime: candidate.meta.and_then(|m| m.modified),
        content: result.content,
        read_error: result.error,
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    progress: &mut dyn FnMut(&ProgressEvent),
    processed: usize,
    total: usize,
    message: String,
    status: SearchStatus,
    current_file: Option<PathBuf>,
    error: Option<String>,
) {
    progress(&ProgressEvent { processed, total, message, status, current_file, error });
}

/// Resident set size, when the platform exposes it.
fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
