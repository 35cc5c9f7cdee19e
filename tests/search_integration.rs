//! End-to-end engine tests over fixture trees built in temp dirs.

mod helpers;

use helpers::TestHarness;
use scour::{
    CancelToken, ContentSearchMode, FolderExclusionMode, SearchError, SearchStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

// ---------------------------------------------------------------------------
// Discovery and filtering
// ---------------------------------------------------------------------------

#[test]
fn metadata_only_search_lists_all_files() {
    let h = TestHarness::new();
    h.write("a.txt", "alpha");
    h.write("sub/b.txt", "beta");
    h.write("sub/deep/c.md", "gamma");

    let outcome = h.run(&h.params());
    assert_eq!(outcome.files_found, 3);
    assert_eq!(outcome.files_processed, 3);
    assert!(!outcome.was_cancelled);
    assert_eq!(outcome.errors_encountered, 0);
    assert_eq!(h.matched_paths(&outcome), vec!["a.txt", "sub/b.txt", "sub/deep/c.md"]);
}

#[test]
fn extension_filter_limits_candidates() {
    let h = TestHarness::new();
    h.write("keep.rs", "fn main() {}");
    h.write("skip.txt", "plain");
    h.write("sub/also.rs", "mod x;");

    let mut params = h.params();
    params.extensions = vec!["rs".into(), ".rs".into()];
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["keep.rs", "sub/also.rs"]);
}

#[test]
fn exclude_files_glob_and_regex() {
    let h = TestHarness::new();
    h.write("app.js", "code");
    h.write("app.min.js", "minified");
    h.write("test_app.js", "test");

    let mut params = h.params();
    params.exclude_files = vec!["*.min.js".into(), "/^test_/".into()];
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["app.js"]);
}

#[test]
fn exclude_folders_contains_mode_default() {
    let h = TestHarness::new();
    h.write("src/main.rs", "code");
    h.write("node_modules/lib/index.js", "dep");
    h.write("my_node_modules_fork/x.js", "fork");

    let mut params = h.params();
    params.exclude_folders = vec!["node_modules".into()];
    let outcome = h.run(&params);
    // Contains matches both the exact dir and the fork dir.
    assert_eq!(h.matched_paths(&outcome), vec!["src/main.rs"]);
}

#[test]
fn exclude_folders_exact_mode() {
    let h = TestHarness::new();
    h.write("node_modules/a.js", "dep");
    h.write("node_modules_fork/b.js", "fork");

    let mut params = h.params();
    params.exclude_folders = vec!["node_modules".into()];
    params.folder_exclusion_mode = FolderExclusionMode::Exact;
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["node_modules_fork/b.js"]);
}

#[test]
fn size_window_filters_candidates() {
    let h = TestHarness::new();
    h.write("small.txt", "ab");
    h.write("large.txt", "x".repeat(1000));

    let mut params = h.params();
    params.min_size_bytes = Some(100);
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["large.txt"]);
}

#[test]
fn mtime_window_filters_candidates() {
    let h = TestHarness::new();
    h.write("now.txt", "fresh");

    let hour = Duration::from_secs(3600);
    let mut params = h.params();
    params.modified_after = Some(SystemTime::now() - hour);
    assert_eq!(h.run(&params).files_found, 1);

    params.modified_after = None;
    params.modified_before = Some(SystemTime::now() - hour);
    assert_eq!(h.run(&params).files_found, 0);
}

#[test]
fn max_depth_bounds_the_walk() {
    let h = TestHarness::new();
    h.write("top.txt", "top");
    h.write("one/mid.txt", "mid");
    h.write("one/two/deep.txt", "deep");

    let mut params = h.params();
    params.max_depth = Some(1);
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["top.txt"]);
}

#[test]
fn hidden_files_follow_the_flag() {
    let h = TestHarness::new();
    h.write("seen.txt", "v");
    h.write(".dotfile", "h");

    assert_eq!(h.run(&h.params()).files_found, 1);

    let mut params = h.params();
    params.include_hidden = true;
    assert_eq!(h.run(&params).files_found, 2);
}

#[test]
fn missing_root_accumulates_path_error_and_continues() {
    let h = TestHarness::new();
    h.write("real.txt", "data");

    let mut params = h.params();
    params.search_paths.push(h.root().join("not_there"));
    let outcome = h.run(&params);
    assert_eq!(outcome.files_found, 1);
    assert_eq!(outcome.path_errors.len(), 1);
    assert_eq!(outcome.errors_encountered, 1);
}

#[test]
fn no_search_paths_is_an_error() {
    let h = TestHarness::new();
    let mut params = h.params();
    params.search_paths.clear();
    let err = h.engine.search(&params, &mut |_| {}, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, SearchError::NoSearchPaths));
}

// ---------------------------------------------------------------------------
// Content matching
// ---------------------------------------------------------------------------

#[test]
fn term_search_sets_matched_per_file() {
    let h = TestHarness::new();
    h.write("hit.txt", "the needle is here");
    h.write("miss.txt", "nothing of note");

    let mut params = h.params();
    params.content_search_term = Some("needle".into());
    let outcome = h.run(&params);
    assert_eq!(outcome.files_found, 2);
    assert_eq!(outcome.files_processed, 2);
    assert_eq!(h.matched_paths(&outcome), vec!["hit.txt"]);
    // The miss is still a result record.
    assert_eq!(outcome.results.len(), 2);
}

#[test]
fn empty_file_matches_nothing() {
    let h = TestHarness::new();
    h.write("empty.txt", "");

    let mut params = h.params();
    params.content_search_term = Some("anything".into());
    let outcome = h.run(&params);
    assert!(h.matched_paths(&outcome).is_empty());
}

#[test]
fn boolean_query_over_files() {
    let h = TestHarness::new();
    h.write("both.txt", "foo bar");
    h.write("foo_baz.txt", "foo baz");
    h.write("foo_only.txt", "foo");
    h.write("bar_only.txt", "bar");

    let mut params = h.params();
    params.content_search_term = Some("foo AND (bar OR NOT baz)".into());
    params.content_search_mode = ContentSearchMode::Boolean;
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["both.txt", "foo_only.txt"]);
}

#[test]
fn near_query_over_files() {
    let h = TestHarness::new();
    let prose = "The quick brown fox jumps over the lazy dog ".repeat(10);
    h.write("prose.txt", &prose);
    h.write("other.txt", "quick unrelated text far from animals");

    let mut params = h.params();
    params.content_search_term = Some(r#"NEAR("quick", fox, 2)"#.into());
    params.content_search_mode = ContentSearchMode::Boolean;
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["prose.txt"]);

    params.content_search_term = Some(r#"NEAR("quick", fox, 0)"#.into());
    let outcome = h.run(&params);
    assert!(h.matched_paths(&outcome).is_empty());
}

#[test]
fn regex_mode_over_files() {
    let h = TestHarness::new();
    let big = "abc def ".repeat(100_000);
    h.write("big.txt", &big);

    let mut params = h.params();
    params.content_search_mode = ContentSearchMode::Regex;
    params.content_search_term = Some(r"\bdef\b".into());
    assert_eq!(h.matched_paths(&h.run(&params)), vec!["big.txt"]);

    params.content_search_term = Some(r"^\s*$".into());
    assert!(h.matched_paths(&h.run(&params)).is_empty());
}

#[test]
fn whole_word_matching_refines() {
    let h = TestHarness::new();
    h.write("words.txt", "test testing tested contest");

    let mut params = h.params();
    params.content_search_term = Some("test".into());
    assert_eq!(h.run(&params).results[0].matched, true);

    params.whole_word_matching = true;
    // "test" still stands alone once, so whole-word still matches.
    assert_eq!(h.run(&params).results[0].matched, true);

    params.content_search_term = Some("conte".into());
    // Substring of "contest" only; whole-word rejects it.
    assert_eq!(h.run(&params).results[0].matched, false);
}

#[test]
fn fuzzy_gate_controls_typo_matching() {
    let h = TestHarness::new();
    h.write("doc.txt", "an example here");

    let mut params = h.params();
    params.content_search_term = Some("exmaple".into());
    assert!(h.matched_paths(&h.run(&params)).is_empty());

    params.fuzzy_search_boolean_enabled = true;
    assert_eq!(h.matched_paths(&h.run(&params)), vec!["doc.txt"]);
}

#[test]
fn engine_settings_enable_fuzzy_for_all_runs() {
    let h = TestHarness::new();
    h.write("doc.txt", "an example here");

    let mut params = h.params();
    params.content_search_term = Some("exmaple".into());
    assert!(h.matched_paths(&h.run(&params)).is_empty());

    h.engine.update_settings(true, false, false);
    assert_eq!(h.matched_paths(&h.run(&params)), vec!["doc.txt"]);
}

#[test]
fn parse_error_aborts_with_error_event() {
    let h = TestHarness::new();
    h.write("a.txt", "data");

    let mut params = h.params();
    params.content_search_term = Some("foo AND".into());
    params.content_search_mode = ContentSearchMode::Boolean;

    let mut events = Vec::new();
    let err = h
        .engine
        .search(&params, &mut |e| events.push(e.clone()), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SearchError::Parse(_)));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, SearchStatus::Error);
    assert!(events[0].error.is_some());
}

#[test]
fn binary_files_are_skipped_with_read_error() {
    let h = TestHarness::new();
    h.write("text.txt", "needle here");
    h.write("blob.bin", b"nee\x00dle".as_slice());

    let mut params = h.params();
    params.content_search_term = Some("needle".into());
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["text.txt"]);
    assert_eq!(outcome.file_read_errors.len(), 1);
    assert!(outcome.file_read_errors[0].path.ends_with("blob.bin"));
}

#[test]
fn oversized_files_are_rejected_not_fatal() {
    let h = TestHarness::new();
    h.write("big.txt", "needle ".repeat(100));
    h.write("ok.txt", "needle");

    let mut params = h.params();
    params.content_search_term = Some("needle".into());
    params.max_file_size = Some(10);
    let outcome = h.run(&params);
    assert_eq!(h.matched_paths(&outcome), vec!["ok.txt"]);
    assert_eq!(outcome.file_read_errors.len(), 1);
    assert!(outcome.file_read_errors[0].reason.contains("size limit"));
}

#[test]
fn include_content_attaches_matched_content() {
    let h = TestHarness::new();
    h.write("hit.txt", "tiny needle file");
    h.write("miss.txt", "nothing");

    let mut params = h.params();
    params.content_search_term = Some("needle".into());
    params.include_content = true;
    let outcome = h.run(&params);
    let hit = outcome.results.iter().find(|r| r.matched).unwrap();
    assert_eq!(hit.content.as_deref(), Some("tiny needle file"));
    let miss = outcome.results.iter().find(|r| !r.matched).unwrap();
    assert!(miss.content.is_none());
}

#[test]
fn streamed_large_file_matches_like_small_chunks() {
    let h = TestHarness::new();
    let mut content = "filler content line ".repeat(10_000); // ~200 KB
    content.push_str("the zebra at the very end");
    h.write("large.txt", &content);

    let mut params = h.params();
    params.content_search_term = Some("zebra".into());
    // Default 64 KiB chunks stream the file.
    assert_eq!(h.matched_paths(&h.run(&params)), vec!["large.txt"]);

    // Tiny chunks force many windows; the verdict must not change.
    params.chunk_size = Some(2048);
    assert_eq!(h.matched_paths(&h.run(&params)), vec!["large.txt"]);
}

#[test]
fn result_records_carry_size_and_mtime() {
    let h = TestHarness::new();
    h.write("f.txt", "needle");

    let mut params = h.params();
    params.content_search_term = Some("needle".into());
    let outcome = h.run(&params);
    assert_eq!(outcome.results[0].size, 6);
    assert!(outcome.results[0].mtime.is_some());
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

#[test]
fn progress_is_monotone_and_terminates_completed() {
    let h = TestHarness::new();
    for i in 0..25 {
        h.write(&format!("f{i}.txt"), format!("file number {i}"));
    }

    let mut params = h.params();
    params.content_search_term = Some("number".into());
    let (outcome, events) = h.run_with_progress(&params);
    assert!(!outcome.was_cancelled);

    assert!(events.len() >= 2);
    assert_eq!(events.last().unwrap().status, SearchStatus::Completed);
    assert_eq!(events.last().unwrap().processed, 25);

    // Monotone processed; constant total once matching starts.
    let matching: Vec<_> = events.iter().filter(|e| e.total > 0).collect();
    for pair in matching.windows(2) {
        assert!(pair[1].processed >= pair[0].processed);
        assert_eq!(pair[1].total, pair[0].total);
    }
}

#[test]
fn cancellation_returns_partial_and_emits_cancelled() {
    let h = TestHarness::new();
    for i in 0..40 {
        h.write(&format!("f{i}.txt"), "payload ".repeat(50));
    }

    let mut params = h.params();
    params.content_search_term = Some("payload".into());
    params.concurrency = Some(2);

    let cancel = CancelToken::new();
    let seen = AtomicUsize::new(0);
    let mut events = Vec::new();
    let outcome = h
        .engine
        .search(
            &params,
            &mut |e| {
                // Flip the flag as soon as matching reports progress.
                if e.total > 0 && seen.fetch_add(1, Ordering::Relaxed) == 0 {
                    cancel.cancel();
                }
                events.push(e.clone());
            },
            &cancel,
        )
        .expect("cancelled search still returns an outcome");

    assert!(outcome.was_cancelled);
    assert!(outcome.results.len() <= outcome.files_found);
    assert_eq!(events.last().unwrap().status, SearchStatus::Cancelled);
}

#[test]
fn precancelled_search_returns_immediately() {
    let h = TestHarness::new();
    h.write("f.txt", "data");

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = h.engine.search(&h.params(), &mut |_| {}, &cancel).unwrap();
    assert!(outcome.was_cancelled);
    assert!(outcome.results.is_empty());
}

// ---------------------------------------------------------------------------
// Cache behavior across runs
// ---------------------------------------------------------------------------

#[test]
fn clearing_caches_never_changes_outcomes() {
    let h = TestHarness::new();
    h.write("a.txt", "alpha beta gamma");
    h.write("b.txt", "delta epsilon");

    let mut params = h.params();
    params.content_search_term = Some(r#"NEAR(alpha, gamma, 3) OR epsilon"#.into());
    params.content_search_mode = ContentSearchMode::Boolean;

    let first = h.matched_paths(&h.run(&params));
    let warm = h.matched_paths(&h.run(&params));
    h.engine.clear_caches();
    let cold = h.matched_paths(&h.run(&params));

    assert_eq!(first, warm);
    assert_eq!(first, cold);
    assert_eq!(first, vec!["a.txt", "b.txt"]);
}

#[test]
fn repeated_runs_hit_caches() {
    let h = TestHarness::new();
    h.write("a.txt", "some example content");

    let mut params = h.params();
    params.content_search_term = Some("exmaple".into());
    params.fuzzy_search_boolean_enabled = true;

    h.run(&params);
    h.run(&params);

    let stats = h.engine.cache_stats();
    let results = stats.iter().find(|s| s.name == "results").unwrap();
    assert!(results.hits >= 1, "second run should hit the result cache");
}
