//! Approximate term matching.
//!
//! Decides whether a term approximately occurs in content, returning
//! positions and a score in `[0, 1]` where 0 is an exact occurrence and
//! tighter matches score strictly lower. The pipeline prefers cheap
//! answers: guardrails, then the result cache, then an exact-substring
//! fast path, and only then edit-distance work — a per-word Levenshtein
//! scan for large content (with window sampling for very large content)
//! or a Sellers approximate-substring pass for medium content.

use crate::boundaries::{is_whole_word_span, is_word_char};
use crate::cache::{CacheSet, CachedVerdict};
use crate::fingerprint::fingerprint;
use crate::metrics::Metrics;
use crate::query::AtomKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Tuning constants
// ---------------------------------------------------------------------------

/// Terms shorter than this are matched exactly, never fuzzily.
const MIN_FUZZY_TERM_LEN: usize = 3;

/// Content above this many bytes switches to the per-word scan.
const LARGE_CONTENT: usize = 10_000;

/// Content above this many bytes switches to the sampled scan.
const SAMPLED_CONTENT: usize = 50_000;

const SAMPLE_WINDOWS: usize = 10;
const SAMPLE_WINDOW_LEN: usize = 5_000;
const SAMPLE_WORD_CAP: usize = 1_000;

/// Edit budget as a fraction of term length for the word scan.
const EDIT_BUDGET_RATIO: f64 = 0.3;

/// Candidate words must have a length within `[0.7·t, 1.3·t]`.
const LENGTH_BAND_LOW: f64 = 0.7;
const LENGTH_BAND_HIGH: f64 = 1.3;

/// Medium-content engine: edit budget fraction (the 0.4 match threshold)
/// and the score acceptance ceiling.
const ENGINE_THRESHOLD: f64 = 0.4;
const ENGINE_ACCEPT_SCORE: f64 = 0.6;

/// Score reported by the sampled scan: coarse by design.
const SAMPLED_HIT_SCORE: f64 = 0.5;
const MISS_SCORE: f64 = 1.0;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    /// When false, scans stop at the first matching word.
    pub collect_positions: bool,
}

/// Outcome of one fuzzy search. Positions are byte offsets into the
/// haystack that was actually matched (the case-folded content when the
/// search is case-insensitive).
#[derive(Debug, Clone)]
pub struct FuzzyResult {
    pub matched: bool,
    pub score: f64,
    pub positions: Vec<usize>,
    pub elapsed: Duration,
}

impl FuzzyResult {
    fn miss(started: Instant) -> Self {
        Self { matched: false, score: MISS_SCORE, positions: Vec::new(), elapsed: started.elapsed() }
    }

    fn hit(score: f64, positions: Vec<usize>, started: Instant) -> Self {
        Self { matched: true, score, positions, elapsed: started.elapsed() }
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

pub(crate) struct FuzzyMatcher<'c> {
    caches: &'c CacheSet,
    metrics: &'c Metrics,
}

impl<'c> FuzzyMatcher<'c> {
    pub fn new(caches: &'c CacheSet, metrics: &'c Metrics) -> Self {
        Self { caches, metrics }
    }

    /// Approximate search for `term` in `content`.
    pub fn search(&self, content: &str, term: &str, opts: &FuzzyOptions) -> FuzzyResult {
        let started = Instant::now();

        if content.is_empty() || term.is_empty() {
            return FuzzyResult::miss(started);
        }

        // Short terms degenerate to exact search; fuzziness on them would
        // match nearly everything.
        if term.chars().count() < MIN_FUZZY_TERM_LEN {
            let (hay, needle) = self.haystack_and_needle(content, term, opts);
            let positions = exact_positions(&hay, &needle, opts.whole_word);
            return if positions.is_empty() {
                FuzzyResult::miss(started)
            } else {
                FuzzyResult::hit(0.0, positions, started)
            };
        }

        let fp = fingerprint(content);
        let key = AtomKey::Term {
            text: term.into(),
            case_sensitive: opts.case_sensitive,
            whole_word: opts.whole_word,
            fuzzy: true,
        };
        if let Some(cached) = self.caches.results.get(&(fp.clone(), key.clone())) {
            // An entry produced by a first-hit search lacks the full
            // position list; recompute when the caller wants positions.
            if !opts.collect_positions || cached.positions_complete {
                return FuzzyResult {
                    matched: cached.matched,
                    score: cached.score,
                    positions: (*cached.positions).clone(),
                    elapsed: started.elapsed(),
                };
            }
        }

        Metrics::bump(&self.metrics.fuzzy_searches);
        let (hay, needle) = self.haystack_and_needle(content, term, opts);

        let result = {
            let exact = exact_positions(&hay, &needle, opts.whole_word);
            if !exact.is_empty() {
                FuzzyResult::hit(0.0, exact, started)
            } else if hay.len() > LARGE_CONTENT {
                self.word_scan(&hay, &needle, opts, started)
            } else {
                self.approx_engine(&hay, &needle, opts, started)
            }
        };

        self.caches.results.insert(
            (fp, key),
            CachedVerdict {
                matched: result.matched,
                score: result.score,
                positions: Arc::new(result.positions.clone()),
                positions_complete: opts.collect_positions,
            },
        );
        result
    }

    fn haystack_and_needle(
        &self,
        content: &str,
        term: &str,
        opts: &FuzzyOptions,
    ) -> (Arc<str>, Arc<str>) {
        if opts.case_sensitive {
            (content.into(), term.into())
        } else {
            (self.caches.normalized_form(content), self.caches.normalized_form(term))
        }
    }

    // -----------------------------------------------------------------------
    // Large content: per-word Levenshtein scan
    // -----------------------------------------------------------------------

    fn word_scan(
        &self,
        hay: &str,
        needle: &str,
        opts: &FuzzyOptions,
        started: Instant,
    ) -> FuzzyResult {
        if hay.len() > SAMPLED_CONTENT {
            return self.sampled_scan(hay, needle, opts, started);
        }

        let term_chars: Vec<char> = needle.chars().collect();
        let budget = edit_budget(term_chars.len());
        let mut verdicts: HashMap<&str, Option<usize>> = HashMap::new();
        let mut positions = Vec::new();
        let mut best: Option<usize> = None;

        for (start, word) in whitespace_words(hay) {
            let (core_start, core) = if opts.whole_word {
                trim_to_word_core(start, word)
            } else {
                (start, word)
            };
            if core.is_empty() {
                continue;
            }
            let dist = *verdicts
                .entry(core)
                .or_insert_with(|| word_candidate_distance(core, &term_chars, budget));
            let Some(dist) = dist else { continue };

            if opts.whole_word && !is_whole_word_span(hay, core_start, core_start + core.len()) {
                continue;
            }

            best = Some(best.map_or(dist, |b| b.min(dist)));
            positions.push(core_start);
            if !opts.collect_positions {
                break;
            }
        }

        match best {
            Some(dist) => {
                let score = dist as f64 / term_chars.len() as f64;
                FuzzyResult::hit(score, positions, started)
            }
            None => FuzzyResult::miss(started),
        }
    }

    /// Very large content: 10 uniformly spaced 5 000-byte windows, capped
    /// at 1 000 candidate words. The score is deliberately coarse.
    fn sampled_scan(
        &self,
        hay: &str,
        needle: &str,
        opts: &FuzzyOptions,
        started: Instant,
    ) -> FuzzyResult {
        let term_chars: Vec<char> = needle.chars().collect();
        let budget = edit_budget(term_chars.len());
        let len = hay.len();

        let stride = len.saturating_sub(SAMPLE_WINDOW_LEN) / (SAMPLE_WINDOWS - 1).max(1);
        let mut candidates: Vec<(usize, &str)> = Vec::new();

        'windows: for w in 0..SAMPLE_WINDOWS {
            let raw_start = (w * stride).min(len);
            let start = ceil_char(hay, raw_start);
            let end = floor_char(hay, (start + SAMPLE_WINDOW_LEN).min(len));
            if start >= end {
                continue;
            }
            for (off, word) in whitespace_words(&hay[start..end]) {
                if candidate_filter(word, &term_chars) {
                    candidates.push((start + off, word));
                    if candidates.len() >= SAMPLE_WORD_CAP {
                        break 'windows;
                    }
                }
            }
        }

        let mut positions = Vec::new();
        for (start, word) in candidates {
            let (core_start, core) =
                if opts.whole_word { trim_to_word_core(start, word) } else { (start, word) };
            if core.is_empty() {
                continue;
            }
            if word_candidate_distance(core, &term_chars, budget).is_some() {
                if opts.whole_word && !is_whole_word_span(hay, core_start, core_start + core.len())
                {
                    continue;
                }
                positions.push(core_start);
                if !opts.collect_positions {
                    break;
                }
            }
        }

        if positions.is_empty() {
            FuzzyResult::miss(started)
        } else {
            FuzzyResult::hit(SAMPLED_HIT_SCORE, positions, started)
        }
    }

    // -----------------------------------------------------------------------
    // Medium content: approximate-substring engine
    // -----------------------------------------------------------------------

    /// Sellers approximate-substring search: the edit distance of the term
    /// against the best-matching substring of the haystack, computed with a
    /// single u16 row. Configured with an edit budget of `0.4 × term len`
    /// and an acceptance ceiling of 0.6 on the normalized score.
    fn approx_engine(
        &self,
        hay: &str,
        needle: &str,
        opts: &FuzzyOptions,
        started: Instant,
    ) -> FuzzyResult {
        let term_chars: Vec<char> = needle.chars().collect();
        let t = term_chars.len();
        let max_dist = ((t as f64 * ENGINE_THRESHOLD).floor() as usize).max(1);

        let hay_chars: Vec<(usize, char)> = hay.char_indices().collect();
        let n = hay_chars.len();
        if n == 0 {
            return FuzzyResult::miss(started);
        }

        // col[i] = edit distance between term[..i] and some substring of
        // the haystack ending at the current position.
        let mut col: Vec<u16> = (0..=t as u16).collect();
        let mut matches: Vec<(usize, usize)> = Vec::new(); // (end char idx, dist)

        for (j, &(_, hc)) in hay_chars.iter().enumerate() {
            let mut prev_diag = col[0];
            // Substrings may start anywhere: row 0 stays 0.
            for i in 1..=t {
                let cost = if term_chars[i - 1] == hc { 0 } else { 1 };
                let next = (prev_diag + cost).min(col[i] + 1).min(col[i - 1] + 1);
                prev_diag = col[i];
                col[i] = next;
            }
            let dist = col[t] as usize;
            if dist <= max_dist {
                matches.push((j, dist));
                if !opts.collect_positions && !opts.whole_word {
                    break;
                }
            }
        }

        let mut best: Option<usize> = None;
        let mut positions = Vec::new();
        for (end_idx, dist) in matches {
            let score = dist as f64 / t as f64;
            if score >= ENGINE_ACCEPT_SCORE {
                continue;
            }
            // The match ends at `end_idx`; its start is approximately one
            // term length back.
            let start_char = (end_idx + 1).saturating_sub(t);
            let start_byte = hay_chars[start_char].0;
            let end_byte = hay_chars[end_idx].0 + hay_chars[end_idx].1.len_utf8();
            if opts.whole_word && !is_whole_word_span(hay, start_byte, end_byte) {
                continue;
            }
            best = Some(best.map_or(dist, |b| b.min(dist)));
            positions.push(start_byte);
            if !opts.collect_positions {
                break;
            }
        }

        match best {
            Some(dist) => FuzzyResult::hit(dist as f64 / t as f64, positions, started),
            None => FuzzyResult::miss(started),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn edit_budget(term_len: usize) -> usize {
    (term_len as f64 * EDIT_BUDGET_RATIO).floor() as usize
}

/// Exact-substring positions via an indexOf-style loop advancing by the
/// term length, with optional whole-word verification.
pub(crate) fn exact_positions(hay: &str, needle: &str, whole_word: bool) -> Vec<usize> {
    let mut positions = Vec::new();
    if needle.is_empty() {
        return positions;
    }
    let mut from = 0;
    while let Some(found) = hay[from..].find(needle) {
        let start = from + found;
        let end = start + needle.len();
        if !whole_word || is_whole_word_span(hay, start, end) {
            positions.push(start);
        }
        from = end;
    }
    positions
}

/// Iterate whitespace-separated words with their byte offsets.
fn whitespace_words(hay: &str) -> impl Iterator<Item = (usize, &str)> {
    hay.split_whitespace().map(move |w| {
        // Offset of this word within the haystack.
        let off = w.as_ptr() as usize - hay.as_ptr() as usize;
        (off, w)
    })
}

/// Strip non-word characters from both edges of a whitespace token,
/// keeping the byte offset of the surviving core.
fn trim_to_word_core(start: usize, word: &str) -> (usize, &str) {
    let trimmed_front = word.trim_start_matches(|c| !is_word_char(c));
    let lead = word.len() - trimmed_front.len();
    let core = trimmed_front.trim_end_matches(|c| !is_word_char(c));
    (start + lead, core)
}

/// Length band plus first/last character heuristic.
fn candidate_filter(word: &str, term_chars: &[char]) -> bool {
    let t = term_chars.len();
    let wl = word.chars().count();
    let low = (t as f64 * LENGTH_BAND_LOW).floor() as usize;
    let high = (t as f64 * LENGTH_BAND_HIGH).ceil() as usize;
    if wl < low || wl > high {
        return false;
    }
    let first = word.chars().next();
    let last = word.chars().next_back();
    first == term_chars.first().copied() || last == term_chars.last().copied()
}

/// Distance of a candidate word from the term, if it passes the filters
/// and lands within the budget.
fn word_candidate_distance(word: &str, term_chars: &[char], budget: usize) -> Option<usize> {
    if !candidate_filter(word, term_chars) {
        return None;
    }
    let word_chars: Vec<char> = word.chars().collect();
    levenshtein_within(&word_chars, term_chars, budget)
}

/// Single-row Levenshtein with common prefix/suffix stripping. Returns the
/// distance when it is ≤ `budget`.
fn levenshtein_within(a: &[char], b: &[char], budget: usize) -> Option<usize> {
    let mut a = a;
    let mut b = b;

    // Strip common prefix.
    let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    a = &a[prefix..];
    b = &b[prefix..];
    // Strip common suffix.
    let suffix =
        a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count();
    a = &a[..a.len() - suffix];
    b = &b[..b.len() - suffix];

    if a.len().abs_diff(b.len()) > budget {
        return None;
    }
    if a.is_empty() {
        return (b.len() <= budget).then_some(b.len());
    }
    if b.is_empty() {
        return (a.len() <= budget).then_some(a.len());
    }

    let mut row: Vec<u16> = (0..=b.len() as u16).collect();
    for (i, &ac) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i as u16 + 1;
        let mut row_min = row[0];
        for (j, &bc) in b.iter().enumerate() {
            let cost = if ac == bc { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j + 1] + 1).min(row[j] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
            row_min = row_min.min(next);
        }
        if row_min as usize > budget {
            return None;
        }
    }

    let dist = row[b.len()] as usize;
    (dist <= budget).then_some(dist)
}

fn floor_char(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_env() -> (CacheSet, Metrics) {
        (CacheSet::new(), Metrics::default())
    }

    fn search(content: &str, term: &str, opts: FuzzyOptions) -> FuzzyResult {
        let (caches, metrics) = matcher_env();
        FuzzyMatcher::new(&caches, &metrics).search(content, term, &opts)
    }

    fn collect() -> FuzzyOptions {
        FuzzyOptions { collect_positions: true, ..Default::default() }
    }

    #[test]
    fn empty_inputs_never_match() {
        assert!(!search("", "term", collect()).matched);
        assert!(!search("content", "", collect()).matched);
    }

    #[test]
    fn short_terms_match_exactly_only() {
        let r = search("ab abc", "ab", collect());
        assert!(r.matched);
        assert_eq!(r.positions, vec![0, 3]);
        assert!(!search("axb", "ab", collect()).matched);
    }

    #[test]
    fn exact_fast_path_scores_zero() {
        let r = search("an example here", "example", collect());
        assert!(r.matched);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.positions, vec![3]);
    }

    #[test]
    fn exact_path_is_case_insensitive_by_default() {
        let r = search("An EXAMPLE here", "example", collect());
        assert!(r.matched);
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn case_sensitive_exact_respects_case() {
        let opts =
            FuzzyOptions { case_sensitive: true, collect_positions: true, ..Default::default() };
        // Case differences are real edits under case sensitivity, and seven
        // of them far exceed the budget.
        assert!(!search("An EXAMPLE here", "example", opts).matched);
    }

    #[test]
    fn transposition_matches_in_medium_content() {
        // "exmaple" vs "example": two single-char edits.
        let r = search("an example here", "exmaple", collect());
        assert!(r.matched, "transposed term should fuzzy-match");
        assert!(r.score > 0.0 && r.score < ENGINE_ACCEPT_SCORE);
    }

    #[test]
    fn unrelated_term_misses() {
        let r = search("an example here", "zzyzxq", collect());
        assert!(!r.matched);
        assert_eq!(r.score, MISS_SCORE);
    }

    #[test]
    fn whole_word_exact_matches_only_standalone_words() {
        let content = "test testing tested contest";
        let with = search(
            content,
            "test",
            FuzzyOptions { whole_word: true, collect_positions: true, ..Default::default() },
        );
        assert_eq!(with.positions, vec![0]);
        // "test", "testing", "tested", and the tail of "contest".
        let without = search(content, "test", collect());
        assert_eq!(without.positions, vec![0, 5, 13, 23]);
    }

    #[test]
    fn whole_word_is_a_refinement() {
        let content = "test testing tested contest";
        let with = search(content, "test", FuzzyOptions { whole_word: true, collect_positions: true, ..Default::default() });
        let without = search(content, "test", collect());
        for p in &with.positions {
            assert!(without.positions.contains(p));
        }
    }

    #[test]
    fn large_content_word_scan_finds_typo() {
        let mut content = "lorem ipsum dolor sit amet ".repeat(500);
        content.push_str("an exmaple word");
        assert!(content.len() > LARGE_CONTENT && content.len() <= SAMPLED_CONTENT);
        let r = search(&content, "example", collect());
        assert!(r.matched);
        let pos = r.positions[0];
        assert_eq!(&content[pos..pos + 7], "exmaple");
    }

    #[test]
    fn word_scan_respects_edit_budget() {
        let mut content = "filler words only ".repeat(600);
        content.push_str("exxxxple");
        assert!(content.len() > LARGE_CONTENT);
        // 4 edits against a budget of ⌊7·0.3⌋ = 2.
        assert!(!search(&content, "example", collect()).matched);
    }

    #[test]
    fn sampled_scan_reports_coarse_score() {
        // The typo sits in the first sample window, so the sampled scan is
        // guaranteed to see it.
        let mut content = String::from("exmaple ");
        content.push_str(&"abcdef ghijkl mnopqr stuvwx ".repeat(3000));
        assert!(content.len() > SAMPLED_CONTENT);
        let r = search(&content, "example", collect());
        assert!(r.matched);
        assert_eq!(r.score, SAMPLED_HIT_SCORE);
        assert_eq!(r.positions, vec![0]);
    }

    #[test]
    fn sampled_scan_misses_unsampled_middle() {
        // Filler words never pass the first/last-character filter, so a
        // term outside every sample window stays unmatched.
        let mut content = "abcdef ghijkl mnopqr stuvwx ".repeat(3000);
        let mid = content.len() / 2;
        content.insert_str(mid, " zzzzzz ");
        assert!(content.len() > SAMPLED_CONTENT);
        let r = search(&content, "qqqqqq", collect());
        assert!(!r.matched);
        assert_eq!(r.score, MISS_SCORE);
    }

    #[test]
    fn result_cache_round_trips() {
        let (caches, metrics) = matcher_env();
        let fm = FuzzyMatcher::new(&caches, &metrics);
        let opts = collect();
        let a = fm.search("an example here", "exmaple", &opts);
        let b = fm.search("an example here", "exmaple", &opts);
        assert_eq!(a.matched, b.matched);
        assert_eq!(a.score, b.score);
        assert_eq!(a.positions, b.positions);
        // Only the first call actually ran the pipeline.
        assert_eq!(metrics.snapshot().fuzzy_searches, 1);
    }

    #[test]
    fn levenshtein_basics() {
        let a: Vec<char> = "kitten".chars().collect();
        let b: Vec<char> = "sitting".chars().collect();
        assert_eq!(levenshtein_within(&a, &b, 3), Some(3));
        assert_eq!(levenshtein_within(&a, &b, 2), None);
        let same: Vec<char> = "abc".chars().collect();
        assert_eq!(levenshtein_within(&same, &same, 0), Some(0));
    }

    #[test]
    fn levenshtein_length_gap_early_exit() {
        let a: Vec<char> = "ab".chars().collect();
        let b: Vec<char> = "abcdefgh".chars().collect();
        assert_eq!(levenshtein_within(&a, &b, 2), None);
    }

    #[test]
    fn candidate_filter_band_and_edges() {
        let term: Vec<char> = "example".chars().collect();
        assert!(candidate_filter("exmaple", &term));
        assert!(candidate_filter("sample", &term)); // shares last char
        assert!(!candidate_filter("ex", &term)); // below band
        assert!(!candidate_filter("zzzzzzz", &term)); // no shared edge chars
    }

    #[test]
    fn whitespace_words_offsets() {
        let words: Vec<(usize, &str)> = whitespace_words("  foo bar\tbaz").collect();
        assert_eq!(words, vec![(2, "foo"), (6, "bar"), (10, "baz")]);
    }

    #[test]
    fn trim_to_word_core_strips_punctuation() {
        assert_eq!(trim_to_word_core(10, "(test),"), (11, "test"));
        assert_eq!(trim_to_word_core(0, "plain"), (0, "plain"));
        assert_eq!(trim_to_word_core(5, "..."), (8, ""));
    }
}
