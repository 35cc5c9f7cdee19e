//! NEAR proximity evaluation.
//!
//! `NEAR(a, b, k)` holds when some occurrence of `a` lies within `k` word
//! tokens of some occurrence of `b`. Order does not matter and the distance
//! is symmetric; `k = 0` requires both atoms to land on the same token.
//! Occurrence positions come from exact or fuzzy term search (the fuzzy
//! gate is the run-level `fuzzy_near` setting) or from global regex
//! iteration, are translated to word indices, and merged with two pointers.

use crate::boundaries::WordBoundaries;
use crate::cache::{CacheSet, CachedVerdict};
use crate::error::ParseError;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::fuzzy::{exact_positions, FuzzyMatcher, FuzzyOptions};
use crate::metrics::Metrics;
use crate::query::QueryNode;
use crate::regexes::RegexCompiler;
use crate::types::{MatchOptions, AVG_WORD_LEN, MAX_FULL_CONTENT_SIZE};
use std::sync::Arc;

/// Extra overlap padding so atom occurrences flush against a chunk seam
/// are still seen whole by the next chunk.
const CHUNK_OVERLAP_PAD: usize = 256;

/// Chunk span for oversized content, matching the processor's default.
const NEAR_CHUNK: usize = 64 * 1024;

pub(crate) struct NearEvaluator<'c> {
    caches: &'c CacheSet,
    metrics: &'c Metrics,
}

impl<'c> NearEvaluator<'c> {
    pub fn new(caches: &'c CacheSet, metrics: &'c Metrics) -> Self {
        Self { caches, metrics }
    }

    /// Evaluate a NEAR node. `left` and `right` must be atoms; the parser
    /// and the structured-form validator both enforce that upstream.
    pub fn evaluate(
        &self,
        content: &str,
        left: &QueryNode,
        right: &QueryNode,
        k: u32,
        opts: &MatchOptions,
    ) -> bool {
        if content.is_empty() {
            return false;
        }
        Metrics::bump(&self.metrics.near_evaluations);

        if content.len() > MAX_FULL_CONTENT_SIZE {
            return self.evaluate_chunked(content, left, right, k, opts);
        }
        self.evaluate_whole(content, left, right, k, opts)
    }

    /// Overlapping chunks for content too large to hold as one haystack;
    /// any positive chunk short-circuits.
    fn evaluate_chunked(
        &self,
        content: &str,
        left: &QueryNode,
        right: &QueryNode,
        k: u32,
        opts: &MatchOptions,
    ) -> bool {
        let overlap = k as usize * AVG_WORD_LEN + CHUNK_OVERLAP_PAD;
        let mut start = 0usize;
        while start < content.len() {
            let end = floor_char(content, (start + NEAR_CHUNK).min(content.len()));
            let win_start = ceil_char(content, start.saturating_sub(overlap));
            if self.evaluate_whole(&content[win_start..end], left, right, k, opts) {
                return true;
            }
            if end == content.len() {
                break;
            }
            start = end;
        }
        false
    }

    fn evaluate_whole(
        &self,
        content: &str,
        left: &QueryNode,
        right: &QueryNode,
        k: u32,
        opts: &MatchOptions,
    ) -> bool {
        let fp = fingerprint(content);
        let key = match (left.atom_key(opts, opts.fuzzy_near), right.atom_key(opts, opts.fuzzy_near))
        {
            (Some(l), Some(r)) => crate::query::AtomKey::Near {
                left: Box::new(l),
                right: Box::new(r),
                k,
            },
            _ => return false, // non-atom operands cannot reach evaluation
        };
        if let Some(cached) = self.caches.results.get(&(fp.clone(), key.clone())) {
            return cached.matched;
        }

        let matched = self.positions_within_k(content, left, right, k, opts);
        self.caches.results.insert(
            (fp, key),
            CachedVerdict {
                matched,
                score: if matched { 0.0 } else { 1.0 },
                positions: Arc::new(Vec::new()),
                positions_complete: true,
            },
        );
        matched
    }

    fn positions_within_k(
        &self,
        content: &str,
        left: &QueryNode,
        right: &QueryNode,
        k: u32,
        opts: &MatchOptions,
    ) -> bool {
        let Some(left_occ) = self.atom_occurrences(content, left, opts) else { return false };
        if left_occ.positions.is_empty() {
            return false;
        }
        let Some(right_occ) = self.atom_occurrences(content, right, opts) else { return false };
        if right_occ.positions.is_empty() {
            return false;
        }

        let wb = WordBoundaries::new(self.caches);
        let left_idx = word_indices(&wb, &left_occ);
        let right_idx = word_indices(&wb, &right_occ);

        indices_within_k(&left_idx, &right_idx, k)
    }

    /// Collect every occurrence position of an atom, together with the
    /// haystack those byte offsets refer to.
    fn atom_occurrences<'a>(
        &self,
        content: &'a str,
        atom: &QueryNode,
        opts: &MatchOptions,
    ) -> Option<Occurrences<'a>> {
        match atom {
            QueryNode::Term { text, case_sensitive, whole_word } => {
                let case_sensitive = case_sensitive.unwrap_or(opts.case_sensitive);
                let whole_word = whole_word.unwrap_or(opts.whole_word);
                let hay = if case_sensitive {
                    Haystack::Raw(content)
                } else {
                    Haystack::Folded(self.caches.normalized_form(content))
                };
                if opts.fuzzy_near {
                    let fuzzy = FuzzyMatcher::new(self.caches, self.metrics);
                    let fopts =
                        FuzzyOptions { case_sensitive, whole_word, collect_positions: true };
                    let result = fuzzy.search(content, text, &fopts);
                    Some(Occurrences::new(hay, result.positions))
                } else {
                    let needle = if case_sensitive {
                        text.clone()
                    } else {
                        self.caches.normalized_form(text).to_string()
                    };
                    let positions = exact_positions(hay.as_str(), &needle, whole_word);
                    Some(Occurrences::new(hay, positions))
                }
            }
            QueryNode::Regex { pattern, flags } => {
                let compiler = RegexCompiler::new(self.caches, self.metrics);
                let re = match compiler.compile(pattern, flags) {
                    Ok(re) => re,
                    // Invalid regexes are a compile-time error; an atom that
                    // slipped through degrades to a clean miss.
                    Err(ParseError::Regex(msg)) => {
                        tracing::warn!(pattern, %msg, "regex atom failed to compile at evaluate time");
                        return None;
                    }
                    Err(_) => return None,
                };
                let positions: Vec<usize> = re.find_iter(content).map(|m| m.start()).collect();
                Some(Occurrences::new(Haystack::Raw(content), positions))
            }
            _ => None,
        }
    }
}

/// The haystack a set of positions indexes into: the raw content, or its
/// case-folded form when the atom matched case-insensitively.
enum Haystack<'a> {
    Raw(&'a str),
    Folded(Arc<str>),
}

impl Haystack<'_> {
    fn as_str(&self) -> &str {
        match self {
            Haystack::Raw(s) => s,
            Haystack::Folded(s) => s,
        }
    }
}

struct Occurrences<'a> {
    hay: Haystack<'a>,
    fp: Fingerprint,
    positions: Vec<usize>,
}

impl<'a> Occurrences<'a> {
    fn new(hay: Haystack<'a>, positions: Vec<usize>) -> Self {
        let fp = fingerprint(hay.as_str());
        Self { hay, fp, positions }
    }
}

/// Translate occurrence byte offsets to sorted, deduplicated word indices.
fn word_indices(wb: &WordBoundaries<'_>, occ: &Occurrences<'_>) -> Vec<i32> {
    let mut indices: Vec<i32> = occ
        .positions
        .iter()
        .map(|&p| wb.word_index(occ.hay.as_str(), &occ.fp, p))
        .filter(|&i| i >= 0)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Two-pointer merge over two sorted index lists: advance the pointer at
/// the smaller index, succeed as soon as the gap is ≤ k.
fn indices_within_k(left: &[i32], right: &[i32], k: u32) -> bool {
    let mut i = 0;
    let mut j = 0;
    while i < left.len() && j < right.len() {
        let gap = (left[i] - right[j]).unsigned_abs();
        if gap <= k {
            return true;
        }
        if left[i] < right[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
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

    fn eval(content: &str, left: QueryNode, right: QueryNode, k: u32, opts: MatchOptions) -> bool {
        let caches = CacheSet::new();
        let metrics = Metrics::default();
        NearEvaluator::new(&caches, &metrics).evaluate(content, &left, &right, k, &opts)
    }

    fn term(t: &str) -> QueryNode {
        QueryNode::term(t)
    }

    #[test]
    fn quick_fox_within_two_words() {
        let content = "The quick brown fox jumps over the lazy dog ".repeat(10);
        assert!(eval(&content, term("quick"), term("fox"), 2, MatchOptions::default()));
        assert!(!eval(&content, term("quick"), term("fox"), 0, MatchOptions::default()));
    }

    #[test]
    fn near_is_symmetric() {
        let content = "alpha beta gamma delta epsilon";
        for k in 0..4 {
            assert_eq!(
                eval(content, term("alpha"), term("delta"), k, MatchOptions::default()),
                eval(content, term("delta"), term("alpha"), k, MatchOptions::default()),
                "asymmetry at k={k}"
            );
        }
    }

    #[test]
    fn near_is_monotone_in_k() {
        let content = "one two three four five six seven";
        let mut prev = false;
        for k in 0..8 {
            let now = eval(content, term("one"), term("five"), k, MatchOptions::default());
            assert!(!prev || now, "k={k} regressed a smaller-k match");
            prev = now;
        }
        assert!(prev);
    }

    #[test]
    fn k_zero_means_same_token() {
        // Both atoms occur inside the same word token.
        let content = "foobar baz";
        assert!(eval(content, term("foo"), term("bar"), 0, MatchOptions::default()));
        assert!(!eval(content, term("foo"), term("baz"), 0, MatchOptions::default()));
    }

    #[test]
    fn missing_atom_fails() {
        let content = "alpha beta gamma";
        assert!(!eval(content, term("alpha"), term("zeta"), 100, MatchOptions::default()));
        assert!(!eval("", term("a"), term("b"), 1, MatchOptions::default()));
    }

    #[test]
    fn regex_atom_positions() {
        let content = "error on line seven, warning on line nine";
        let re = QueryNode::Regex { pattern: r"warn\w+".to_string(), flags: String::new() };
        assert!(eval(content, term("seven"), re.clone(), 2, MatchOptions::default()));
        assert!(!eval(content, term("error"), re, 2, MatchOptions::default()));
    }

    #[test]
    fn case_insensitive_terms_by_default() {
        let content = "The Quick Brown Fox";
        assert!(eval(content, term("quick"), term("fox"), 2, MatchOptions::default()));
        let cs = MatchOptions { case_sensitive: true, ..Default::default() };
        assert!(!eval(content, term("quick"), term("fox"), 2, cs));
    }

    #[test]
    fn whole_word_constrains_occurrences() {
        let content = "testing near contest zones";
        let ww = MatchOptions { whole_word: true, ..Default::default() };
        // "test" occurs only inside larger words; whole-word finds nothing.
        assert!(!eval(content, term("test"), term("zones"), 10, ww));
        assert!(eval(content, term("test"), term("zones"), 10, MatchOptions::default()));
    }

    #[test]
    fn fuzzy_near_uses_fuzzy_positions() {
        let content = "the exmaple sits near the answer";
        let fz = MatchOptions { fuzzy_near: true, ..Default::default() };
        assert!(eval(content, term("example"), term("answer"), 5, fz));
        assert!(!eval(content, term("example"), term("answer"), 5, MatchOptions::default()));
    }

    #[test]
    fn two_pointer_merge_cases() {
        assert!(indices_within_k(&[0, 10, 20], &[12], 2));
        assert!(!indices_within_k(&[0, 10, 20], &[15], 2));
        assert!(indices_within_k(&[5], &[5], 0));
        assert!(!indices_within_k(&[], &[1], 100));
        assert!(indices_within_k(&[1, 100], &[50, 101], 1));
    }

    #[test]
    fn chunked_content_short_circuits() {
        // Push the pair past the full-content threshold so the chunked path
        // runs, with the pair inside one chunk.
        let mut content = String::from("needle haystack ");
        content.push_str(&"pad ".repeat(MAX_FULL_CONTENT_SIZE / 4 + 1));
        assert!(content.len() > MAX_FULL_CONTENT_SIZE);
        assert!(eval(&content, term("needle"), term("haystack"), 1, MatchOptions::default()));
        assert!(!eval(&content, term("needle"), term("missing"), 1, MatchOptions::default()));
    }

    #[test]
    fn chunked_pair_straddling_seam_is_found() {
        // Left atom at the end of chunk 1, right atom at the start of chunk
        // 2; the overlap window must see both.
        let filler = "pad ".repeat(NEAR_CHUNK / 4 - 2);
        let mut content = filler;
        content.push_str("needle haystack ");
        content.push_str(&"pad ".repeat(MAX_FULL_CONTENT_SIZE / 4));
        assert!(content.len() > MAX_FULL_CONTENT_SIZE);
        assert!(eval(&content, term("needle"), term("haystack"), 1, MatchOptions::default()));
    }
}
