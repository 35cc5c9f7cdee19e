//! Word-token boundaries.
//!
//! Tokenization feeds the NEAR evaluator: every occurrence position is
//! translated to a word index, and proximity is measured in word tokens.
//! Boundary sets are cached per content fingerprint; point lookups go
//! through a second `(fingerprint, offset)` cache.

use crate::cache::CacheSet;
use crate::fingerprint::Fingerprint;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Letters, digits, underscore, and the Latin-1 supplement range.
static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_\u{00C0}-\u{00FF}]+").expect("word regex is valid"));

/// Content above this many bytes is tokenized chunk-wise.
const CHUNKED_THRESHOLD: usize = 100_000;

/// Chunk span for chunked tokenization.
const BOUNDARY_CHUNK: usize = 50_000;

/// Seam overlap so tokens split across a chunk join are re-evaluated.
const SEAM_OVERLAP: usize = 32;

/// Boundary counts above this use binary search for index lookups.
const BINARY_SEARCH_THRESHOLD: usize = 20;

/// A word token's inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub start: usize,
    /// Index of the token's last byte (inclusive).
    pub end: usize,
}

impl Boundary {
    /// The token's text within its source content.
    pub fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..=self.end]
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{C0}'..='\u{FF}').contains(&c)
}

/// True when the byte span `[start, end)` is not flanked by word characters,
/// i.e. it matches as a whole word.
pub(crate) fn is_whole_word_span(hay: &str, start: usize, end: usize) -> bool {
    let before_ok = hay[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
    let after_ok = hay[end..].chars().next().is_none_or(|c| !is_word_char(c));
    before_ok && after_ok
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn has_at_least_two_chars(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some() && chars.next().is_some()
}

/// Tokenize content in one regex pass. Single-character tokens are dropped.
fn compute_direct(content: &str) -> Vec<Boundary> {
    WORD_RE
        .find_iter(content)
        .filter(|m| has_at_least_two_chars(m.as_str()))
        .map(|m| Boundary { start: m.start(), end: m.end() - 1 })
        .collect()
}

/// Chunked tokenization for large blobs. Each chunk is scanned with a seam
/// overlap so a token cut by the previous chunk end is found whole; tokens
/// longer than the overlap are recovered by walking back to their true
/// start.
fn compute_chunked(content: &str) -> Vec<Boundary> {
    let len = content.len();
    let mut out: Vec<Boundary> = Vec::new();
    let mut chunk_start = 0usize;

    while chunk_start < len {
        let chunk_end = floor_char_boundary(content, (chunk_start + BOUNDARY_CHUNK).min(len));
        let win_start = ceil_char_boundary(content, chunk_start.saturating_sub(SEAM_OVERLAP));
        let window = &content[win_start..chunk_end];

        for m in WORD_RE.find_iter(window) {
            let mut abs_start = win_start + m.start();
            let abs_end = win_start + m.end();

            // A token touching the chunk end may continue into the next
            // chunk; the next window's seam overlap re-finds it whole.
            if abs_end == chunk_end && chunk_end != len {
                continue;
            }

            // A match flush against the window start can be the tail of a
            // token that began before the seam; walk back to its true start.
            if abs_start == win_start && win_start > 0 {
                let mut start = abs_start;
                for c in content[..abs_start].chars().rev() {
                    if is_word_char(c) {
                        start -= c.len_utf8();
                    } else {
                        break;
                    }
                }
                abs_start = start;
            }

            if !has_at_least_two_chars(&content[abs_start..abs_end]) {
                continue;
            }
            if out.last().is_none_or(|b| abs_start > b.end) {
                out.push(Boundary { start: abs_start, end: abs_end - 1 });
            }
        }

        if chunk_end == len {
            break;
        }
        chunk_start = chunk_end;
    }

    out
}

/// Tokenize without touching any cache. Exposed for the processor's
/// overlap sizing and for tests.
pub(crate) fn tokenize(content: &str) -> Vec<Boundary> {
    if content.len() > CHUNKED_THRESHOLD {
        compute_chunked(content)
    } else {
        compute_direct(content)
    }
}

/// Cached word-boundary lookups over one engine's cache set.
pub(crate) struct WordBoundaries<'c> {
    caches: &'c CacheSet,
}

impl<'c> WordBoundaries<'c> {
    pub fn new(caches: &'c CacheSet) -> Self {
        Self { caches }
    }

    /// The boundary set for this content, computed on first use.
    pub fn boundaries(&self, content: &str, fp: &Fingerprint) -> Arc<Vec<Boundary>> {
        if let Some(b) = self.caches.boundaries.get(fp) {
            return b;
        }
        let computed = Arc::new(tokenize(content));
        self.caches.boundaries.insert(fp.clone(), Arc::clone(&computed));
        computed
    }

    /// Word index for a byte offset: a direct hit on a token, or the
    /// nearest preceding token when only whitespace separates them, or −1.
    pub fn word_index(&self, content: &str, fp: &Fingerprint, offset: usize) -> i32 {
        let key = (fp.clone(), offset);
        if let Some(idx) = self.caches.word_index.get(&key) {
            return idx;
        }

        let boundaries = self.boundaries(content, fp);
        let idx = Self::lookup(&boundaries, content, offset);
        self.caches.word_index.insert(key, idx);
        idx
    }

    fn lookup(boundaries: &[Boundary], content: &str, offset: usize) -> i32 {
        if boundaries.is_empty() {
            return -1;
        }

        // Greatest index whose start is ≤ offset.
        let candidate = if boundaries.len() > BINARY_SEARCH_THRESHOLD {
            let n = boundaries.partition_point(|b| b.start <= offset);
            if n == 0 {
                return -1;
            }
            n - 1
        } else {
            let mut found = None;
            for (i, b) in boundaries.iter().enumerate() {
                if b.start > offset {
                    break;
                }
                found = Some(i);
            }
            match found {
                Some(i) => i,
                None => return -1,
            }
        };

        let b = boundaries[candidate];
        if offset <= b.end {
            return candidate as i32;
        }

        // Trailing-whitespace attribution: the gap from the token end up to
        // and including the offset must be whitespace only.
        let mut pos = b.end + 1;
        for c in content[pos..].chars() {
            if pos > offset {
                break;
            }
            if !c.is_whitespace() {
                return -1;
            }
            pos += c.len_utf8();
        }
        candidate as i32
    }

    /// Distance in word tokens between two byte offsets, −1 when either
    /// offset resolves to no token.
    pub fn word_distance(&self, content: &str, fp: &Fingerprint, a: usize, b: usize) -> i32 {
        let ia = self.word_index(content, fp, a);
        let ib = self.word_index(content, fp, b);
        if ia < 0 || ib < 0 {
            return -1;
        }
        (ia - ib).abs()
    }
}
