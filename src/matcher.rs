//! Predicate compilation and evaluation.
//!
//! `compile_matcher` turns a query (string or structured) into a
//! [`ContentMatcher`]: a reusable, thread-safe predicate over content.
//! Evaluation walks the sum-type AST bottom-up; `And`/`Or` short-circuit
//! and `Not` inverts. Atom evaluation consults the fuzzy matcher when the
//! run enables fuzziness for its position, the regex cache for regex atoms,
//! and the NEAR evaluator for proximity nodes. Regex validity is settled
//! here at compile time — evaluation never reports a parse problem.

use crate::cache::CacheSet;
use crate::error::ParseError;
use crate::fuzzy::{exact_positions, FuzzyMatcher, FuzzyOptions};
use crate::metrics::Metrics;
use crate::near::NearEvaluator;
use crate::query::{parse_boolean, QueryNode};
use crate::regexes::RegexCompiler;
use crate::types::{ContentSearchMode, MatchOptions, AVG_WORD_LEN};
use std::sync::Arc;

/// Floor for the processor's overlap window, covering small atoms.
const MIN_OVERLAP: usize = 64;

/// Verdict plus the occurrence positions that produced it.
#[derive(Debug, Clone, Default)]
pub struct MatchDetail {
    pub matched: bool,
    pub positions: Vec<usize>,
}

/// A compiled, reusable content predicate. Cheap to clone; safe to call
/// concurrently on distinct content values.
#[derive(Clone)]
pub struct ContentMatcher {
    ast: Arc<QueryNode>,
    opts: MatchOptions,
    caches: Arc<CacheSet>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for ContentMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentMatcher")
            .field("ast", &self.ast)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl ContentMatcher {
    pub fn options(&self) -> &MatchOptions {
        &self.opts
    }

    pub fn ast(&self) -> &QueryNode {
        &self.ast
    }

    /// Evaluate the predicate against one content value.
    pub fn is_match(&self, content: &str) -> bool {
        self.eval(&self.ast, content)
    }

    /// Evaluate and report the occurrence positions that carried the
    /// verdict: byte offsets of positive term and regex hits (offsets into
    /// the case-folded haystack for case-insensitive terms). Negated
    /// subtrees and NEAR nodes contribute their verdict but no positions.
    pub fn evaluate(&self, content: &str) -> MatchDetail {
        let mut positions = Vec::new();
        let matched = self.eval_collect(&self.ast, content, &mut positions);
        if matched {
            positions.sort_unstable();
            positions.dedup();
        } else {
            positions.clear();
        }
        MatchDetail { matched, positions }
    }

    fn eval_collect(&self, node: &QueryNode, content: &str, out: &mut Vec<usize>) -> bool {
        match node {
            QueryNode::And { left, right } => {
                let checkpoint = out.len();
                if !self.eval_collect(left, content, out) {
                    out.truncate(checkpoint);
                    return false;
                }
                if !self.eval_collect(right, content, out) {
                    out.truncate(checkpoint);
                    return false;
                }
                true
            }
            QueryNode::Or { left, right } => {
                self.eval_collect(left, content, out) || self.eval_collect(right, content, out)
            }
            // A negation match is the absence of occurrences.
            QueryNode::Not { node } => !self.eval(node, content),
            QueryNode::Near { .. } => self.eval(node, content),
            QueryNode::Term { text, case_sensitive, whole_word } => {
                let case_sensitive = case_sensitive.unwrap_or(self.opts.case_sensitive);
                let whole_word = whole_word.unwrap_or(self.opts.whole_word);
                let positions = if self.opts.fuzzy_boolean {
                    let fuzzy = FuzzyMatcher::new(&self.caches, &self.metrics);
                    let fopts =
                        FuzzyOptions { case_sensitive, whole_word, collect_positions: true };
                    fuzzy.search(content, text, &fopts).positions
                } else if case_sensitive {
                    exact_positions(content, text, whole_word)
                } else {
                    let hay = self.caches.normalized_form(content);
                    let needle = self.caches.normalized_form(text);
                    exact_positions(&hay, &needle, whole_word)
                };
                let matched = !positions.is_empty();
                out.extend(positions);
                matched
            }
            QueryNode::Regex { pattern, flags } => {
                match RegexCompiler::new(&self.caches, &self.metrics).compile(pattern, flags) {
                    Ok(re) => {
                        let before = out.len();
                        out.extend(re.find_iter(content).map(|m| m.start()));
                        out.len() > before
                    }
                    Err(_) => false,
                }
            }
        }
    }

    fn eval(&self, node: &QueryNode, content: &str) -> bool {
        match node {
            QueryNode::And { left, right } => {
                self.eval(left, content) && self.eval(right, content)
            }
            QueryNode::Or { left, right } => {
                self.eval(left, content) || self.eval(right, content)
            }
            QueryNode::Not { node } => !self.eval(node, content),
            QueryNode::Near { left, right, k } => {
                NearEvaluator::new(&self.caches, &self.metrics)
                    .evaluate(content, left, right, *k, &self.opts)
            }
            QueryNode::Term { text, case_sensitive, whole_word } => {
                let case_sensitive = case_sensitive.unwrap_or(self.opts.case_sensitive);
                let whole_word = whole_word.unwrap_or(self.opts.whole_word);
                if self.opts.fuzzy_boolean {
                    let fuzzy = FuzzyMatcher::new(&self.caches, &self.metrics);
                    let fopts =
                        FuzzyOptions { case_sensitive, whole_word, collect_positions: false };
                    fuzzy.search(content, text, &fopts).matched
                } else if case_sensitive {
                    !exact_positions(content, text, whole_word).is_empty()
                } else {
                    let hay = self.caches.normalized_form(content);
                    let needle = self.caches.normalized_form(text);
                    !exact_positions(&hay, &needle, whole_word).is_empty()
                }
            }
            QueryNode::Regex { pattern, flags } => {
                match RegexCompiler::new(&self.caches, &self.metrics).compile(pattern, flags) {
                    Ok(re) => re.is_match(content),
                    Err(_) => false, // validated at compile time; a miss is the safe answer
                }
            }
        }
    }

    /// The largest span of content the predicate can observe at once: the
    /// streaming processor keeps this many trailing bytes as overlap so no
    /// chunk seam can hide a match.
    pub(crate) fn required_overlap(&self) -> usize {
        fn walk(node: &QueryNode) -> usize {
            match node {
                QueryNode::Term { text, .. } => text.len() * 2,
                QueryNode::Regex { pattern, .. } => pattern.len() * 2,
                QueryNode::Near { left, right, k } => {
                    walk(left) + walk(right) + *k as usize * AVG_WORD_LEN
                }
                QueryNode::And { left, right } | QueryNode::Or { left, right } => {
                    walk(left).max(walk(right))
                }
                QueryNode::Not { node } => walk(node),
            }
        }
        walk(&self.ast).max(MIN_OVERLAP)
    }
}

/// Compile a query under the given mode and options.
///
/// `Term` mode treats the whole input as one literal; `Regex` mode treats
/// it as one pattern (case-folded via an `i` flag when the run is
/// case-insensitive); `Boolean` mode parses the mini-language. Every regex
/// atom is compiled eagerly so pattern errors surface now.
pub(crate) fn compile_matcher(
    query: &str,
    mode: ContentSearchMode,
    opts: MatchOptions,
    caches: Arc<CacheSet>,
    metrics: Arc<Metrics>,
) -> Result<ContentMatcher, ParseError> {
    let ast = match mode {
        ContentSearchMode::Term => {
            if query.is_empty() {
                return Err(ParseError::EmptyQuery);
            }
            QueryNode::term(query)
        }
        ContentSearchMode::Regex => {
            if query.is_empty() {
                return Err(ParseError::EmptyQuery);
            }
            QueryNode::Regex {
                pattern: query.to_string(),
                flags: if opts.case_sensitive { String::new() } else { "i".to_string() },
            }
        }
        ContentSearchMode::Boolean => parse_boolean(query)?,
    };
    compile_node(ast, opts, caches, metrics)
}

/// Compile a structured query tree, validating the NEAR invariant.
pub(crate) fn compile_node(
    ast: QueryNode,
    opts: MatchOptions,
    caches: Arc<CacheSet>,
    metrics: Arc<Metrics>,
) -> Result<ContentMatcher, ParseError> {
    ast.validate()?;
    precompile_regexes(&ast, &caches, &metrics)?;
    Ok(ContentMatcher { ast: Arc::new(ast), opts, caches, metrics })
}

fn precompile_regexes(
    node: &QueryNode,
    caches: &CacheSet,
    metrics: &Metrics,
) -> Result<(), ParseError> {
    match node {
        QueryNode::Regex { pattern, flags } => {
            RegexCompiler::new(caches, metrics).compile(pattern, flags)?;
            Ok(())
        }
        QueryNode::Near { left, right, .. } => {
            precompile_regexes(left, caches, metrics)?;
            precompile_regexes(right, caches, metrics)
        }
        QueryNode::And { left, right } | QueryNode::Or { left, right } => {
            precompile_regexes(left, caches, metrics)?;
            precompile_regexes(right, caches, metrics)
        }
        QueryNode::Not { node } => precompile_regexes(node, caches, metrics),
        QueryNode::Term { .. } => Ok(()),
    }
}
