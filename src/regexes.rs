//! Regex compilation and caching.
//!
//! Compiled regexes are shared through the engine cache keyed by
//! `(pattern, flags)`. Iteration is always global — callers use
//! `find_iter`, which owns its own cursor, so no iteration state is ever
//! shared between concurrent matcher calls. The linear-time engine rejects
//! backreferences and look-around at compile time, which is exactly the
//! advisory the compiler is required to enforce.

use crate::cache::CacheSet;
use crate::error::ParseError;
use crate::metrics::Metrics;
use regex::Regex;
use std::sync::Arc;

/// Flags accepted on `/pattern/flags` literals. `u` is the regex crate's
/// default and `g` is implied by global iteration; both are tolerated.
const KNOWN_FLAGS: &[char] = &['i', 'm', 's', 'u', 'g'];

pub(crate) struct RegexCompiler<'c> {
    caches: &'c CacheSet,
    metrics: &'c Metrics,
}

impl<'c> RegexCompiler<'c> {
    pub fn new(caches: &'c CacheSet, metrics: &'c Metrics) -> Self {
        Self { caches, metrics }
    }

    /// Compile `pattern` under the given flag string, reusing the cache.
    pub fn compile(&self, pattern: &str, flags: &str) -> Result<Arc<Regex>, ParseError> {
        for f in flags.chars() {
            if !KNOWN_FLAGS.contains(&f) {
                return Err(ParseError::Regex(format!("unsupported regex flag '{f}'")));
            }
        }

        let key = (Box::<str>::from(pattern), Box::<str>::from(normalize_flags(flags)));
        if let Some(re) = self.caches.regexes.get(&key) {
            return Ok(re);
        }

        let mut inline = String::new();
        for f in ['i', 'm', 's'] {
            if flags.contains(f) {
                inline.push(f);
            }
        }
        let full = if inline.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{inline}){pattern}")
        };

        Metrics::bump(&self.metrics.regex_compiles);
        let re = Regex::new(&full).map_err(|e| ParseError::Regex(e.to_string()))?;
        let re = Arc::new(re);
        self.caches.regexes.insert(key, Arc::clone(&re));
        Ok(re)
    }
}

/// Canonical flag order so `/x/im` and `/x/mi` share a cache slot.
fn normalize_flags(flags: &str) -> String {
    let mut out = String::new();
    for f in ['i', 'm', 's'] {
        if flags.contains(f) {
            out.push(f);
        }
    }
    out
}
