//! The four matchers: exact, wildcard, regex and fuzzy.
//!
//! Matchers are a tagged variant rather than a trait object; the planner
//! picks the variant from the query mode before candidate gathering, and
//! dispatch stays a plain `match`. Regex compilation is memoized in an
//! LRU-bounded cache keyed by pattern string.

use crate::error::{LoupeError, Result};
use crate::search::fuzzy;
use crate::search::query::SearchQuery;
use crate::types::{FileRecord, SearchMode};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Compiled matcher ready to score candidates.
#[derive(Clone)]
pub enum Matcher {
    /// Normalized equality of the whole name
    Exact {
        pattern: String,
        case_sensitive: bool,
    },
    /// Glob semantics: `*` any run (including empty), `?` one character
    Wildcard { pattern_lower: String },
    /// Compiled regular expression, shared out of the memo cache
    Regex { regex: Arc<Regex> },
    /// Best-of-three similarity with a threshold cut
    Fuzzy { pattern_lower: String, threshold: f64 },
}

impl Matcher {
    /// Build the matcher for a query, compiling patterns as needed.
    pub fn compile(query: &SearchQuery, regex_cache: &RegexCache) -> Result<Matcher> {
        match query.mode {
            SearchMode::Exact => Ok(Matcher::Exact {
                pattern: query.normalized_text(),
                case_sensitive: query.case_sensitive,
            }),
            SearchMode::Wildcard => Ok(Matcher::Wildcard {
                pattern_lower: query.text.to_lowercase(),
            }),
            SearchMode::Regex => Ok(Matcher::Regex {
                regex: regex_cache.get_or_compile(&query.text, query.case_sensitive)?,
            }),
            SearchMode::Fuzzy => Ok(Matcher::Fuzzy {
                pattern_lower: query.text.to_lowercase(),
                threshold: query.fuzzy_threshold.clamp(0.0, 1.0),
            }),
        }
    }

    /// Score a record's name. `None` means no match (or, for fuzzy, a
    /// score under the threshold); `Some(s)` carries the match score in
    /// [0, 1].
    pub fn score_name(&self, record: &FileRecord) -> Option<f64> {
        match self {
            Matcher::Exact {
                pattern,
                case_sensitive,
            } => {
                let matched = if *case_sensitive {
                    record.name == *pattern
                } else {
                    record.name_lower == *pattern
                };
                matched.then_some(1.0)
            }
            Matcher::Wildcard { pattern_lower } => {
                wildcard_match(pattern_lower, &record.name_lower).then_some(1.0)
            }
            Matcher::Regex { regex } => regex.is_match(&record.name).then_some(1.0),
            Matcher::Fuzzy {
                pattern_lower,
                threshold,
            } => {
                let score = fuzzy::similarity(pattern_lower, &record.name_lower);
                (score >= *threshold).then_some(score)
            }
        }
    }

    /// Raw score against an arbitrary string, used for the ranker's path
    /// feature. No threshold cut; exact uses substring containment.
    pub fn score_against(&self, text: &str) -> f64 {
        match self {
            Matcher::Exact {
                pattern,
                case_sensitive,
            } => {
                let contained = if *case_sensitive {
                    text.contains(pattern.as_str())
                } else {
                    text.to_lowercase().contains(&pattern.to_lowercase())
                };
                if contained {
                    1.0
                } else {
                    0.0
                }
            }
            Matcher::Wildcard { pattern_lower } => {
                if wildcard_match(pattern_lower, &text.to_lowercase()) {
                    1.0
                } else {
                    0.0
                }
            }
            Matcher::Regex { regex } => {
                if regex.is_match(text) {
                    1.0
                } else {
                    0.0
                }
            }
            Matcher::Fuzzy { pattern_lower, .. } => {
                fuzzy::similarity(pattern_lower, &text.to_lowercase())
            }
        }
    }
}

/// Literal prefix of a wildcard pattern up to the first metacharacter.
/// The planner uses it to narrow candidates through the trie when it is
/// at least two characters long.
pub fn wildcard_literal_prefix(pattern: &str) -> &str {
    let end = pattern
        .find(|c| c == '*' || c == '?')
        .unwrap_or(pattern.len());
    &pattern[..end]
}

/// Iterative glob match: linear two-pointer scan that backtracks only to
/// the last `*`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let mut pi = 0; // position in pattern
    let mut ti = 0; // position in text
    let mut star = None; // pattern position after the last '*'
    let mut star_ti = 0; // text position when that '*' was seen

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi + 1);
            star_ti = ti;
            pi += 1;
        } else if let Some(restart) = star {
            // Let the previous '*' absorb one more character
            pi = restart;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// LRU-bounded memo cache for compiled regular expressions.
pub struct RegexCache {
    cache: Mutex<LruCache<String, Arc<Regex>>>,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        RegexCache {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Fetch a compiled pattern, compiling and caching on miss. Invalid
    /// patterns fail the query with `InvalidPattern`.
    pub fn get_or_compile(&self, pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
        let key = format!("{}:{}", case_sensitive, pattern);
        let mut cache = self.cache.lock();
        if let Some(regex) = cache.get(&key) {
            return Ok(Arc::clone(regex));
        }

        let source = if case_sensitive {
            pattern.to_string()
        } else {
            format!("(?i){}", pattern)
        };
        let regex = Regex::new(&source).map_err(|e| LoupeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let regex = Arc::new(regex);
        cache.put(key, Arc::clone(&regex));
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        RegexCache::new(64)
    }
}
