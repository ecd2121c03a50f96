//! Query planning and execution.
//!
//! The planner picks the cheapest candidate source for a query's shape,
//! runs the matcher over the candidates, applies filters, ranks, caps and
//! orders the results, and keeps the result cache warm. Candidate
//! gathering takes the shared side of the index lock; ranking happens on
//! copies outside any lock.
//!
//! Candidate sources by mode:
//!
//! | mode                    | source                                   |
//! |-------------------------|------------------------------------------|
//! | exact, caseless         | bloom → trie exact lookup                |
//! | exact, case-sensitive   | full scan with an equality predicate     |
//! | wildcard, literal ≥ 2   | trie prefix traversal                    |
//! | wildcard, otherwise     | full scan                                |
//! | regex                   | full scan (compiled pattern memoized)    |
//! | fuzzy                   | inverted-index token hits, scan fallback |
//! | empty text              | size/date ordered maps, scan fallback    |

use crate::cache::CacheManager;
use crate::error::Result;
use crate::index::FileIndex;
use crate::search::matchers::{wildcard_literal_prefix, Matcher, RegexCache};
use crate::search::query::SearchQuery;
use crate::search::ranker::Ranker;
use crate::types::{fold_path_key, tokenize, FileRecord, RankingConfig, SearchHit, SearchMode, SortOrder};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Candidate count above which matching and scoring go parallel.
const PARALLEL_MATCH_THRESHOLD: usize = 2_048;

/// Snapshot of engine-level search counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub total_searches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl SearchStats {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Outcome of one search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Ranked, capped, ordered hits
    pub hits: Vec<SearchHit>,

    /// Matches before the cap was applied
    pub total_matches: usize,

    /// Whether the outcome came straight from the result cache
    pub from_cache: bool,
}

/// Plans and executes queries against one index.
pub struct QueryPlanner {
    index: Arc<FileIndex>,
    cache: Arc<CacheManager>,
    regex_cache: RegexCache,
    ranking: RankingConfig,
    configured_max: usize,
    total_searches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl QueryPlanner {
    pub fn new(
        index: Arc<FileIndex>,
        cache: Arc<CacheManager>,
        ranking: RankingConfig,
        configured_max: usize,
    ) -> Self {
        QueryPlanner {
            index,
            cache,
            regex_cache: RegexCache::default(),
            ranking,
            configured_max: configured_max.max(1),
            total_searches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Run a query. A result-cache hit bypasses planning entirely and
    /// reproduces the cached ordering exactly.
    #[instrument(skip(self, query), fields(text = %query.text, mode = %query.mode))]
    pub fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        self.total_searches.fetch_add(1, Ordering::Relaxed);

        let fingerprint = query.fingerprint();
        if let Some(hits) = self.cache.get_results(&fingerprint) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Result cache hit");
            return Ok(SearchOutcome {
                total_matches: hits.len(),
                hits,
                from_cache: true,
            });
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let matcher = Matcher::compile(query, &self.regex_cache)?;
        let candidates = self.gather_candidates(query);
        debug!(candidates = candidates.len(), "Candidates gathered");

        let excludes: Vec<String> = query
            .exclude_paths
            .iter()
            .map(|p| fold_path_key(p))
            .collect();

        let match_all = query.text.is_empty();
        let ranker = Ranker::new(self.ranking);
        let score_one = |record: FileRecord| -> Option<SearchHit> {
            if !excludes.is_empty() {
                let key = record.path_key();
                if excludes.iter().any(|p| key.starts_with(p.as_str())) {
                    return None;
                }
            }
            let (name_score, path_score) = if match_all {
                (1.0, 1.0)
            } else {
                let name_score = matcher.score_name(&record)?;
                (name_score, matcher.score_against(&record.full_path))
            };
            let score = ranker.score(&record, name_score, path_score);
            Some(SearchHit::new(record, score))
        };

        let mut hits: Vec<SearchHit> = if candidates.len() > PARALLEL_MATCH_THRESHOLD {
            candidates.into_par_iter().filter_map(score_one).collect()
        } else {
            candidates.into_iter().filter_map(score_one).collect()
        };

        let total_matches = hits.len();
        hits.sort_by(Ranker::compare);
        hits.truncate(query.max_results.min(self.configured_max));
        order_hits(&mut hits, query.sort_order);

        let returned: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        self.index.record_access(&returned);

        self.cache.put_results(fingerprint, hits.clone());

        Ok(SearchOutcome {
            hits,
            total_matches,
            from_cache: false,
        })
    }

    /// Pick the candidate source from the query shape. Cheap filters
    /// (drives, extensions, size, date) are applied here; the path
    /// exclusion filter runs after gathering.
    fn gather_candidates(&self, query: &SearchQuery) -> Vec<FileRecord> {
        let cheap = cheap_filter(query);

        if query.text.is_empty() {
            // Filter-only queries go through the ordered maps when a range
            // is present, else degrade to a scan.
            if let Some(range) = query.size_range {
                let mut out = self.index.files_in_size_range(range.min, range.max);
                out.retain(&cheap);
                return out;
            }
            if let Some(range) = query.date_range {
                let mut out = self.index.files_modified_between(range.start, range.end);
                out.retain(&cheap);
                return out;
            }
            return self.index.scan(|r| cheap(r));
        }

        match query.mode {
            SearchMode::Exact => {
                if query.case_sensitive {
                    // The trie is case-folded; exact-case queries must not
                    // rely on it.
                    let pattern = query.text.clone();
                    self.index.scan(|r| r.name == pattern && cheap(r))
                } else {
                    let mut out = self.index.exact_candidates(&query.normalized_text());
                    out.retain(&cheap);
                    out
                }
            }
            SearchMode::Wildcard => {
                let prefix = wildcard_literal_prefix(&query.text).to_lowercase();
                if prefix.chars().count() >= 2 {
                    let mut out = self.index.prefix_candidates(&prefix);
                    out.retain(&cheap);
                    out
                } else {
                    self.index.scan(|r| cheap(r))
                }
            }
            SearchMode::Regex => self.index.scan(|r| cheap(r)),
            SearchMode::Fuzzy => {
                let tokens = tokenize(&query.text.to_lowercase(), "");
                let mut out = self.index.token_candidates(&tokens);
                if out.is_empty() {
                    // Typo queries hit no token exactly; let the fuzzy
                    // matcher see every name.
                    return self.index.scan(|r| cheap(r));
                }
                out.retain(&cheap);
                out
            }
        }
    }

    /// List a directory's children, name-ordered, through the path
    /// cache. Non-directories and unknown paths yield an empty list.
    pub fn browse(&self, path: &str) -> Vec<FileRecord> {
        let key = fold_path_key(path);
        if let Some(cached) = self.cache.get_path_results(&key) {
            return cached;
        }

        let records = match self.index.get_by_path(path) {
            Some(dir) if dir.kind.is_directory() => {
                let mut children = self.index.children_of(dir.id);
                children.sort_by(|a, b| a.name_lower.cmp(&b.name_lower));
                children
            }
            _ => Vec::new(),
        };
        self.cache.put_path_results(key, records.clone());
        records
    }

    /// Engine-level counters.
    pub fn stats(&self) -> SearchStats {
        SearchStats {
            total_searches: self.total_searches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Build the cheap pre-ranking filter for a query.
fn cheap_filter(query: &SearchQuery) -> impl Fn(&FileRecord) -> bool + Sync + '_ {
    move |record: &FileRecord| {
        if !query.include_drives.is_empty() && !query.include_drives.contains(&record.drive_id) {
            return false;
        }
        if !query.extensions.is_empty()
            && !query
                .extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&record.extension))
        {
            return false;
        }
        if let Some(range) = query.size_range {
            if !range.contains(record.size) {
                return false;
            }
        }
        if let Some(range) = query.date_range {
            if !range.contains(record.mtime) {
                return false;
            }
        }
        true
    }
}

/// Apply the final ordering. Relevance keeps the ranked order.
fn order_hits(hits: &mut [SearchHit], order: SortOrder) {
    match order {
        SortOrder::Relevance => {}
        SortOrder::Name => hits.sort_by(|a, b| a.record.name_lower.cmp(&b.record.name_lower)),
        SortOrder::Size => hits.sort_by(|a, b| b.record.size.cmp(&a.record.size)),
        SortOrder::Modified => hits.sort_by(|a, b| b.record.mtime.cmp(&a.record.mtime)),
        SortOrder::Accessed => hits.sort_by(|a, b| b.record.atime.cmp(&a.record.atime)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateRange, FileKind, SizeRange};
    use std::time::Duration;

    fn planner_with(records: Vec<FileRecord>) -> (Arc<FileIndex>, QueryPlanner) {
        let index = Arc::new(FileIndex::new());
        for record in records {
            index.add(record).unwrap();
        }
        let cache = Arc::new(CacheManager::with_capacities(
            64,
            64,
            64,
            Duration::from_secs(60),
        ));
        let planner = QueryPlanner::new(
            Arc::clone(&index),
            cache,
            RankingConfig::default(),
            1000,
        );
        (index, planner)
    }

    fn file(path: &str, size: u64, mtime: i64) -> FileRecord {
        FileRecord::new(path, FileKind::File)
            .with_size(size)
            .with_times(mtime, 0)
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_exact_caseless_via_trie() {
        let (_, planner) = planner_with(vec![
            file("/t/Readme.MD", 10, NOW),
            file("/t/other.txt", 10, NOW),
        ]);

        let outcome = planner.search(&SearchQuery::exact("readme.md")).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "Readme.MD");
        assert!(!outcome.from_cache);
    }

    #[test]
    fn test_exact_case_sensitive_full_scan() {
        let (_, planner) = planner_with(vec![
            file("/t/README.md", 10, NOW),
            file("/t/sub/readme.md", 10, NOW),
        ]);

        let query = SearchQuery::exact("README.md").with_case_sensitive(true);
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.full_path, "/t/README.md");
    }

    #[test]
    fn test_wildcard_case_insensitive() {
        let (_, planner) = planner_with(vec![
            file("/t/a.txt", 10, NOW),
            file("/t/sub/b.TXT", 10, NOW),
            file("/t/sub/c.log", 10, NOW),
        ]);

        let outcome = planner.search(&SearchQuery::wildcard("*.txt")).unwrap();
        assert_eq!(outcome.hits.len(), 2);
        // Equal scores break ties by shorter path
        assert_eq!(outcome.hits[0].record.name, "a.txt");
        assert_eq!(outcome.hits[1].record.name, "b.TXT");
    }

    #[test]
    fn test_wildcard_with_literal_prefix() {
        let (_, planner) = planner_with(vec![
            file("/t/report_a.pdf", 10, NOW),
            file("/t/report_b.doc", 10, NOW),
            file("/t/summary.pdf", 10, NOW),
        ]);

        let outcome = planner.search(&SearchQuery::wildcard("report*.pdf")).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "report_a.pdf");
    }

    #[test]
    fn test_regex_search() {
        let (_, planner) = planner_with(vec![
            file("/t/test_12.rs", 10, NOW),
            file("/t/test_ab.rs", 10, NOW),
        ]);

        let outcome = planner
            .search(&SearchQuery::regex(r"test_\d+\.rs"))
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "test_12.rs");
    }

    #[test]
    fn test_invalid_regex_surfaces() {
        let (_, planner) = planner_with(vec![file("/t/a.txt", 10, NOW)]);
        let err = planner.search(&SearchQuery::regex("[oops")).unwrap_err();
        assert!(matches!(err, crate::error::LoupeError::InvalidPattern { .. }));
    }

    #[test]
    fn test_fuzzy_typo_falls_back_to_scan() {
        let (_, planner) = planner_with(vec![file("/t/report_final.pdf", 10, NOW)]);

        let outcome = planner.search(&SearchQuery::fuzzy("reprt", 0.6)).unwrap();
        assert_eq!(outcome.hits.len(), 1);

        let outcome = planner.search(&SearchQuery::fuzzy("reprt", 0.95)).unwrap();
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn test_fuzzy_token_candidates() {
        let (_, planner) = planner_with(vec![
            file("/t/report_final.pdf", 10, NOW),
            file("/t/unrelated.txt", 10, NOW),
        ]);

        // "report" is an exact token of the first record
        let outcome = planner.search(&SearchQuery::fuzzy("report", 0.3)).unwrap();
        assert!(!outcome.hits.is_empty());
        assert_eq!(outcome.hits[0].record.name, "report_final.pdf");
    }

    #[test]
    fn test_result_cache_round_trip() {
        let (_, planner) = planner_with(vec![
            file("/t/a.txt", 10, NOW),
            file("/t/b.txt", 10, NOW),
        ]);

        let query = SearchQuery::wildcard("*.txt");
        let first = planner.search(&query).unwrap();
        assert!(!first.from_cache);

        let second = planner.search(&query).unwrap();
        assert!(second.from_cache);

        let order_first: Vec<&str> = first.hits.iter().map(|h| h.record.name.as_str()).collect();
        let order_second: Vec<&str> =
            second.hits.iter().map(|h| h.record.name.as_str()).collect();
        assert_eq!(order_first, order_second);

        let stats = planner.stats();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[test]
    fn test_extension_and_size_filters() {
        let (_, planner) = planner_with(vec![
            file("/t/a.rs", 10, NOW),
            file("/t/b.rs", 50_000, NOW),
            file("/t/c.txt", 50_000, NOW),
        ]);

        let query = SearchQuery::wildcard("*")
            .with_extensions(vec!["rs".to_string()])
            .with_size_range(SizeRange::new(1000, 100_000));
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "b.rs");
    }

    #[test]
    fn test_date_filter() {
        let (_, planner) = planner_with(vec![
            file("/t/old.txt", 10, NOW - 10_000),
            file("/t/new.txt", 10, NOW),
        ]);

        let query =
            SearchQuery::wildcard("*.txt").with_date_range(DateRange::new(NOW - 100, NOW + 100));
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "new.txt");
    }

    #[test]
    fn test_path_exclusion_after_gathering() {
        let (_, planner) = planner_with(vec![
            file("/t/keep/a.txt", 10, NOW),
            file("/t/skip/b.txt", 10, NOW),
        ]);

        let query =
            SearchQuery::wildcard("*.txt").with_exclude_paths(vec!["/t/skip".to_string()]);
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "a.txt");
    }

    #[test]
    fn test_drive_filter() {
        let (index, planner) = planner_with(vec![]);
        let c = index.register_drive("c:/");
        let d = index.register_drive("d:/");
        index
            .add(file("c:/x.txt", 10, NOW).with_drive(c.id))
            .unwrap();
        index
            .add(file("d:/y.txt", 10, NOW).with_drive(d.id))
            .unwrap();

        let query = SearchQuery::wildcard("*.txt").with_drives(vec![d.id]);
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "y.txt");
    }

    #[test]
    fn test_empty_text_uses_size_index() {
        let (_, planner) = planner_with(vec![
            file("/t/small.bin", 10, NOW),
            file("/t/big.bin", 10_000, NOW),
        ]);

        let query = SearchQuery::exact("").with_size_range(SizeRange::new(1000, 1_000_000));
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].record.name, "big.bin");
    }

    #[test]
    fn test_max_results_cap() {
        let records: Vec<FileRecord> = (0..50)
            .map(|i| file(&format!("/t/file_{:02}.txt", i), 10, NOW))
            .collect();
        let (_, planner) = planner_with(records);

        let query = SearchQuery::wildcard("*.txt").with_max_results(5);
        let outcome = planner.search(&query).unwrap();
        assert_eq!(outcome.hits.len(), 5);
        assert_eq!(outcome.total_matches, 50);
    }

    #[test]
    fn test_sort_orders() {
        let (_, planner) = planner_with(vec![
            file("/t/bbb.txt", 300, NOW - 50),
            file("/t/aaa.txt", 100, NOW),
            file("/t/ccc.txt", 200, NOW - 100),
        ]);

        let by_name = planner
            .search(&SearchQuery::wildcard("*.txt").with_sort_order(SortOrder::Name))
            .unwrap();
        let names: Vec<&str> = by_name.hits.iter().map(|h| h.record.name.as_str()).collect();
        assert_eq!(names, vec!["aaa.txt", "bbb.txt", "ccc.txt"]);

        let by_size = planner
            .search(&SearchQuery::wildcard("*.txt").with_sort_order(SortOrder::Size))
            .unwrap();
        let sizes: Vec<u64> = by_size.hits.iter().map(|h| h.record.size).collect();
        assert_eq!(sizes, vec![300, 200, 100]);

        let by_modified = planner
            .search(&SearchQuery::wildcard("*.txt").with_sort_order(SortOrder::Modified))
            .unwrap();
        assert_eq!(by_modified.hits[0].record.name, "aaa.txt");
    }

    #[test]
    fn test_browse_orders_children_and_caches() {
        let (index, planner) = planner_with(vec![]);
        let d = index
            .add(FileRecord::new("/docs", FileKind::Directory).with_times(NOW, 0))
            .unwrap();
        index.add(file("/docs/zeta.txt", 1, NOW).with_parent(d)).unwrap();
        index.add(file("/docs/alpha.txt", 1, NOW).with_parent(d)).unwrap();

        let listing = planner.browse("/docs");
        let names: Vec<&str> = listing.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "zeta.txt"]);

        // Second call is served from the path cache
        let cached_before = planner.cache.stats().hits;
        planner.browse("/docs");
        assert!(planner.cache.stats().hits > cached_before);

        // Non-directories browse to nothing
        assert!(planner.browse("/docs/alpha.txt").is_empty());
    }

    #[test]
    fn test_access_count_bumped_on_hit() {
        let (index, planner) = planner_with(vec![file("/t/hot.txt", 10, NOW)]);

        planner.search(&SearchQuery::exact("hot.txt")).unwrap();
        let record = index.get_by_path("/t/hot.txt").unwrap();
        assert_eq!(record.access_count, 1);
    }
}
