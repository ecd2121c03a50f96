//! Search query model.
//!
//! A [`SearchQuery`] carries everything the planner needs: the text, the
//! matcher mode, filters, caps and ordering. Queries are plain data;
//! compilation of wildcard and regex patterns happens in the matcher layer
//! so the query itself stays hashable into a cache fingerprint.

use crate::types::{DateRange, SearchMode, SizeRange, SortOrder};

/// A fully specified search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The pattern or text to match against filenames
    pub text: String,

    /// Which matcher to use
    pub mode: SearchMode,

    /// Restrict results to these drive ids (empty = all drives)
    pub include_drives: Vec<u64>,

    /// Exclude results under these path prefixes
    pub exclude_paths: Vec<String>,

    /// Restrict results to these extensions (without the dot)
    pub extensions: Vec<String>,

    /// Inclusive size filter
    pub size_range: Option<SizeRange>,

    /// Inclusive modification-date filter
    pub date_range: Option<DateRange>,

    /// Result cap requested by the caller
    pub max_results: usize,

    /// Final ordering of the result list
    pub sort_order: SortOrder,

    /// Exact mode only: match case exactly (forces a full scan)
    pub case_sensitive: bool,

    /// Fuzzy mode only: minimum similarity in [0, 1]
    pub fuzzy_threshold: f64,
}

impl SearchQuery {
    /// Create a query with defaults for everything but text and mode.
    pub fn new(text: impl Into<String>, mode: SearchMode) -> Self {
        SearchQuery {
            text: text.into(),
            mode,
            include_drives: Vec::new(),
            exclude_paths: Vec::new(),
            extensions: Vec::new(),
            size_range: None,
            date_range: None,
            max_results: 1000,
            sort_order: SortOrder::Relevance,
            case_sensitive: false,
            fuzzy_threshold: 0.6,
        }
    }

    pub fn exact(text: impl Into<String>) -> Self {
        Self::new(text, SearchMode::Exact)
    }

    pub fn fuzzy(text: impl Into<String>, threshold: f64) -> Self {
        let mut q = Self::new(text, SearchMode::Fuzzy);
        q.fuzzy_threshold = threshold;
        q
    }

    pub fn wildcard(text: impl Into<String>) -> Self {
        Self::new(text, SearchMode::Wildcard)
    }

    pub fn regex(text: impl Into<String>) -> Self {
        Self::new(text, SearchMode::Regex)
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_drives(mut self, drives: Vec<u64>) -> Self {
        self.include_drives = drives;
        self
    }

    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }

    pub fn with_size_range(mut self, range: SizeRange) -> Self {
        self.size_range = Some(range);
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Normalized text used for matching: lower-cased unless the query is
    /// case-sensitive exact.
    pub fn normalized_text(&self) -> String {
        if self.mode == SearchMode::Exact && self.case_sensitive {
            self.text.clone()
        } else {
            self.text.to_lowercase()
        }
    }

    /// Deterministic digest of the fully normalized query, used as the
    /// result-cache key. Every field that can change the outcome is part
    /// of the fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut drives = self.include_drives.clone();
        drives.sort_unstable();
        let mut excludes: Vec<String> = self
            .exclude_paths
            .iter()
            .map(|p| crate::types::fold_path_key(p))
            .collect();
        excludes.sort();
        let mut extensions: Vec<String> =
            self.extensions.iter().map(|e| e.to_lowercase()).collect();
        extensions.sort();

        format!(
            "t={};m={:?};cs={};d={:?};x={:?};e={:?};s={:?};dt={:?};n={};o={:?};f={:.4}",
            self.normalized_text(),
            self.mode,
            self.case_sensitive,
            drives,
            excludes,
            extensions,
            self.size_range.map(|r| (r.min, r.max)),
            self.date_range.map(|r| (r.start, r.end)),
            self.max_results,
            self.sort_order,
            self.fuzzy_threshold,
        )
    }
}
