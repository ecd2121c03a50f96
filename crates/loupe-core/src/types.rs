//! Core data types for loupe.
//!
//! This module defines the fundamental data structures used throughout the
//! indexing and search system. These types are designed to be:
//!
//! - **Serializable**: For the optional warm-start store
//! - **Platform-agnostic**: No OS-specific details leak into these types
//! - **Efficient**: Optimized for both memory usage and search performance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// What kind of filesystem entry a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Hardlink,
    Unknown,
}

impl FileKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::File => write!(f, "file"),
            FileKind::Directory => write!(f, "directory"),
            FileKind::Symlink => write!(f, "symlink"),
            FileKind::Hardlink => write!(f, "hardlink"),
            FileKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A record representing a single file or directory in the index.
///
/// This is the core data structure stored in the index. It contains all
/// information needed for searching and displaying results.
///
/// ## Design Notes
///
/// - `name` is stored separately from `full_path` for efficient
///   filename-only searches
/// - `name_lower` is pre-computed for fast case-insensitive matching
/// - `full_path` keeps the original casing for display; lookups go through
///   the folded key (see [`fold_path_key`])
/// - Parent-child relationships are tracked via `parent_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Surrogate id, assigned once on first insertion and never reused.
    /// Zero means "not yet assigned".
    pub id: u64,

    /// Absolute path with normalized separators, original case preserved
    pub full_path: String,

    /// Filename without path (e.g., "document.txt")
    pub name: String,

    /// Pre-computed lowercase filename for fast case-insensitive search
    #[serde(skip)]
    pub name_lower: String,

    /// Extension after the last `.`, lower-cased; empty if none
    pub extension: String,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time, seconds since epoch
    pub mtime: i64,

    /// Last access time, seconds since epoch. Falls back to `mtime` on
    /// platforms where atime is unavailable.
    pub atime: i64,

    /// Entry kind
    pub kind: FileKind,

    /// Parent directory record id (0 for roots)
    pub parent_id: u64,

    /// Drive record id (0 when unresolved)
    pub drive_id: u64,

    /// Opaque platform attribute flags
    pub attributes: u32,

    /// Incremented each time a query returns this record; feeds ranking
    pub access_count: u32,
}

impl FileRecord {
    /// Create a new record from a path, deriving name and extension.
    ///
    /// The id is left at zero; the index assigns it on insertion.
    pub fn new(full_path: impl Into<String>, kind: FileKind) -> Self {
        let full_path = normalize_path(full_path.into());
        let name = path_file_name(&full_path);
        let name_lower = name.to_lowercase();
        let extension = extension_of(&name);
        FileRecord {
            id: 0,
            full_path,
            name,
            name_lower,
            extension,
            size: 0,
            mtime: 0,
            atime: 0,
            kind,
            parent_id: 0,
            drive_id: 0,
            attributes: 0,
            access_count: 0,
        }
    }

    /// Set the file size
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set modification and access times. A zero atime falls back to mtime.
    pub fn with_times(mut self, mtime: i64, atime: i64) -> Self {
        self.mtime = mtime;
        self.atime = if atime == 0 { mtime } else { atime };
        self
    }

    /// Set the parent record id
    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Set the drive record id
    pub fn with_drive(mut self, drive_id: u64) -> Self {
        self.drive_id = drive_id;
        self
    }

    /// Set the platform attribute flags
    pub fn with_attributes(mut self, attributes: u32) -> Self {
        self.attributes = attributes;
        self
    }

    /// Reassign the path, re-deriving name, lowercase name and extension.
    /// Used when applying rename/move events; the id is untouched.
    pub fn set_path(&mut self, full_path: impl Into<String>) {
        self.full_path = normalize_path(full_path.into());
        self.name = path_file_name(&self.full_path);
        self.name_lower = self.name.to_lowercase();
        self.extension = extension_of(&self.name);
    }

    /// Folded key used for path→id lookups
    pub fn path_key(&self) -> String {
        fold_path_key(&self.full_path)
    }

    /// Lower-cased alphanumeric runs of the name, plus the extension.
    /// Empty fragments are dropped.
    pub fn tokens(&self) -> Vec<String> {
        tokenize(&self.name_lower, &self.extension)
    }

    /// Initialize the lowercase name cache after deserialization
    pub fn init_cache(&mut self) {
        if self.name_lower.is_empty() {
            self.name_lower = self.name.to_lowercase();
        }
    }
}

/// Split a lower-cased name into alphanumeric runs and append the extension.
pub fn tokenize(name_lower: &str, extension: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in name_lower.chars() {
        if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if !extension.is_empty() && !tokens.iter().any(|t| t == extension) {
        tokens.push(extension.to_string());
    }
    tokens
}

/// Normalize path separators to `/` without touching case.
pub fn normalize_path(path: String) -> String {
    if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path
    }
}

/// Case-folded lookup key for a path. Filesystems we index names from are
/// treated as case-insensitive for lookup; the record keeps original case.
pub fn fold_path_key(path: &str) -> String {
    normalize_path(path.to_string()).to_lowercase()
}

fn path_file_name(full_path: &str) -> String {
    Path::new(full_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| full_path.to_string())
}

fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => name[pos + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Information about a drive or mount point that files belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveInfo {
    /// Surrogate drive id
    pub id: u64,

    /// Mount point or drive root (e.g., "C:/" on Windows, "/" on Linux)
    pub mount_point: String,

    /// Human-readable label, if known
    pub label: Option<String>,

    /// Filesystem type (e.g., "NTFS", "ext4", "APFS")
    pub filesystem: Option<String>,

    /// Total capacity in bytes
    pub total_bytes: Option<u64>,

    /// Free space in bytes
    pub free_bytes: Option<u64>,

    /// Whether the drive was reachable at the last scan
    pub available: bool,
}

impl DriveInfo {
    pub fn new(id: u64, mount_point: impl Into<String>) -> Self {
        DriveInfo {
            id,
            mount_point: normalize_path(mount_point.into()),
            label: None,
            filesystem: None,
            total_bytes: None,
            free_bytes: None,
            available: true,
        }
    }
}

/// Search mode selecting the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    #[default]
    Fuzzy,
    Wildcard,
    Regex,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Exact => write!(f, "exact"),
            SearchMode::Fuzzy => write!(f, "fuzzy"),
            SearchMode::Wildcard => write!(f, "wildcard"),
            SearchMode::Regex => write!(f, "regex"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(SearchMode::Exact),
            "fuzzy" => Ok(SearchMode::Fuzzy),
            "wildcard" => Ok(SearchMode::Wildcard),
            "regex" => Ok(SearchMode::Regex),
            _ => Err(format!("unknown search mode: {}", s)),
        }
    }
}

/// Final ordering of a result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    Name,
    Size,
    Modified,
    Accessed,
}

/// Inclusive size filter in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: u64,
    pub max: u64,
}

impl SizeRange {
    pub fn new(min: u64, max: u64) -> Self {
        SizeRange { min, max }
    }

    pub fn contains(&self, size: u64) -> bool {
        size >= self.min && size <= self.max
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        SizeRange {
            min: 0,
            max: u64::MAX,
        }
    }
}

/// Inclusive date filter, seconds since epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

impl DateRange {
    pub fn new(start: i64, end: i64) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange {
            start: 0,
            end: i64::MAX,
        }
    }
}

/// Weights for the five ranking features. They are normalized to sum to 1
/// before use; a degenerate sum falls back to the defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingConfig {
    pub name_weight: f64,
    pub path_weight: f64,
    pub access_count_weight: f64,
    pub recentness_weight: f64,
    pub size_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            name_weight: 0.4,
            path_weight: 0.2,
            access_count_weight: 0.2,
            recentness_weight: 0.1,
            size_weight: 0.1,
        }
    }
}

impl RankingConfig {
    /// Normalize weights so they sum to 1. Non-positive sums reset to the
    /// default configuration.
    pub fn normalized(self) -> Self {
        let sum = self.name_weight
            + self.path_weight
            + self.access_count_weight
            + self.recentness_weight
            + self.size_weight;
        if sum <= f64::EPSILON {
            return RankingConfig::default();
        }
        RankingConfig {
            name_weight: self.name_weight / sum,
            path_weight: self.path_weight / sum,
            access_count_weight: self.access_count_weight / sum,
            recentness_weight: self.recentness_weight / sum,
            size_weight: self.size_weight / sum,
        }
    }
}

/// A search result with its relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matching file record
    pub record: FileRecord,

    /// Final ranked score in [0, 1]; higher is more relevant
    pub score: f64,
}

impl SearchHit {
    pub fn new(record: FileRecord, score: f64) -> Self {
        SearchHit { record, score }
    }
}

/// Statistics about the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Total number of files in the index
    pub total_files: u64,

    /// Total number of directories in the index
    pub total_directories: u64,

    /// Total size of all indexed files in bytes
    pub total_size: u64,

    /// Number of drives with at least one indexed record
    pub indexed_drives: u32,

    /// Distinct tokens in the inverted index
    pub token_count: u64,

    /// Nodes currently allocated in the name trie
    pub trie_node_count: u64,

    /// Elements inserted into the Bloom pre-filter
    pub bloom_element_count: u64,

    /// Errors absorbed by the walker and watcher
    pub errors_encountered: u64,

    /// When the last full scan completed
    pub last_full_scan: Option<DateTime<Utc>>,

    /// When the index was last mutated
    pub last_updated: Option<DateTime<Utc>>,
}

impl IndexStatistics {
    /// Total number of entries (files + directories)
    pub fn total_entries(&self) -> u64 {
        self.total_files + self.total_directories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_derivations() {
        let r = FileRecord::new("/home/user/Report.PDF", FileKind::File);
        assert_eq!(r.name, "Report.PDF");
        assert_eq!(r.name_lower, "report.pdf");
        assert_eq!(r.extension, "pdf");
        assert_eq!(r.path_key(), "/home/user/report.pdf");
    }

    #[test]
    fn test_extension_edge_cases() {
        assert_eq!(
            FileRecord::new("/a/noextension", FileKind::File).extension,
            ""
        );
        // A leading dot is a hidden file, not an extension boundary
        assert_eq!(FileRecord::new("/a/.bashrc", FileKind::File).extension, "");
        assert_eq!(
            FileRecord::new("/a/archive.tar.gz", FileKind::File).extension,
            "gz"
        );
        assert_eq!(FileRecord::new("/a/trailing.", FileKind::File).extension, "");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("report_final.pdf", "pdf"),
            vec!["report", "final", "pdf"]
        );
        assert_eq!(tokenize("a--b", ""), vec!["a", "b"]);
        assert!(tokenize("", "").is_empty());
        // Extension is not duplicated when it already appears as a token
        assert_eq!(tokenize("readme.md", "md"), vec!["readme", "md"]);
    }

    #[test]
    fn test_separator_normalization() {
        let r = FileRecord::new("C:\\Users\\doc\\file.txt", FileKind::File);
        assert_eq!(r.full_path, "C:/Users/doc/file.txt");
        assert_eq!(r.name, "file.txt");
    }

    #[test]
    fn test_set_path_keeps_id() {
        let mut r = FileRecord::new("/tmp/x.tmp", FileKind::File);
        r.id = 42;
        r.set_path("/tmp/x.txt");
        assert_eq!(r.id, 42);
        assert_eq!(r.name, "x.txt");
        assert_eq!(r.extension, "txt");
    }

    #[test]
    fn test_atime_falls_back_to_mtime() {
        let r = FileRecord::new("/tmp/a", FileKind::File).with_times(1000, 0);
        assert_eq!(r.atime, 1000);
    }

    #[test]
    fn test_ranking_config_normalization() {
        let cfg = RankingConfig {
            name_weight: 2.0,
            path_weight: 1.0,
            access_count_weight: 1.0,
            recentness_weight: 0.5,
            size_weight: 0.5,
        }
        .normalized();
        let sum = cfg.name_weight
            + cfg.path_weight
            + cfg.access_count_weight
            + cfg.recentness_weight
            + cfg.size_weight;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((cfg.name_weight - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weights_fall_back_to_defaults() {
        let cfg = RankingConfig {
            name_weight: 0.0,
            path_weight: 0.0,
            access_count_weight: 0.0,
            recentness_weight: 0.0,
            size_weight: 0.0,
        }
        .normalized();
        assert!((cfg.name_weight - 0.4).abs() < 1e-9);
        assert!((cfg.size_weight - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_ranges() {
        let sr = SizeRange::new(10, 100);
        assert!(sr.contains(10));
        assert!(sr.contains(100));
        assert!(!sr.contains(101));

        let dr = DateRange::new(1000, 2000);
        assert!(dr.contains(1500));
        assert!(!dr.contains(999));
    }
}
