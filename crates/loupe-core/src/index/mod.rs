//! In-memory index for fast filename search.
//!
//! The `FileIndex` is the central data structure. It owns the authoritative
//! record store plus every secondary index, all guarded by a single
//! readers-writer lock so that any externally visible state satisfies the
//! store invariants:
//!
//! - every live id maps to exactly one record, and the path binding agrees
//! - a record appears in each secondary index it qualifies for, and no other
//! - hierarchy entries always point at a live directory record
//!
//! ## Architecture
//!
//! - `HashMap<u64, FileRecord>` is the record store; ids are assigned from
//!   an atomic counter and never reused
//! - the name trie answers exact and prefix lookups
//! - the inverted token index shrinks fuzzy candidate sets
//! - `BTreeMap`s over size and timestamps answer range queries in order
//! - the Bloom filter gives fast negative answers for exact name queries
//!
//! Searches vastly outnumber updates, so reads take the shared side of the
//! lock and large scans go parallel via Rayon.

mod bloom;
mod inverted;
mod trie;

pub use bloom::BloomFilter;
pub use inverted::InvertedIndex;
pub use trie::NameTrie;

use crate::error::{LoupeError, Result};
use crate::types::{fold_path_key, DriveInfo, FileRecord, IndexStatistics};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Longest allowed path component, matching common filesystem limits.
const MAX_COMPONENT_LEN: usize = 255;

/// Record count above which full scans switch to parallel iteration.
const PARALLEL_SCAN_THRESHOLD: usize = 10_000;

/// The main in-memory index containing all file records.
///
/// Designed for concurrent access: multiple readers search simultaneously
/// while writers (walker insertions, change events) serialize on the
/// exclusive side of the lock.
pub struct FileIndex {
    inner: RwLock<IndexInner>,
    next_id: AtomicU64,
    next_drive_id: AtomicU64,
    errors_encountered: AtomicU64,
}

struct IndexInner {
    records: HashMap<u64, FileRecord>,
    path_to_id: HashMap<String, u64>,

    trie: NameTrie,
    inverted: InvertedIndex,
    bloom: Option<BloomFilter>,

    extension_index: HashMap<String, HashSet<u64>>,
    size_index: BTreeMap<u64, HashSet<u64>>,
    mtime_index: BTreeMap<i64, HashSet<u64>>,
    atime_index: BTreeMap<i64, HashSet<u64>>,

    parent_to_children: HashMap<u64, HashSet<u64>>,
    child_to_parent: HashMap<u64, u64>,

    drive_to_files: HashMap<u64, HashSet<u64>>,
    drives: HashMap<u64, DriveInfo>,

    total_files: u64,
    total_directories: u64,
    total_size: u64,
    last_full_scan: Option<chrono::DateTime<chrono::Utc>>,
    last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl IndexInner {
    fn new(bloom: Option<BloomFilter>) -> Self {
        IndexInner {
            records: HashMap::new(),
            path_to_id: HashMap::new(),
            trie: NameTrie::new(),
            inverted: InvertedIndex::new(),
            bloom,
            extension_index: HashMap::new(),
            size_index: BTreeMap::new(),
            mtime_index: BTreeMap::new(),
            atime_index: BTreeMap::new(),
            parent_to_children: HashMap::new(),
            child_to_parent: HashMap::new(),
            drive_to_files: HashMap::new(),
            drives: HashMap::new(),
            total_files: 0,
            total_directories: 0,
            total_size: 0,
            last_full_scan: None,
            last_updated: None,
        }
    }

    /// Install every secondary entry for a record already in the store.
    fn install_secondary(&mut self, record: &FileRecord) {
        let id = record.id;

        self.trie.insert(&record.name_lower, id);
        if let Some(bloom) = self.bloom.as_mut() {
            bloom.insert(&record.name_lower);
        }
        self.inverted.add_document(id, &record.tokens());

        if !record.extension.is_empty() {
            self.extension_index
                .entry(record.extension.clone())
                .or_default()
                .insert(id);
        }

        self.size_index.entry(record.size).or_default().insert(id);
        self.mtime_index.entry(record.mtime).or_default().insert(id);
        self.atime_index.entry(record.atime).or_default().insert(id);

        if record.parent_id != 0 {
            self.parent_to_children
                .entry(record.parent_id)
                .or_default()
                .insert(id);
            self.child_to_parent.insert(id, record.parent_id);
        }

        if record.drive_id != 0 {
            self.drive_to_files
                .entry(record.drive_id)
                .or_default()
                .insert(id);
        }
    }

    /// Remove every secondary entry keyed by the record's current values.
    /// The Bloom filter has no removal; stale names are caught by the trie.
    fn remove_secondary(&mut self, record: &FileRecord) {
        let id = record.id;

        self.trie.remove(&record.name_lower, id);
        self.inverted.remove_document(id);

        if !record.extension.is_empty() {
            if let Some(ids) = self.extension_index.get_mut(&record.extension) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.extension_index.remove(&record.extension);
                }
            }
        }

        remove_from_ordered(&mut self.size_index, record.size, id);
        remove_from_ordered(&mut self.mtime_index, record.mtime, id);
        remove_from_ordered(&mut self.atime_index, record.atime, id);

        if record.parent_id != 0 {
            if let Some(children) = self.parent_to_children.get_mut(&record.parent_id) {
                children.remove(&id);
                if children.is_empty() {
                    self.parent_to_children.remove(&record.parent_id);
                }
            }
        }
        self.child_to_parent.remove(&id);

        if record.drive_id != 0 {
            if let Some(ids) = self.drive_to_files.get_mut(&record.drive_id) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.drive_to_files.remove(&record.drive_id);
                }
            }
        }
    }

    fn apply_counts(&mut self, record: &FileRecord, add: bool) {
        let delta = |v: &mut u64, n: u64| {
            if add {
                *v += n
            } else {
                *v = v.saturating_sub(n)
            }
        };
        if record.kind.is_directory() {
            delta(&mut self.total_directories, 1);
        } else {
            delta(&mut self.total_files, 1);
            delta(&mut self.total_size, record.size);
        }
    }

    fn touch(&mut self) {
        self.last_updated = Some(chrono::Utc::now());
    }

    /// Ids of a record and all transitive descendants, children first.
    fn subtree_ids(&self, id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(children) = self.parent_to_children.get(&current) {
                stack.extend(children.iter().copied());
            }
        }
        out
    }

    fn remove_single(&mut self, id: u64) -> Option<FileRecord> {
        let record = self.records.remove(&id)?;
        self.path_to_id.remove(&record.path_key());
        self.remove_secondary(&record);
        self.apply_counts(&record, false);
        Some(record)
    }
}

fn remove_from_ordered<K: Ord + Copy>(index: &mut BTreeMap<K, HashSet<u64>>, key: K, id: u64) {
    if let Some(ids) = index.get_mut(&key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(&key);
        }
    }
}

fn check_component_length(path: &str) -> Result<()> {
    for component in path.split('/') {
        if component.len() > MAX_COMPONENT_LEN {
            return Err(LoupeError::PathTooLong {
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIndex {
    /// Create an index with the default Bloom pre-filter.
    pub fn new() -> Self {
        Self::with_bloom(Some(BloomFilter::default()))
    }

    /// Create an index with a specific Bloom configuration (None disables
    /// the pre-filter entirely).
    pub fn with_bloom(bloom: Option<BloomFilter>) -> Self {
        FileIndex {
            inner: RwLock::new(IndexInner::new(bloom)),
            next_id: AtomicU64::new(1),
            next_drive_id: AtomicU64::new(1),
            errors_encountered: AtomicU64::new(0),
        }
    }

    /// Number of records in the index.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Insert a new record, assigning its id. Fails with `DuplicatePath`
    /// when the path is already bound; callers must `update` instead.
    pub fn add(&self, mut record: FileRecord) -> Result<u64> {
        check_component_length(&record.full_path)?;
        record.init_cache();
        let key = record.path_key();

        let mut inner = self.inner.write();
        if inner.path_to_id.contains_key(&key) {
            return Err(LoupeError::DuplicatePath {
                path: record.full_path,
            });
        }

        if record.id == 0 {
            record.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }
        let id = record.id;

        inner.path_to_id.insert(key, id);
        inner.install_secondary(&record);
        inner.apply_counts(&record, true);
        inner.records.insert(id, record);
        inner.touch();

        Ok(id)
    }

    /// Replace a record in place. The id must already be live; all
    /// secondary entries keyed by old values are swapped for the new ones
    /// in one logical step under the write guard. Path changes (renames)
    /// rebind the path lookup as well.
    pub fn update(&self, mut record: FileRecord) -> Result<()> {
        record.init_cache();
        check_component_length(&record.full_path)?;

        let mut inner = self.inner.write();
        let old = match inner.records.get(&record.id) {
            Some(r) => r.clone(),
            None => return Err(LoupeError::id_not_found(record.id)),
        };

        let new_key = record.path_key();
        let old_key = old.path_key();
        if new_key != old_key {
            if let Some(&bound) = inner.path_to_id.get(&new_key) {
                if bound != record.id {
                    return Err(LoupeError::DuplicatePath {
                        path: record.full_path,
                    });
                }
            }
            inner.path_to_id.remove(&old_key);
            inner.path_to_id.insert(new_key, record.id);
        }

        inner.remove_secondary(&old);
        inner.apply_counts(&old, false);
        inner.install_secondary(&record);
        inner.apply_counts(&record, true);
        inner.records.insert(record.id, record);
        inner.touch();

        Ok(())
    }

    /// Remove a record by id. Directories cascade: every transitive
    /// descendant is removed too. Returns false when the id is unknown.
    pub fn remove_by_id(&self, id: u64) -> bool {
        let mut inner = self.inner.write();
        if !inner.records.contains_key(&id) {
            return false;
        }

        let victims = inner.subtree_ids(id);
        debug!(id, count = victims.len(), "Removing record subtree");
        for victim in victims {
            inner.remove_single(victim);
        }
        inner.touch();
        true
    }

    /// Remove a record by path (case-insensitive lookup), with cascade.
    pub fn remove_by_path(&self, path: &str) -> bool {
        let id = {
            let inner = self.inner.read();
            match inner.path_to_id.get(&fold_path_key(path)) {
                Some(&id) => id,
                None => return false,
            }
        };
        self.remove_by_id(id)
    }

    /// Get a copy of a record by id.
    pub fn get_by_id(&self, id: u64) -> Option<FileRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Get a copy of a record by path (case-insensitive lookup).
    pub fn get_by_path(&self, path: &str) -> Option<FileRecord> {
        let inner = self.inner.read();
        let id = inner.path_to_id.get(&fold_path_key(path))?;
        inner.records.get(id).cloned()
    }

    /// All direct children of a directory, unordered.
    pub fn children_of(&self, id: u64) -> Vec<FileRecord> {
        let inner = self.inner.read();
        match inner.parent_to_children.get(&id) {
            Some(children) => children
                .iter()
                .filter_map(|c| inner.records.get(c).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// All records on a drive, unordered.
    pub fn files_on_drive(&self, drive_id: u64) -> Vec<FileRecord> {
        let inner = self.inner.read();
        match inner.drive_to_files.get(&drive_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|c| inner.records.get(c).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop every record and secondary entry. Ids are never reused, so the
    /// id counter keeps running.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let bloom = inner.bloom.as_ref().map(|b| {
            let mut fresh = b.clone();
            fresh.clear();
            fresh
        });
        *inner = IndexInner::new(bloom);
        info!("Index cleared");
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> IndexStatistics {
        let inner = self.inner.read();
        IndexStatistics {
            total_files: inner.total_files,
            total_directories: inner.total_directories,
            total_size: inner.total_size,
            indexed_drives: inner.drive_to_files.len() as u32,
            token_count: inner.inverted.token_count(),
            trie_node_count: inner.trie.node_count(),
            bloom_element_count: inner.bloom.as_ref().map_or(0, |b| b.element_count()),
            errors_encountered: self.errors_encountered.load(Ordering::Relaxed),
            last_full_scan: inner.last_full_scan,
            last_updated: inner.last_updated,
        }
    }

    /// Coarse estimate of the index's memory footprint in bytes, used to
    /// enforce the advisory soft cap. The primary structures are never
    /// shed; only the caches react to this number.
    pub fn estimated_memory_use(&self) -> usize {
        let inner = self.inner.read();
        let records = inner.records.len() * (std::mem::size_of::<FileRecord>() + 128);
        let trie = inner.trie.node_count() as usize * 64;
        let tokens = inner.inverted.token_count() as usize * 80;
        let bloom = inner.bloom.as_ref().map_or(0, |b| b.memory_usage());
        records + trie + tokens + bloom
    }

    /// Count a walker/watcher error that was absorbed.
    pub fn note_error(&self) {
        self.errors_encountered.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a completed full scan.
    pub fn note_full_scan(&self) {
        self.inner.write().last_full_scan = Some(chrono::Utc::now());
    }

    // === Drive table ===

    /// Register a drive by mount point, returning the existing entry when
    /// one is already present.
    pub fn register_drive(&self, mount_point: &str) -> DriveInfo {
        let folded = fold_path_key(mount_point);
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .drives
            .values()
            .find(|d| fold_path_key(&d.mount_point) == folded)
        {
            return existing.clone();
        }
        let id = self.next_drive_id.fetch_add(1, Ordering::Relaxed);
        let drive = DriveInfo::new(id, mount_point);
        inner.drives.insert(id, drive.clone());
        drive
    }

    /// Resolve the drive a path belongs to by longest mount-point prefix.
    pub fn resolve_drive(&self, path: &str) -> u64 {
        let folded = fold_path_key(path);
        let inner = self.inner.read();
        inner
            .drives
            .values()
            .filter(|d| folded.starts_with(&fold_path_key(&d.mount_point)))
            .max_by_key(|d| d.mount_point.len())
            .map_or(0, |d| d.id)
    }

    /// All registered drives.
    pub fn drives(&self) -> Vec<DriveInfo> {
        self.inner.read().drives.values().cloned().collect()
    }

    // === Candidate gathering for the query planner ===

    /// Records whose lower-cased name equals `name_lower`. The Bloom
    /// filter answers the negative case without touching the trie.
    pub fn exact_candidates(&self, name_lower: &str) -> Vec<FileRecord> {
        let inner = self.inner.read();
        if let Some(bloom) = inner.bloom.as_ref() {
            if !bloom.might_contain(name_lower) {
                return Vec::new();
            }
        }
        inner
            .trie
            .exact(name_lower)
            .into_iter()
            .filter_map(|id| inner.records.get(&id).cloned())
            .collect()
    }

    /// Records whose lower-cased name starts with `prefix_lower`.
    pub fn prefix_candidates(&self, prefix_lower: &str) -> Vec<FileRecord> {
        let inner = self.inner.read();
        inner
            .trie
            .prefix(prefix_lower)
            .into_iter()
            .filter_map(|id| inner.records.get(&id).cloned())
            .collect()
    }

    /// Records containing any of the given tokens.
    pub fn token_candidates(&self, tokens: &[String]) -> Vec<FileRecord> {
        let inner = self.inner.read();
        let mut ids: Vec<u64> = inner.inverted.lookup_any(tokens).into_iter().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| inner.records.get(&id).cloned())
            .collect()
    }

    /// Records whose size falls inside the inclusive range, via the
    /// ordered size map.
    pub fn files_in_size_range(&self, min: u64, max: u64) -> Vec<FileRecord> {
        let inner = self.inner.read();
        inner
            .size_index
            .range(min..=max)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Records modified inside the inclusive timestamp range.
    pub fn files_modified_between(&self, start: i64, end: i64) -> Vec<FileRecord> {
        let inner = self.inner.read();
        inner
            .mtime_index
            .range(start..=end)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Full scan with a predicate, parallelized above a size threshold.
    pub fn scan<F>(&self, predicate: F) -> Vec<FileRecord>
    where
        F: Fn(&FileRecord) -> bool + Sync,
    {
        let inner = self.inner.read();
        if inner.records.len() > PARALLEL_SCAN_THRESHOLD {
            inner
                .records
                .par_iter()
                .filter(|(_, r)| predicate(r))
                .map(|(_, r)| r.clone())
                .collect()
        } else {
            inner
                .records
                .values()
                .filter(|r| predicate(r))
                .cloned()
                .collect()
        }
    }

    /// Bump access counters for records returned by a query.
    pub fn record_access(&self, ids: &[u64]) {
        let mut inner = self.inner.write();
        for id in ids {
            if let Some(record) = inner.records.get_mut(id) {
                record.access_count = record.access_count.saturating_add(1);
            }
        }
    }

    // === Warm start and rescans ===

    /// Re-insert records restored from the warm store, preserving their
    /// ids. Records whose path is already bound are skipped.
    pub fn restore(&self, records: Vec<FileRecord>, drives: Vec<DriveInfo>) -> usize {
        let mut inner = self.inner.write();
        let mut max_id = 0u64;
        let mut max_drive = 0u64;
        let mut restored = 0;

        for drive in drives {
            max_drive = max_drive.max(drive.id);
            inner.drives.insert(drive.id, drive);
        }

        for mut record in records {
            record.init_cache();
            let key = record.path_key();
            if record.id == 0 || inner.path_to_id.contains_key(&key) {
                continue;
            }
            max_id = max_id.max(record.id);
            inner.path_to_id.insert(key, record.id);
            inner.install_secondary(&record);
            inner.apply_counts(&record, true);
            inner.records.insert(record.id, record);
            restored += 1;
        }

        let floor = max_id + 1;
        self.next_id.fetch_max(floor, Ordering::Relaxed);
        self.next_drive_id.fetch_max(max_drive + 1, Ordering::Relaxed);
        inner.touch();
        info!(restored, "Warm start restored records");
        restored
    }

    /// Copies of all records (for persistence).
    pub fn all_records(&self) -> Vec<FileRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    /// Remove records under `root` whose folded path is not in `live`.
    /// Used after a rescan to drop entries whose files disappeared while
    /// the watcher was overflowed. Returns the number of removed subtrees.
    pub fn prune_missing(&self, root: &str, live: &HashSet<String>) -> usize {
        let root_key = fold_path_key(root);
        let stale: Vec<u64> = {
            let inner = self.inner.read();
            inner
                .records
                .values()
                .filter(|r| {
                    let key = r.path_key();
                    key.starts_with(&root_key) && !live.contains(&key)
                })
                .map(|r| r.id)
                .collect()
        };

        let mut removed = 0;
        for id in stale {
            // Earlier cascades may have removed this id already
            if self.remove_by_id(id) {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(root, removed, "Pruned records missing after rescan");
        }
        removed
    }

    // === Validation ===

    /// Cross-check every structure against the record store. Returns
    /// human-readable drift descriptions; an empty vector means the index
    /// is internally consistent.
    pub fn validate(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut errors = Vec::new();

        // Path bijection
        for (id, record) in &inner.records {
            match inner.path_to_id.get(&record.path_key()) {
                Some(bound) if bound == id => {}
                Some(bound) => errors.push(format!(
                    "path {} bound to id {} but record has id {}",
                    record.full_path, bound, id
                )),
                None => errors.push(format!("record {} has no path binding", id)),
            }
        }
        for (path, id) in &inner.path_to_id {
            if !inner.records.contains_key(id) {
                errors.push(format!("path {} bound to dead id {}", path, id));
            }
        }

        // Trie and inverted index agreement
        for (id, record) in &inner.records {
            if !inner.trie.exact(&record.name_lower).contains(id) {
                errors.push(format!("record {} missing from name trie", id));
            }
            let expected: HashSet<String> = record.tokens().into_iter().collect();
            match inner.inverted.tokens_of(*id) {
                Some(tokens) if *tokens == expected => {}
                _ => errors.push(format!("record {} has inconsistent tokens", id)),
            }
        }

        // Extension index
        for (ext, ids) in &inner.extension_index {
            for id in ids {
                match inner.records.get(id) {
                    Some(r) if r.extension == *ext => {}
                    Some(r) => errors.push(format!(
                        "id {} in extension bucket {} but record has {}",
                        id, ext, r.extension
                    )),
                    None => errors.push(format!("dangling id {} in extension bucket {}", id, ext)),
                }
            }
        }

        // Hierarchy closure
        for (parent, children) in &inner.parent_to_children {
            match inner.records.get(parent) {
                Some(p) if p.kind.is_directory() => {}
                Some(_) => errors.push(format!("parent {} is not a directory", parent)),
                None => errors.push(format!("dangling parent {}", parent)),
            }
            for child in children {
                match inner.records.get(child) {
                    Some(c) if c.parent_id == *parent => {}
                    Some(c) => errors.push(format!(
                        "child {} lists parent {} but hierarchy says {}",
                        child, c.parent_id, parent
                    )),
                    None => errors.push(format!("dangling child {} under {}", child, parent)),
                }
            }
        }

        // Ordered maps
        for (size, ids) in &inner.size_index {
            for id in ids {
                match inner.records.get(id) {
                    Some(r) if r.size == *size => {}
                    _ => errors.push(format!("id {} misplaced in size bucket {}", id, size)),
                }
            }
        }

        // Counts
        let (mut files, mut dirs, mut bytes) = (0u64, 0u64, 0u64);
        for record in inner.records.values() {
            if record.kind.is_directory() {
                dirs += 1;
            } else {
                files += 1;
                bytes += record.size;
            }
        }
        if files != inner.total_files {
            errors.push(format!(
                "total_files {} but store has {}",
                inner.total_files, files
            ));
        }
        if dirs != inner.total_directories {
            errors.push(format!(
                "total_directories {} but store has {}",
                inner.total_directories, dirs
            ));
        }
        if bytes != inner.total_size {
            errors.push(format!(
                "total_size {} but store has {}",
                inner.total_size, bytes
            ));
        }

        errors
    }

    /// Validate and escalate drift to a fatal error.
    pub fn check_integrity(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LoupeError::InvariantViolation {
                reason: errors.join("; "),
            })
        }
    }
}

impl std::fmt::Debug for FileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndex")
            .field("record_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    fn file(path: &str, size: u64) -> FileRecord {
        FileRecord::new(path, FileKind::File)
            .with_size(size)
            .with_times(1_700_000_000, 0)
    }

    fn dir(path: &str) -> FileRecord {
        FileRecord::new(path, FileKind::Directory).with_times(1_700_000_000, 0)
    }

    #[test]
    fn test_add_assigns_monotonic_ids() {
        let index = FileIndex::new();
        let a = index.add(file("/t/a.txt", 10)).unwrap();
        let b = index.add(file("/t/b.txt", 20)).unwrap();
        assert!(b > a);
        assert_eq!(index.len(), 2);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let index = FileIndex::new();
        index.add(file("/t/a.txt", 10)).unwrap();
        let err = index.add(file("/t/a.txt", 20)).unwrap_err();
        assert!(matches!(err, LoupeError::DuplicatePath { .. }));

        // Lookup is case-insensitive, so differing case is still a duplicate
        let err = index.add(file("/t/A.TXT", 20)).unwrap_err();
        assert!(matches!(err, LoupeError::DuplicatePath { .. }));
    }

    #[test]
    fn test_path_too_long() {
        let index = FileIndex::new();
        let long = format!("/t/{}", "x".repeat(300));
        let err = index.add(file(&long, 1)).unwrap_err();
        assert!(matches!(err, LoupeError::PathTooLong { .. }));
    }

    #[test]
    fn test_get_by_path_preserves_display_case() {
        let index = FileIndex::new();
        index.add(file("/t/Report.PDF", 10)).unwrap();
        let found = index.get_by_path("/t/report.pdf").unwrap();
        assert_eq!(found.name, "Report.PDF");
    }

    #[test]
    fn test_update_swaps_secondary_entries() {
        let index = FileIndex::new();
        let id = index.add(file("/t/old_name.log", 10)).unwrap();

        let mut updated = index.get_by_id(id).unwrap();
        updated.set_path("/t/new_name.txt");
        updated.size = 99;
        index.update(updated).unwrap();

        assert!(index.get_by_path("/t/old_name.log").is_none());
        let found = index.get_by_path("/t/new_name.txt").unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.extension, "txt");

        assert!(index.exact_candidates("old_name.log").is_empty());
        assert_eq!(index.exact_candidates("new_name.txt").len(), 1);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_update_unknown_id() {
        let index = FileIndex::new();
        let mut r = file("/t/a.txt", 1);
        r.id = 999;
        assert!(matches!(
            index.update(r),
            Err(LoupeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_is_idempotent() {
        let index = FileIndex::new();
        let id = index.add(file("/t/a.txt", 10)).unwrap();
        let record = index.get_by_id(id).unwrap();

        index.update(record.clone()).unwrap();
        index.update(record).unwrap();

        assert_eq!(index.len(), 1);
        let stats = index.stats();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size, 10);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_add_then_remove_restores_baseline() {
        let index = FileIndex::new();
        index.add(file("/t/keep.txt", 5)).unwrap();
        let baseline = index.stats();

        let id = index.add(file("/t/transient.bin", 123)).unwrap();
        assert!(index.remove_by_id(id));

        let after = index.stats();
        assert_eq!(after.total_files, baseline.total_files);
        assert_eq!(after.total_size, baseline.total_size);
        assert!(index.get_by_path("/t/transient.bin").is_none());
        assert!(index.exact_candidates("transient.bin").is_empty());
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_directory_cascade() {
        let index = FileIndex::new();
        let d = index.add(dir("/d")).unwrap();
        let e = index.add(dir("/d/e").with_parent(d)).unwrap();
        let f = index.add(file("/d/e/f.bin", 64).with_parent(e)).unwrap();

        assert!(index.remove_by_path("/d"));
        assert!(index.get_by_id(d).is_none());
        assert!(index.get_by_id(e).is_none());
        assert!(index.get_by_id(f).is_none());
        assert!(index.children_of(d).is_empty());
        assert!(index.children_of(e).is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_children_of() {
        let index = FileIndex::new();
        let d = index.add(dir("/docs")).unwrap();
        index.add(file("/docs/a.txt", 1).with_parent(d)).unwrap();
        index.add(file("/docs/b.txt", 2).with_parent(d)).unwrap();

        let children = index.children_of(d);
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_drive_registration_and_membership() {
        let index = FileIndex::new();
        let drive = index.register_drive("/");
        let again = index.register_drive("/");
        assert_eq!(drive.id, again.id);

        index
            .add(file("/data/x.iso", 100).with_drive(drive.id))
            .unwrap();
        let on_drive = index.files_on_drive(drive.id);
        assert_eq!(on_drive.len(), 1);
        assert_eq!(index.resolve_drive("/data/x.iso"), drive.id);
    }

    #[test]
    fn test_bloom_negative_is_authoritative() {
        let index = FileIndex::new();
        index.add(file("/t/present.txt", 1)).unwrap();

        // A missing name that the bloom rejects must also miss the trie
        let candidates = index.exact_candidates("never_indexed_name.xyz");
        assert!(candidates.is_empty());
        assert_eq!(index.exact_candidates("present.txt").len(), 1);
    }

    #[test]
    fn test_prefix_and_token_candidates() {
        let index = FileIndex::new();
        index.add(file("/t/report_final.pdf", 1)).unwrap();
        index.add(file("/t/report_draft.pdf", 1)).unwrap();
        index.add(file("/t/other.txt", 1)).unwrap();

        assert_eq!(index.prefix_candidates("report").len(), 2);
        assert_eq!(
            index.token_candidates(&["final".to_string()]).len(),
            1
        );
        assert_eq!(index.token_candidates(&["pdf".to_string()]).len(), 2);
    }

    #[test]
    fn test_range_queries() {
        let index = FileIndex::new();
        index.add(file("/t/small", 10)).unwrap();
        index.add(file("/t/medium", 1000)).unwrap();
        index.add(file("/t/large", 100_000)).unwrap();

        let mid = index.files_in_size_range(100, 10_000);
        assert_eq!(mid.len(), 1);
        assert_eq!(mid[0].name, "medium");

        let all = index.files_modified_between(0, i64::MAX);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_scan() {
        let index = FileIndex::new();
        index.add(file("/t/a.rs", 1)).unwrap();
        index.add(file("/t/b.rs", 1)).unwrap();
        index.add(file("/t/c.txt", 1)).unwrap();

        let rs = index.scan(|r| r.extension == "rs");
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_record_access() {
        let index = FileIndex::new();
        let id = index.add(file("/t/hot.txt", 1)).unwrap();
        index.record_access(&[id]);
        index.record_access(&[id]);
        assert_eq!(index.get_by_id(id).unwrap().access_count, 2);
    }

    #[test]
    fn test_clear_keeps_ids_monotonic() {
        let index = FileIndex::new();
        let first = index.add(file("/t/a.txt", 1)).unwrap();
        index.clear();
        assert!(index.is_empty());
        let second = index.add(file("/t/a.txt", 1)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_restore_preserves_ids() {
        let index = FileIndex::new();
        let mut r1 = file("/t/a.txt", 10);
        r1.id = 7;
        let mut r2 = file("/t/b.txt", 20);
        r2.id = 12;

        let restored = index.restore(vec![r1, r2], Vec::new());
        assert_eq!(restored, 2);
        assert_eq!(index.get_by_path("/t/a.txt").unwrap().id, 7);

        // New ids continue above the restored maximum
        let next = index.add(file("/t/c.txt", 1)).unwrap();
        assert!(next > 12);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_prune_missing() {
        let index = FileIndex::new();
        index.add(file("/r/keep.txt", 1)).unwrap();
        index.add(file("/r/stale.txt", 1)).unwrap();
        index.add(file("/elsewhere/out.txt", 1)).unwrap();

        let mut live = HashSet::new();
        live.insert(fold_path_key("/r/keep.txt"));

        let removed = index.prune_missing("/r", &live);
        assert_eq!(removed, 1);
        assert!(index.get_by_path("/r/keep.txt").is_some());
        assert!(index.get_by_path("/r/stale.txt").is_none());
        assert!(index.get_by_path("/elsewhere/out.txt").is_some());
    }

    #[test]
    fn test_stats_track_totals() {
        let index = FileIndex::new();
        index.add(dir("/t")).unwrap();
        index.add(file("/t/a.txt", 100)).unwrap();
        index.add(file("/t/b.txt", 200)).unwrap();

        let stats = index.stats();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_directories, 1);
        assert_eq!(stats.total_size, 300);
        assert_eq!(stats.total_entries(), 3);
        assert!(stats.token_count > 0);
        assert!(stats.trie_node_count > 0);
        assert!(index.check_integrity().is_ok());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        use std::sync::Arc;

        let index = Arc::new(FileIndex::new());
        let writer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..500 {
                    index
                        .add(file(&format!("/t/file_{}.txt", i), i as u64))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        // Every observed record must satisfy the path bijection
                        for record in index.scan(|_| true) {
                            let found = index.get_by_path(&record.full_path).unwrap();
                            assert_eq!(found.id, record.id);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(index.len(), 500);
        assert!(index.validate().is_empty());
    }
}
