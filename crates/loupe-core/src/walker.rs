//! Parallel directory walker.
//!
//! Indexing runs in two phases. The priority phase walks the user-visible
//! directories (documents, desktop, downloads, pictures, videos, music)
//! so the index answers queries within seconds of startup; the bulk phase
//! then dispatches one worker per drive root and recurses with the scan
//! pool. Directories are inserted before their children, so parent ids
//! are always live when a child record lands.
//!
//! Cancellation is cooperative: every worker polls the shared stop flag
//! between directory entries, and a cancelled walk leaves the index
//! consistent (every inserted record passed the normal write path).

use crate::config::Config;
use crate::error::Result;
use crate::fsutil::{is_hidden, is_system, record_from_metadata};
use crate::index::FileIndex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress callback: `(percentage, current_path)`.
pub type ProgressFn = dyn Fn(f64, &str) + Send + Sync;

/// Status reports are throttled to once per this many insertions.
const PROGRESS_EVERY: u64 = 2_000;

pub struct Walker {
    config: Config,
    index: Arc<FileIndex>,
    stop: Arc<AtomicBool>,
    pool: rayon::ThreadPool,
    progress: Option<Arc<ProgressFn>>,
    inserted: AtomicU64,
    drives_total: AtomicUsize,
    drives_completed: AtomicUsize,
}

impl Walker {
    pub fn new(config: Config, index: Arc<FileIndex>, stop: Arc<AtomicBool>) -> Result<Self> {
        let threads = config.indexing.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("loupe-walk-{}", i))
            .build()
            .map_err(|e| crate::error::LoupeError::ConfigError {
                reason: format!("failed to build scan pool: {}", e),
            })?;
        Ok(Walker {
            config,
            index,
            stop,
            pool,
            progress: None,
            inserted: AtomicU64::new(0),
            drives_total: AtomicUsize::new(0),
            drives_completed: AtomicUsize::new(0),
        })
    }

    /// Register a progress callback.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the full two-phase scan. An empty root list scans every
    /// available drive permitted by the configuration.
    pub fn run(&self, roots: &[PathBuf]) -> Result<()> {
        let roots = if roots.is_empty() {
            available_drive_roots(&self.config)
        } else {
            roots
                .iter()
                .filter(|r| self.config.should_index_drive(&r.to_string_lossy()))
                .cloned()
                .collect()
        };

        self.drives_total.store(roots.len().max(1), Ordering::Relaxed);
        self.drives_completed.store(0, Ordering::Relaxed);

        for root in &roots {
            self.index.register_drive(&root.to_string_lossy());
        }

        self.priority_phase(&roots);
        self.bulk_phase(&roots);

        if !self.stop.load(Ordering::Relaxed) {
            self.index.note_full_scan();
            self.report_progress(100.0, "");
        }
        info!(
            inserted = self.inserted.load(Ordering::Relaxed),
            "Walk finished"
        );
        Ok(())
    }

    /// Phase 1: user directories, one after another, each scanned with
    /// the pool's parallelism. The index is queryable for everything
    /// found here before the bulk phase begins.
    fn priority_phase(&self, roots: &[PathBuf]) {
        for dir in priority_directories() {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            if !roots.iter().any(|root| dir.starts_with(root)) {
                continue;
            }
            debug!(dir = %dir.display(), "Priority scan");
            let drive_id = self.index.resolve_drive(&dir.to_string_lossy());
            let dir_id = match self.ensure_directory(&dir, drive_id) {
                Some(id) => id,
                None => continue,
            };
            self.pool.scope(|scope| {
                self.scan_dir(scope, dir.clone(), dir_id, drive_id);
            });
        }
    }

    /// Phase 2: every drive root gets its own worker.
    fn bulk_phase(&self, roots: &[PathBuf]) {
        self.pool.scope(|scope| {
            for root in roots {
                let root = root.clone();
                scope.spawn(move |scope| {
                    if self.stop.load(Ordering::Relaxed) {
                        return;
                    }
                    let drive_id = self.index.resolve_drive(&root.to_string_lossy());
                    debug!(root = %root.display(), "Bulk scan");
                    self.scan_dir(scope, root.clone(), 0, drive_id);
                    self.drives_completed.fetch_add(1, Ordering::Relaxed);
                    self.report_progress(self.estimate_progress(), &root.to_string_lossy());
                });
            }
        });
    }

    /// Recursively scan one directory, spawning subdirectory scans onto
    /// the pool. `dir_id` is 0 for drive roots, which are not themselves
    /// records.
    fn scan_dir<'s>(
        &'s self,
        scope: &rayon::Scope<'s>,
        dir: PathBuf,
        dir_id: u64,
        drive_id: u64,
    ) {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.note_fs_error(&dir, &e);
                return;
            }
        };

        for entry in entries {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.note_fs_error(&dir, &e);
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.note_fs_error(&entry.path(), &e);
                    continue;
                }
            };

            let path = entry.path();
            let record = record_from_metadata(&path, &metadata)
                .with_parent(dir_id)
                .with_drive(drive_id);

            let hidden = is_hidden(&record.name, record.attributes);
            let system = is_system(record.attributes);

            if record.kind.is_directory() {
                if !self.config.should_descend(&record.name, hidden, system)
                    || self.config.is_path_excluded(&record.full_path)
                {
                    continue;
                }
                if let Some(id) = self.insert_or_refresh(record) {
                    scope.spawn(move |scope| self.scan_dir(scope, path, id, drive_id));
                }
            } else {
                if hidden && !self.config.indexing.index_hidden {
                    continue;
                }
                if system && !self.config.indexing.index_system {
                    continue;
                }
                if self.config.is_extension_excluded(&record.extension)
                    || self.config.is_path_excluded(&record.full_path)
                {
                    continue;
                }
                self.insert_or_refresh(record);
            }
        }
    }

    /// Insert a record, or refresh the existing one when the priority
    /// phase (or a previous scan) already indexed the path. Returns the
    /// live id.
    fn insert_or_refresh(&self, record: crate::types::FileRecord) -> Option<u64> {
        let path = record.full_path.clone();
        match self.index.add(record.clone()) {
            Ok(id) => {
                self.bump_progress(&path);
                Some(id)
            }
            Err(crate::error::LoupeError::DuplicatePath { .. }) => {
                let existing = self.index.get_by_path(&path)?;
                let changed = existing.size != record.size
                    || existing.mtime != record.mtime
                    || (record.parent_id != 0 && existing.parent_id != record.parent_id);
                if changed {
                    let mut refreshed = record;
                    refreshed.id = existing.id;
                    refreshed.access_count = existing.access_count;
                    if refreshed.parent_id == 0 {
                        refreshed.parent_id = existing.parent_id;
                    }
                    if let Err(e) = self.index.update(refreshed) {
                        warn!(path, error = %e, "Refresh failed");
                    }
                }
                Some(existing.id)
            }
            Err(e) => {
                warn!(path, error = %e, "Skipping entry");
                self.index.note_error();
                None
            }
        }
    }

    /// Insert (or look up) a directory record for a priority root.
    fn ensure_directory(&self, dir: &Path, drive_id: u64) -> Option<u64> {
        let metadata = match std::fs::symlink_metadata(dir) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.note_fs_error(dir, &e);
                return None;
            }
        };
        let parent_id = dir
            .parent()
            .and_then(|p| self.index.get_by_path(&p.to_string_lossy()))
            .map_or(0, |r| r.id);
        let record = record_from_metadata(dir, &metadata)
            .with_parent(parent_id)
            .with_drive(drive_id);
        self.insert_or_refresh(record)
    }

    /// Rescan one root and drop indexed entries that no longer exist
    /// under it. Used after a watcher overflow; queries stay answerable
    /// throughout because every step goes through the normal write path.
    pub fn resync_root(&self, root: &Path) -> usize {
        info!(root = %root.display(), "Resyncing root");
        let drive_id = self.index.resolve_drive(&root.to_string_lossy());
        let mut live: HashSet<String> = HashSet::new();
        let mut stack: Vec<(PathBuf, u64)> = vec![(root.to_path_buf(), 0)];

        while let Some((dir, dir_id)) = stack.pop() {
            if self.stop.load(Ordering::Relaxed) {
                // A cancelled resync must not prune anything it did not see
                return 0;
            }
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.note_fs_error(&dir, &e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        self.note_fs_error(&entry.path(), &e);
                        continue;
                    }
                };
                let path = entry.path();
                let record = record_from_metadata(&path, &metadata)
                    .with_parent(dir_id)
                    .with_drive(drive_id);
                let hidden = is_hidden(&record.name, record.attributes);
                let system = is_system(record.attributes);

                if record.kind.is_directory() {
                    if !self.config.should_descend(&record.name, hidden, system)
                        || self.config.is_path_excluded(&record.full_path)
                    {
                        continue;
                    }
                    live.insert(record.path_key());
                    if let Some(id) = self.insert_or_refresh(record) {
                        stack.push((path, id));
                    }
                } else {
                    if (hidden && !self.config.indexing.index_hidden)
                        || (system && !self.config.indexing.index_system)
                        || self.config.is_extension_excluded(&record.extension)
                        || self.config.is_path_excluded(&record.full_path)
                    {
                        continue;
                    }
                    live.insert(record.path_key());
                    self.insert_or_refresh(record);
                }
            }
        }

        self.index.prune_missing(&root.to_string_lossy(), &live)
    }

    fn bump_progress(&self, current_path: &str) {
        let count = self.inserted.fetch_add(1, Ordering::Relaxed) + 1;
        if count % PROGRESS_EVERY == 0 {
            self.report_progress(self.estimate_progress(), current_path);
        }
    }

    /// Coarse estimate: completed drives count fully, the drive in
    /// flight counts half. Imprecise by design.
    fn estimate_progress(&self) -> f64 {
        let total = self.drives_total.load(Ordering::Relaxed).max(1);
        let done = self.drives_completed.load(Ordering::Relaxed);
        let partial = if done < total { 50 } else { 0 };
        ((done * 100 + partial) as f64 / total as f64).min(100.0)
    }

    fn report_progress(&self, percentage: f64, current_path: &str) {
        if let Some(progress) = &self.progress {
            progress(percentage, current_path);
        }
    }

    fn note_fs_error(&self, path: &Path, error: &std::io::Error) {
        debug!(path = %path.display(), error = %error, "Scan error absorbed");
        self.index.note_error();
    }

    /// Total records inserted by this walker.
    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }
}

/// Roots of every available drive, honoring the configured whitelist.
#[cfg(windows)]
fn available_drive_roots(config: &Config) -> Vec<PathBuf> {
    // A: and B: are floppy relics; skip them
    ('C'..='Z')
        .map(|letter| PathBuf::from(format!("{}:/", letter)))
        .filter(|root| root.exists())
        .filter(|root| config.should_index_drive(&root.to_string_lossy()))
        .collect()
}

#[cfg(not(windows))]
fn available_drive_roots(config: &Config) -> Vec<PathBuf> {
    let root = PathBuf::from("/");
    if config.should_index_drive("/") {
        vec![root]
    } else {
        config
            .indexing
            .drives
            .iter()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .collect()
    }
}

/// The fixed user-directory list scanned first.
fn priority_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(user) = directories::UserDirs::new() {
        let candidates = [
            user.document_dir(),
            user.desktop_dir(),
            user.download_dir(),
            user.picture_dir(),
            user.video_dir(),
            user.audio_dir(),
        ];
        for dir in candidates.into_iter().flatten() {
            if dir.is_dir() {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn walker_for(index: &Arc<FileIndex>, config: Config) -> Walker {
        Walker::new(config, Arc::clone(index), Arc::new(AtomicBool::new(false))).unwrap()
    }

    fn small_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.TXT"), b"beta").unwrap();
        std::fs::write(dir.path().join("sub/c.log"), b"gamma").unwrap();
        dir
    }

    #[test]
    fn test_cold_start_small_tree() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let walker = walker_for(&index, Config::default());

        walker.run(&[dir.path().to_path_buf()]).unwrap();

        let stats = index.stats();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_directories, 1);
        assert!(index.validate().is_empty());

        // Parent linkage: files in sub/ hang off the sub record
        let sub = index
            .get_by_path(&dir.path().join("sub").to_string_lossy())
            .unwrap();
        let children = index.children_of(sub.id);
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_extension_exclusion() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let mut config = Config::default();
        config.indexing.exclude_extensions = vec!["log".to_string()];
        let walker = walker_for(&index, config);

        walker.run(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(index.stats().total_files, 2);
        assert!(index
            .get_by_path(&dir.path().join("sub/c.log").to_string_lossy())
            .is_none());
    }

    #[test]
    fn test_hidden_files_skipped_by_default() {
        if cfg!(windows) {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        std::fs::write(dir.path().join("visible.txt"), b"x").unwrap();

        let index = Arc::new(FileIndex::new());
        walker_for(&index, Config::default())
            .run(&[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(index.stats().total_files, 1);

        let permissive = Arc::new(FileIndex::new());
        let mut config = Config::default();
        config.indexing.index_hidden = true;
        walker_for(&permissive, config)
            .run(&[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(permissive.stats().total_files, 2);
    }

    #[test]
    fn test_cancellation_leaves_consistent_index() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let stop = Arc::new(AtomicBool::new(true));
        let walker = Walker::new(Config::default(), Arc::clone(&index), stop).unwrap();

        walker.run(&[dir.path().to_path_buf()]).unwrap();
        // Cancelled before anything was scanned, and still consistent
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let walker = walker_for(&index, Config::default());

        walker.run(&[dir.path().to_path_buf()]).unwrap();
        let first = index.stats();
        walker.run(&[dir.path().to_path_buf()]).unwrap();
        let second = index.stats();

        assert_eq!(first.total_files, second.total_files);
        assert_eq!(first.total_directories, second.total_directories);
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_resync_prunes_deleted_entries() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let walker = walker_for(&index, Config::default());
        walker.run(&[dir.path().to_path_buf()]).unwrap();

        // A file vanishes while the watcher was overflowed
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        std::fs::write(dir.path().join("d.txt"), b"delta").unwrap();

        walker.resync_root(dir.path());

        assert!(index
            .get_by_path(&dir.path().join("a.txt").to_string_lossy())
            .is_none());
        assert!(index
            .get_by_path(&dir.path().join("d.txt").to_string_lossy())
            .is_some());
        assert!(index.validate().is_empty());
    }

    #[test]
    fn test_progress_reported_on_completion() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let walker = walker_for(&index, Config::default())
            .with_progress(Arc::new(move |pct, _| sink.lock().push(pct)));
        walker.run(&[dir.path().to_path_buf()]).unwrap();

        let reports = seen.lock();
        assert!(!reports.is_empty());
        assert_eq!(*reports.last().unwrap(), 100.0);
    }

    #[test]
    fn test_drive_registered() {
        let dir = small_tree();
        let index = Arc::new(FileIndex::new());
        walker_for(&index, Config::default())
            .run(&[dir.path().to_path_buf()])
            .unwrap();

        let drives = index.drives();
        assert_eq!(drives.len(), 1);
        let drive_id = drives[0].id;
        assert!(!index.files_on_drive(drive_id).is_empty());
    }
}
