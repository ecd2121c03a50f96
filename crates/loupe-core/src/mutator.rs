//! Applies coalesced change events to the index.
//!
//! Each event kind has a handler that re-stats the path where needed and
//! performs the matching index operation. Races with the walker and with
//! fast delete sequences are expected and absorbed: an `add` that loses to
//! a concurrent insert becomes an `update`, a `Modified` for an unindexed
//! path becomes a create, and a stat that fails with not-found is dropped
//! silently because the deletion event is already on its way.
//!
//! Every applied batch invalidates the query caches; only results provably
//! untouched by the write could be kept, and dropping all of them is the
//! safe default.

use crate::cache::CacheManager;
use crate::config::Config;
use crate::error::LoupeError;
use crate::fsutil::record_from_metadata;
use crate::index::FileIndex;
use crate::types::FileRecord;
use crate::watch::{ChangeEvent, ChangeKind};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked with a description of each absorbed error.
pub type ErrorCallback = dyn Fn(&str) + Send + Sync;

pub struct Mutator {
    index: Arc<FileIndex>,
    cache: Arc<CacheManager>,
    config: Config,
    on_error: Option<Box<ErrorCallback>>,
}

impl Mutator {
    pub fn new(index: Arc<FileIndex>, cache: Arc<CacheManager>, config: Config) -> Self {
        Mutator {
            index,
            cache,
            config,
            on_error: None,
        }
    }

    /// Register a callback for absorbed permission/io errors.
    pub fn with_error_callback(mut self, callback: Box<ErrorCallback>) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Apply a batch of coalesced events, then invalidate the query
    /// caches once.
    pub fn apply_batch(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            self.apply(&event);
        }
        self.cache.invalidate_queries();
    }

    /// Apply a single event. Path-local failures are absorbed and
    /// counted; nothing here is fatal.
    pub fn apply(&self, event: &ChangeEvent) {
        debug!(kind = %event.kind, path = %event.path.display(), "Applying change");
        match event.kind {
            ChangeKind::Created => self.apply_created(&event.path),
            ChangeKind::Modified => self.apply_modified(&event.path),
            ChangeKind::Deleted => self.apply_deleted(&event.path),
            ChangeKind::Renamed | ChangeKind::Moved => {
                match event.old_path.as_deref() {
                    Some(old) => self.apply_renamed(old, &event.path),
                    // A rename without its old half degrades to a create
                    None => self.apply_created(&event.path),
                }
            }
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        if self.config.is_path_excluded(&path_str) {
            return true;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        !extension.is_empty() && self.config.is_extension_excluded(&extension)
    }

    fn apply_created(&self, path: &Path) {
        if self.is_excluded(path) {
            return;
        }
        let record = match self.stat(path) {
            Some(record) => record,
            None => return,
        };

        match self.index.add(record.clone()) {
            Ok(_) => {}
            Err(LoupeError::DuplicatePath { .. }) => {
                // The walker won the race; refresh the existing record
                if let Some(existing) = self.index.get_by_path(&record.full_path) {
                    let mut refreshed = record;
                    refreshed.id = existing.id;
                    refreshed.access_count = existing.access_count;
                    if let Err(e) = self.index.update(refreshed) {
                        self.absorb(&format!("update after create race: {}", e));
                    }
                    self.cache.remove_record(existing.id);
                }
            }
            Err(e) => self.absorb(&format!("create {}: {}", path.display(), e)),
        }
    }

    fn apply_modified(&self, path: &Path) {
        let existing = match self.index.get_by_path(&path.to_string_lossy()) {
            Some(existing) => existing,
            // Not indexed yet: the create raced past us
            None => return self.apply_created(path),
        };

        let record = match self.stat(path) {
            Some(record) => record,
            None => return,
        };

        let mut refreshed = record;
        refreshed.id = existing.id;
        refreshed.parent_id = existing.parent_id;
        refreshed.drive_id = existing.drive_id;
        refreshed.access_count = existing.access_count;

        if let Err(e) = self.index.update(refreshed) {
            self.absorb(&format!("modify {}: {}", path.display(), e));
        }
        self.cache.remove_record(existing.id);
    }

    fn apply_deleted(&self, path: &Path) {
        let path_str = path.to_string_lossy();
        if let Some(record) = self.index.get_by_path(&path_str) {
            if record.kind.is_directory() {
                // The cascade removes an unknown set of ids
                self.cache.clear_records();
            } else {
                self.cache.remove_record(record.id);
            }
            self.index.remove_by_path(&path_str);
        }
    }

    fn apply_renamed(&self, old_path: &Path, new_path: &Path) {
        if self.is_excluded(new_path) {
            // Renamed into an excluded subtree: gone as far as the index
            // is concerned
            return self.apply_deleted(old_path);
        }

        let existing = match self.index.get_by_path(&old_path.to_string_lossy()) {
            Some(existing) => existing,
            // Old path unknown: treat as a fresh create of the target
            None => return self.apply_created(new_path),
        };

        let mut renamed = existing.clone();
        renamed.set_path(new_path.to_string_lossy().into_owned());
        renamed.parent_id = self.parent_id_of(new_path);
        renamed.drive_id = self.index.resolve_drive(&renamed.full_path);

        // Pick up size/mtime changes bundled with the rename; a failed
        // stat keeps the old values (the delete will follow if it's gone)
        if let Some(stat) = self.stat_quiet(new_path) {
            renamed.size = stat.size;
            renamed.mtime = stat.mtime;
            renamed.atime = stat.atime;
            renamed.attributes = stat.attributes;
        }

        if let Err(e) = self.index.update(renamed.clone()) {
            self.absorb(&format!("rename {}: {}", new_path.display(), e));
            return;
        }
        self.cache.remove_record(existing.id);

        if renamed.kind.is_directory() {
            self.rewrite_subtree_paths(&existing.full_path, &renamed.full_path, renamed.id);
            self.cache.clear_records();
        }
    }

    /// Rewrite descendant paths after a directory rename so their bindings
    /// keep pointing at live filesystem paths.
    fn rewrite_subtree_paths(&self, old_prefix: &str, new_prefix: &str, dir_id: u64) {
        for child in self.index.children_of(dir_id) {
            let new_path = match child.full_path.strip_prefix(old_prefix) {
                Some(rest) => format!("{}{}", new_prefix, rest),
                None => continue,
            };
            let mut moved = child.clone();
            moved.set_path(new_path);
            moved.drive_id = self.index.resolve_drive(&moved.full_path);
            if let Err(e) = self.index.update(moved) {
                self.absorb(&format!("subtree rename {}: {}", child.full_path, e));
                continue;
            }
            if child.kind.is_directory() {
                let new_child_prefix = match child.full_path.strip_prefix(old_prefix) {
                    Some(rest) => format!("{}{}", new_prefix, rest),
                    None => continue,
                };
                self.rewrite_subtree_paths(&child.full_path, &new_child_prefix, child.id);
            }
        }
    }

    fn parent_id_of(&self, path: &Path) -> u64 {
        path.parent()
            .and_then(|p| self.index.get_by_path(&p.to_string_lossy()))
            .map_or(0, |r| r.id)
    }

    /// Stat a path, routing failures per the error policy: not-found is
    /// silently suppressed (a racing delete), permission and io failures
    /// are counted and reported.
    fn stat(&self, path: &Path) -> Option<FileRecord> {
        match std::fs::symlink_metadata(path) {
            Ok(metadata) => {
                let mut record = record_from_metadata(path, &metadata);
                record.parent_id = self.parent_id_of(path);
                record.drive_id = self.index.resolve_drive(&record.full_path);
                Some(record)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Stat lost a race with deletion");
                None
            }
            Err(e) => {
                self.absorb(&format!("stat {}: {}", path.display(), e));
                None
            }
        }
    }

    fn stat_quiet(&self, path: &Path) -> Option<FileRecord> {
        std::fs::symlink_metadata(path)
            .ok()
            .map(|metadata| record_from_metadata(path, &metadata))
    }

    fn absorb(&self, message: &str) {
        warn!(message, "Absorbed mutation error");
        self.index.note_error();
        if let Some(callback) = &self.on_error {
            callback(message);
        }
    }
}
