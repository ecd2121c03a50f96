//! Event coalescing.
//!
//! Bursty writers (editors, compilers, git) emit several events for the
//! same path within milliseconds. The coalescer retains a short-lived
//! `path → event` map and merges within a time window: the later event
//! wins, except that a `Deleted` is sticky for its window, and
//! rename/move events are never merged with each other. The map is
//! drained every window.

use crate::watch::{ChangeEvent, ChangeKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Default coalescing window.
pub const DEFAULT_WINDOW_MS: u64 = 100;

/// Accumulates change events and flushes them once per window.
pub struct EventCoalescer {
    window: Duration,
    pending: HashMap<PathBuf, ChangeEvent>,
    arrival: Vec<PathBuf>,
    /// Events forced out early (colliding renames), flushed first
    ready: Vec<ChangeEvent>,
    window_start: Option<Instant>,
}

impl EventCoalescer {
    pub fn new(window: Duration) -> Self {
        EventCoalescer {
            window,
            pending: HashMap::new(),
            arrival: Vec::new(),
            ready: Vec::new(),
            window_start: None,
        }
    }

    /// Merge an event into the window.
    pub fn add(&mut self, event: ChangeEvent) {
        if self.window_start.is_none() {
            self.window_start = Some(Instant::now());
        }

        let key = event.path.clone();
        let existing_kind = self.pending.get(&key).map(|e| e.kind);
        match existing_kind {
            None => {
                self.arrival.push(key.clone());
                self.pending.insert(key, event);
            }
            Some(pending_kind) => {
                let merged = match (pending_kind, event.kind) {
                    // Deleted is sticky within the window
                    (ChangeKind::Deleted, _) => None,
                    // Renames never merge with each other; force the
                    // pending one out and start fresh
                    (
                        ChangeKind::Renamed | ChangeKind::Moved,
                        ChangeKind::Renamed | ChangeKind::Moved,
                    ) => {
                        if let Some(prior) = self.take_pending(&key) {
                            self.ready.push(prior);
                        }
                        Some(event)
                    }
                    // A delete against a pending rename needs both applied:
                    // move the record, then remove it
                    (ChangeKind::Renamed | ChangeKind::Moved, ChangeKind::Deleted) => {
                        if let Some(prior) = self.take_pending(&key) {
                            self.ready.push(prior);
                        }
                        Some(event)
                    }
                    // The rename's re-stat observes the newer content;
                    // keep the rename so the old path still gets unbound
                    (ChangeKind::Renamed | ChangeKind::Moved, _) => None,
                    // Otherwise the later event wins
                    _ => Some(event),
                };
                if let Some(event) = merged {
                    if !self.pending.contains_key(&key) {
                        self.arrival.push(key.clone());
                    }
                    self.pending.insert(key, event);
                }
            }
        }
    }

    fn take_pending(&mut self, key: &PathBuf) -> Option<ChangeEvent> {
        self.arrival.retain(|p| p != key);
        self.pending.remove(key)
    }

    /// Whether the current window has elapsed.
    pub fn is_ready(&self) -> bool {
        match self.window_start {
            Some(start) => start.elapsed() >= self.window,
            None => !self.ready.is_empty(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.ready.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.ready.len()
    }

    /// Drain the window in arrival order. Events forced out by colliding
    /// renames come first, preserving per-path wall-clock order.
    pub fn flush(&mut self) -> Vec<ChangeEvent> {
        let mut out = std::mem::take(&mut self.ready);
        for key in self.arrival.drain(..) {
            if let Some(event) = self.pending.remove(&key) {
                out.push(event);
            }
        }
        self.pending.clear();
        self.window_start = None;
        out
    }

    /// The configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for EventCoalescer {
    fn default() -> Self {
        EventCoalescer::new(Duration::from_millis(DEFAULT_WINDOW_MS))
    }
}
