//! Filesystem change watching.
//!
//! [`FsWatcher`] normalizes the three platform notification mechanisms
//! (inotify, FSEvents, ReadDirectoryChangesW) into the five change kinds
//! the mutator understands, via the `notify` crate. Events flow through a
//! bounded channel; rescan-flagged notifications (the platform buffer
//! overflowed) surface as [`WatcherMessage::RescanNeeded`] so the owner
//! can schedule a root rescan. Anything finer than the five kinds is
//! deliberately dropped.

use crate::error::{LoupeError, Result};
use crossbeam_channel::{Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The kind of change that occurred to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// New name, same parent directory
    Renamed,
    /// New parent directory
    Moved,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
            ChangeKind::Moved => write!(f, "moved"),
        }
    }
}

/// A normalized filesystem change event.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,

    /// The affected path (the new path for renames and moves)
    pub path: PathBuf,

    /// The previous path for renames and moves
    pub old_path: Option<PathBuf>,

    /// Seconds since epoch when the event was observed
    pub timestamp: i64,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        ChangeEvent {
            kind,
            path: path.into(),
            old_path: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Build a rename/move event carrying both paths. The kind is
    /// `Renamed` when the parent directory is unchanged, `Moved` otherwise.
    pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        let old_path = old_path.into();
        let new_path = new_path.into();
        let kind = if old_path.parent() == new_path.parent() {
            ChangeKind::Renamed
        } else {
            ChangeKind::Moved
        };
        ChangeEvent {
            kind,
            path: new_path,
            old_path: Some(old_path),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_rename(&self) -> bool {
        matches!(self.kind, ChangeKind::Renamed | ChangeKind::Moved)
    }
}

/// Messages produced by the watcher.
#[derive(Debug)]
pub enum WatcherMessage {
    /// A normalized change event
    Change(ChangeEvent),

    /// The platform buffer overflowed; the root must be rescanned
    RescanNeeded { root: PathBuf, reason: String },

    /// A non-fatal watcher error
    Error { message: String },
}

/// Watches a set of roots and pushes normalized events into a bounded
/// channel. Dropping the watcher (or calling [`FsWatcher::stop`]) shuts
/// the forwarding thread down and disconnects the channel.
pub struct FsWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    // Kept alive for the duration of the watch; dropping it unregisters
    // the platform watches.
    _watcher: RecommendedWatcher,
    errors: Arc<AtomicU64>,
}

impl FsWatcher {
    /// Whether this platform has a native notification mechanism.
    pub fn is_supported() -> bool {
        cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows"))
    }

    /// Start watching `roots` recursively. Returns the watcher handle and
    /// the receiving side of the bounded event queue.
    pub fn start(
        roots: &[PathBuf],
        queue_capacity: usize,
    ) -> Result<(FsWatcher, Receiver<WatcherMessage>)> {
        if !Self::is_supported() {
            return Err(LoupeError::WatcherUnavailable {
                reason: "no native notification backend on this platform".to_string(),
            });
        }

        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| LoupeError::WatcherUnavailable {
            reason: e.to_string(),
        })?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| LoupeError::WatcherUnavailable {
                    reason: format!("{}: {}", root.display(), e),
                })?;
            info!(root = %root.display(), "Watching for changes");
        }

        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(64));
        let stop = Arc::new(AtomicBool::new(false));
        let errors = Arc::new(AtomicU64::new(0));
        let thread = {
            let stop = Arc::clone(&stop);
            let errors = Arc::clone(&errors);
            let roots = roots.to_vec();
            std::thread::spawn(move || forward_loop(raw_rx, tx, roots, stop, errors))
        };

        Ok((
            FsWatcher {
                stop,
                thread: Some(thread),
                _watcher: watcher,
                errors,
            },
            rx,
        ))
    }

    /// Signal the forwarding thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Errors observed and absorbed so far.
    pub fn errors_encountered(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Move raw notify events onto the bounded queue, translating as we go.
/// The queue send is blocking: a full queue applies backpressure here
/// rather than inside the platform callback.
fn forward_loop(
    raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    tx: Sender<WatcherMessage>,
    roots: Vec<PathBuf>,
    stop: Arc<AtomicBool>,
    errors: Arc<AtomicU64>,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let event = match raw_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Watcher error");
                if tx
                    .send(WatcherMessage::Error {
                        message: e.to_string(),
                    })
                    .is_err()
                {
                    break;
                }
                continue;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if event.need_rescan() {
            warn!("Platform notification buffer overflowed");
            for root in affected_roots(&roots, &event.paths) {
                if tx
                    .send(WatcherMessage::RescanNeeded {
                        root,
                        reason: "notification buffer overflow".to_string(),
                    })
                    .is_err()
                {
                    return;
                }
            }
            continue;
        }

        for change in translate(&event) {
            debug!(kind = %change.kind, path = %change.path.display(), "Change observed");
            if tx.send(WatcherMessage::Change(change)).is_err() {
                return;
            }
        }
    }
}

/// Roots touched by an event; an empty path list means all of them.
fn affected_roots(roots: &[PathBuf], paths: &[PathBuf]) -> Vec<PathBuf> {
    if paths.is_empty() {
        return roots.to_vec();
    }
    let mut out: Vec<PathBuf> = roots
        .iter()
        .filter(|root| paths.iter().any(|p| p.starts_with(root)))
        .cloned()
        .collect();
    if out.is_empty() {
        out = roots.to_vec();
    }
    out
}

/// Translate one notify event into zero or more normalized changes.
fn translate(event: &notify::Event) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => per_path(&event.paths, ChangeKind::Created),
        EventKind::Remove(_) => per_path(&event.paths, ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => {
                vec![ChangeEvent::renamed(
                    event.paths[0].clone(),
                    event.paths[1].clone(),
                )]
            }
            // Halves of a rename that the backend could not pair
            RenameMode::From => per_path(&event.paths, ChangeKind::Deleted),
            RenameMode::To => per_path(&event.paths, ChangeKind::Created),
            _ => per_path(&event.paths, ChangeKind::Modified),
        },
        EventKind::Modify(_) => per_path(&event.paths, ChangeKind::Modified),
        _ => Vec::new(),
    }
}

fn per_path(paths: &[PathBuf], kind: ChangeKind) -> Vec<ChangeEvent> {
    paths
        .iter()
        .map(|p| ChangeEvent::new(kind, p.clone()))
        .collect()
}

/// Convenience wrapper for tests and manual injection: push a change
/// straight into a queue the way the watcher would.
pub fn inject(tx: &Sender<WatcherMessage>, event: ChangeEvent) -> Result<()> {
    tx.send(WatcherMessage::Change(event))
        .map_err(|_| LoupeError::WatcherUnavailable {
            reason: "event queue disconnected".to_string(),
        })
}
