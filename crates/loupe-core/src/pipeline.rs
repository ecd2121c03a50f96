//! The change-propagation pipeline: watcher → coalescer → mutator.
//!
//! A single worker thread drains the bounded watcher queue, feeds events
//! through the coalescing window, and hands each flushed batch to the
//! mutator. Overflow notifications schedule a root rescan through the
//! callback supplied by the owner. Shutdown is graceful: pending queue
//! entries are drained and the final window is applied before the thread
//! exits, so no observed event is lost.

use crate::coalesce::EventCoalescer;
use crate::mutator::Mutator;
use crate::watch::WatcherMessage;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Callback invoked when a root needs a rescan after an overflow.
pub type RescanFn = dyn Fn(&PathBuf) + Send + Sync;

pub struct ChangePipeline {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ChangePipeline {
    /// Spawn the pipeline worker. `window` is the coalescing window.
    pub fn spawn(
        receiver: Receiver<WatcherMessage>,
        mutator: Arc<Mutator>,
        window: Duration,
        on_rescan: Box<RescanFn>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                worker_loop(receiver, mutator, window, on_rescan, stop);
            })
        };
        ChangePipeline {
            stop,
            thread: Some(thread),
        }
    }

    /// Signal shutdown, drain pending events, and wait for the worker.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Shared stop flag, for wiring into signal handlers.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

impl Drop for ChangePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    receiver: Receiver<WatcherMessage>,
    mutator: Arc<Mutator>,
    window: Duration,
    on_rescan: Box<RescanFn>,
    stop: Arc<AtomicBool>,
) {
    let mut coalescer = EventCoalescer::new(window);
    let poll = window.min(Duration::from_millis(50)).max(Duration::from_millis(5));

    loop {
        if stop.load(Ordering::Relaxed) {
            // Drain whatever is already queued before leaving
            while let Ok(message) = receiver.try_recv() {
                handle_message(message, &mut coalescer, &on_rescan);
            }
            mutator.apply_batch(coalescer.flush());
            info!("Change pipeline drained and stopped");
            return;
        }

        match receiver.recv_timeout(poll) {
            Ok(message) => handle_message(message, &mut coalescer, &on_rescan),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                mutator.apply_batch(coalescer.flush());
                info!("Watcher queue disconnected, pipeline stopping");
                return;
            }
        }

        if coalescer.has_pending() && coalescer.is_ready() {
            mutator.apply_batch(coalescer.flush());
        }
    }
}

fn handle_message(
    message: WatcherMessage,
    coalescer: &mut EventCoalescer,
    on_rescan: &RescanFn,
) {
    match message {
        WatcherMessage::Change(event) => coalescer.add(event),
        WatcherMessage::RescanNeeded { root, reason } => {
            warn!(root = %root.display(), reason, "Scheduling rescan");
            on_rescan(&root);
        }
        WatcherMessage::Error { message } => {
            warn!(message, "Watcher reported an error");
        }
    }
}
