//! Watch command - keep the index fresh until SIGINT/SIGTERM.

use crate::app::App;
use crate::signals;
use loupe_core::{ChangePipeline, Config, FsWatcher, Mutator};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run the watch command. Blocks until a termination signal arrives,
/// then drains pending events and persists the index.
pub fn run(config: Config, daemon: bool) -> anyhow::Result<()> {
    if !config.watcher.enabled {
        anyhow::bail!("watching is disabled (--no-watch or configuration)");
    }
    if !FsWatcher::is_supported() {
        anyhow::bail!("no filesystem notification backend on this platform");
    }

    let app = App::new(config)?;

    if app.index.is_empty() {
        eprintln!("Index is empty. Run 'loupe index' first.");
        return Ok(());
    }

    let roots: Vec<PathBuf> = app
        .index
        .drives()
        .into_iter()
        .map(|d| PathBuf::from(d.mount_point))
        .filter(|p| p.exists())
        .collect();

    if roots.is_empty() {
        eprintln!("No watchable roots in the index.");
        return Ok(());
    }

    let (mut watcher, receiver) =
        FsWatcher::start(&roots, app.config.watcher.queue_capacity)?;

    let mutator = Arc::new(Mutator::new(
        Arc::clone(&app.index),
        Arc::clone(&app.cache),
        app.config.clone(),
    ));

    let rescan_walker = Arc::new(app.walker()?);
    let mut pipeline = ChangePipeline::spawn(
        receiver,
        mutator,
        Duration::from_millis(app.config.watcher.coalesce_window_ms),
        Box::new({
            let walker = Arc::clone(&rescan_walker);
            let cache = Arc::clone(&app.cache);
            move |root| {
                walker.resync_root(root);
                cache.invalidate_queries();
            }
        }),
    );

    signals::install(Arc::clone(&app.stop));

    if !daemon {
        println!("Watching {} root(s) for changes.", roots.len());
        println!("Press Ctrl+C to stop.");
    }
    info!(roots = roots.len(), "Watch started");

    let mut ticks = 0u64;
    while !app.stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        ticks += 1;
        if ticks % 25 == 0 {
            app.enforce_memory_cap();
        }
    }

    // Graceful shutdown: stop the watcher first so no new events arrive,
    // then drain and apply what is already queued
    info!("Shutting down");
    watcher.stop();
    pipeline.stop();
    app.save_index()?;

    if !daemon {
        println!("Watch stopped.");
    }
    Ok(())
}
