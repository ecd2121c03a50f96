//! Rebuild command - drop the in-memory index and rescan.

use crate::app::App;
use loupe_core::Config;
use std::time::Instant;

/// Run the rebuild command.
pub fn run(config: Config, drives: Vec<String>) -> anyhow::Result<()> {
    let app = App::new(config)?;

    println!("Rebuilding file index...");

    app.index.clear();
    app.cache.clear();
    if let Some(store) = &app.store {
        store.clear()?;
    }

    let roots = app.scan_roots(&drives);
    let start = Instant::now();

    app.walker()?.run(&roots)?;
    app.save_index()?;

    let elapsed = start.elapsed();
    let stats = app.index.stats();

    println!();
    println!("Rebuild complete!");
    println!("  Files:       {}", stats.total_files);
    println!("  Directories: {}", stats.total_directories);
    println!("  Time:        {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
