//! Index command - build the initial file index.

use crate::app::App;
use loupe_core::Config;
use std::sync::Arc;
use std::time::Instant;

/// Run the index command.
pub fn run(config: Config, drives: Vec<String>) -> anyhow::Result<()> {
    let app = App::new(config)?;

    if !app.index.is_empty() {
        println!("Index already exists with {} entries.", app.index.len());
        println!("Use 'loupe rebuild' to start from scratch.");
        return Ok(());
    }

    println!("Building file index...");

    let roots = app.scan_roots(&drives);
    let start = Instant::now();

    let walker = app.walker()?.with_progress(Arc::new(|pct, path| {
        if path.is_empty() {
            eprintln!("  {:>5.1}%", pct);
        } else {
            eprintln!("  {:>5.1}%  {}", pct, path);
        }
    }));
    walker.run(&roots)?;

    app.enforce_memory_cap();
    app.save_index()?;

    let elapsed = start.elapsed();
    let stats = app.index.stats();

    println!();
    println!("Indexing complete!");
    println!("  Files:       {}", stats.total_files);
    println!("  Directories: {}", stats.total_directories);
    println!("  Drives:      {}", stats.indexed_drives);
    println!("  Errors:      {}", stats.errors_encountered);
    println!("  Time:        {:.2}s", elapsed.as_secs_f64());
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "  Rate:        {:.0} entries/sec",
            stats.total_entries() as f64 / elapsed.as_secs_f64()
        );
    }

    Ok(())
}
