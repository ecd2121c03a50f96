//! Stats command - show index and cache statistics.

use crate::app::App;
use loupe_core::Config;

/// Run the stats command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let stats = app.index.stats();

    println!("Index");
    println!("  Files:         {}", stats.total_files);
    println!("  Directories:   {}", stats.total_directories);
    println!("  Total size:    {} bytes", stats.total_size);
    println!("  Drives:        {}", stats.indexed_drives);
    println!("  Tokens:        {}", stats.token_count);
    println!("  Trie nodes:    {}", stats.trie_node_count);
    println!("  Bloom entries: {}", stats.bloom_element_count);
    println!("  Errors:        {}", stats.errors_encountered);
    if let Some(when) = stats.last_full_scan {
        println!("  Last scan:     {}", when.to_rfc3339());
    }
    if let Some(when) = stats.last_updated {
        println!("  Last update:   {}", when.to_rfc3339());
    }

    let cache = app.cache.stats();
    println!();
    println!("Cache");
    println!("  Hits:          {}", cache.hits);
    println!("  Misses:        {}", cache.misses);
    println!("  Evictions:     {}", cache.evictions);
    println!("  Hit ratio:     {:.1}%", cache.hit_ratio() * 100.0);
    println!(
        "  Entries:       {} records, {} queries, {} paths",
        cache.record_entries, cache.query_entries, cache.path_entries
    );

    let search = app.planner.stats();
    println!();
    println!("Search");
    println!("  Queries:       {}", search.total_searches);
    println!(
        "  Result cache:  {} hits / {} misses",
        search.cache_hits, search.cache_misses
    );

    Ok(())
}
