//! Search command - one-shot query against the index.

use crate::app::App;
use loupe_core::{Config, SearchMode, SearchQuery};
use std::time::Instant;

/// Run the search command. Prints the top 10 hits with name, path, size
/// and score.
pub fn run(
    config: Config,
    text: &str,
    mode: Option<SearchMode>,
    max_results: Option<usize>,
    case_sensitive: bool,
    extensions: Vec<String>,
) -> anyhow::Result<()> {
    let app = App::new(config)?;

    if app.index.is_empty() {
        eprintln!("Index is empty. Run 'loupe index' first.");
        anyhow::bail!("nothing indexed");
    }

    let mode = mode.unwrap_or(app.config.search.default_mode);
    if mode == SearchMode::Fuzzy && !app.config.search.fuzzy_enabled {
        anyhow::bail!("fuzzy search is disabled in the configuration");
    }

    let mut query = SearchQuery::new(text, mode)
        .with_max_results(max_results.unwrap_or(app.config.search.max_results))
        .with_case_sensitive(case_sensitive)
        .with_extensions(extensions);
    query.fuzzy_threshold = app.config.search.fuzzy_threshold;
    for excluded in &app.config.indexing.exclude_paths {
        query.exclude_paths.push(excluded.clone());
    }

    let start = Instant::now();
    let outcome = app.planner.search(&query)?;
    let elapsed = start.elapsed();

    for hit in outcome.hits.iter().take(10) {
        println!(
            "{:<32} {:>10}  {:.3}  {}",
            hit.record.name,
            format_size(hit.record.size),
            hit.score,
            hit.record.full_path
        );
    }

    println!();
    println!(
        "{} of {} matches in {:.1} ms{}",
        outcome.hits.len().min(10),
        outcome.total_matches,
        elapsed.as_secs_f64() * 1000.0,
        if outcome.from_cache { " (cached)" } else { "" }
    );

    Ok(())
}

/// Human-readable byte size.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
