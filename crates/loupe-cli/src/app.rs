//! Application state management.

use loupe_core::{
    CacheManager, Config, FileIndex, IndexStore, QueryPlanner, RankingConfig, Walker,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The file index
    pub index: Arc<FileIndex>,

    /// Hot caches in front of the index
    pub cache: Arc<CacheManager>,

    /// Query planning and execution
    pub planner: QueryPlanner,

    /// Warm-start persistence, when enabled
    pub store: Option<IndexStore>,

    /// Process-wide stop flag for walker and watcher
    pub stop: Arc<AtomicBool>,
}

impl App {
    /// Create a new application instance, warming the index from the
    /// store when persistence is enabled.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = if config.storage.persist {
            Some(IndexStore::new(config.store_dir()?))
        } else {
            None
        };

        let index = Arc::new(match &store {
            Some(store) => store.load_or_new(),
            None => FileIndex::new(),
        });

        let cache = Arc::new(if config.cache.enabled {
            CacheManager::new(
                config.cache.size_mb,
                Duration::from_secs(config.cache.query_ttl_secs),
            )
        } else {
            CacheManager::disabled()
        });

        let planner = QueryPlanner::new(
            Arc::clone(&index),
            Arc::clone(&cache),
            RankingConfig::default(),
            config.search.max_results,
        );

        info!(records = index.len(), "Application initialized");

        Ok(App {
            config,
            index,
            cache,
            planner,
            store,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Persist the current index, if a store is configured.
    pub fn save_index(&self) -> anyhow::Result<()> {
        if let Some(store) = &self.store {
            store.save(&self.index)?;
        }
        Ok(())
    }

    /// Build a walker bound to this app's index and stop flag.
    pub fn walker(&self) -> anyhow::Result<Walker> {
        Ok(Walker::new(
            self.config.clone(),
            Arc::clone(&self.index),
            Arc::clone(&self.stop),
        )?)
    }

    /// Enforce the advisory memory soft cap: when the index footprint
    /// exceeds it, shed the query-result cache first, then the path
    /// cache, then the record cache. The primary indexes are never shed.
    pub fn enforce_memory_cap(&self) {
        let cap_mb = self.config.storage.memory_cap_mb;
        if cap_mb == 0 {
            return;
        }
        let used_mb = (self.index.estimated_memory_use() / (1024 * 1024)) as u64;
        if used_mb <= cap_mb {
            return;
        }
        let over = used_mb - cap_mb;
        let level = if over > cap_mb / 2 {
            2
        } else if over > cap_mb / 4 {
            1
        } else {
            0
        };
        tracing::warn!(used_mb, cap_mb, level, "Memory soft cap exceeded, shedding caches");
        self.cache.shed(level);
    }

    /// Roots to scan: explicit drives from the command line, the
    /// configured whitelist, or empty for "every available drive".
    pub fn scan_roots(&self, cli_drives: &[String]) -> Vec<PathBuf> {
        if !cli_drives.is_empty() {
            cli_drives.iter().map(PathBuf::from).collect()
        } else {
            self.config
                .indexing
                .drives
                .iter()
                .map(PathBuf::from)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::{FileKind, FileRecord};

    fn app_without_persistence(memory_cap_mb: u64) -> App {
        let mut config = Config::default();
        config.storage.persist = false;
        config.storage.memory_cap_mb = memory_cap_mb;
        App::new(config).unwrap()
    }

    #[test]
    fn test_scan_roots_prefers_cli_drives() {
        let app = app_without_persistence(0);
        let roots = app.scan_roots(&["/data".to_string()]);
        assert_eq!(roots, vec![PathBuf::from("/data")]);
        assert!(app.scan_roots(&[]).is_empty());
    }

    #[test]
    fn test_memory_cap_sheds_caches() {
        let app = app_without_persistence(1);

        // Push the index footprint over the 1 MiB cap
        for i in 0..8_000 {
            app.index
                .add(
                    FileRecord::new(format!("/bulk/file_{:05}.dat", i), FileKind::File)
                        .with_size(1)
                        .with_times(1_700_000_000, 0),
                )
                .unwrap();
        }
        app.cache.put_results("fp".to_string(), Vec::new());
        assert_eq!(app.cache.stats().query_entries, 1);

        app.enforce_memory_cap();
        assert_eq!(app.cache.stats().query_entries, 0);
    }

    #[test]
    fn test_memory_cap_disabled_by_default() {
        let app = app_without_persistence(0);
        app.cache.put_results("fp".to_string(), Vec::new());
        app.enforce_memory_cap();
        assert_eq!(app.cache.stats().query_entries, 1);
    }
}
