//! Configuration management for loupe.
//!
//! Configuration is stored in TOML format in a platform-appropriate
//! location. All sections have sensible defaults so a missing file or a
//! partially filled one is always usable.

use crate::error::{LoupeError, Result};
use crate::types::SearchMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for loupe.
///
/// ## Example Configuration File (loupe.toml)
///
/// ```toml
/// [indexing]
/// drives = ["C:/", "D:/"]
/// exclude_paths = ["C:/Windows/Temp"]
/// exclude_extensions = ["tmp", "bak"]
/// index_hidden = false
/// threads = 8
///
/// [search]
/// default_mode = "fuzzy"
/// max_results = 1000
/// fuzzy_threshold = 0.6
///
/// [cache]
/// enabled = true
/// size_mb = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Indexing settings: what to scan and with how many workers
    pub indexing: IndexingConfig,

    /// Search defaults
    pub search: SearchConfig,

    /// Filesystem watching
    pub watcher: WatcherConfig,

    /// Cache sizing and TTLs
    pub cache: CacheConfig,

    /// Memory and persistence
    pub storage: StorageConfig,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Drive roots to index (empty = all available drives)
    pub drives: Vec<String>,

    /// Path prefixes excluded from indexing
    pub exclude_paths: Vec<String>,

    /// File extensions excluded from indexing (without the dot)
    pub exclude_extensions: Vec<String>,

    /// Index hidden files and directories
    pub index_hidden: bool,

    /// Index system files and directories
    pub index_system: bool,

    /// Worker thread count (0 = max(2, hardware concurrency))
    pub threads: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        IndexingConfig {
            drives: Vec::new(),
            exclude_paths: Vec::new(),
            exclude_extensions: Vec::new(),
            index_hidden: false,
            index_system: false,
            threads: 0,
        }
    }
}

impl IndexingConfig {
    /// Effective worker count
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .max(2)
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Mode used when the caller does not specify one
    pub default_mode: SearchMode,

    /// Hard cap on returned results
    pub max_results: usize,

    /// Enable fuzzy matching
    pub fuzzy_enabled: bool,

    /// Minimum fuzzy similarity in [0, 1]
    pub fuzzy_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            default_mode: SearchMode::Fuzzy,
            max_results: 1000,
            fuzzy_enabled: true,
            fuzzy_threshold: 0.6,
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Watch for filesystem changes after indexing
    pub enabled: bool,

    /// Coalescing window in milliseconds
    pub coalesce_window_ms: u64,

    /// Bounded event queue capacity
    pub queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            enabled: true,
            coalesce_window_ms: 100,
            queue_capacity: 16_384,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the record/query/path caches
    pub enabled: bool,

    /// Total cache budget in MiB, distributed across the three caches
    pub size_mb: u64,

    /// Query-result TTL in seconds
    pub query_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            size_mb: 100,
            query_ttl_secs: 300,
        }
    }
}

/// Memory cap and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Advisory memory soft cap in MiB (0 = no cap)
    pub memory_cap_mb: u64,

    /// Persist the index to disk for warm starts
    pub persist: bool,

    /// Store location (None = default data directory)
    pub store_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            memory_cap_mb: 0,
            persist: true,
            store_path: None,
        }
    }
}

/// Directory names that are never descended into.
const EXCLUDED_DIR_NAMES: &[&str] = &[
    "$recycle.bin",
    "recycler",
    "system volume information",
    ".trash",
    ".trashes",
];

/// System roots skipped when system indexing is off.
const SYSTEM_DIR_NAMES: &[&str] = &[
    "windows",
    "program files",
    "program files (x86)",
    "programdata",
];

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| LoupeError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| LoupeError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Render the resolved configuration as TOML.
    pub fn render(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoupeError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "loupe").ok_or_else(|| LoupeError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("loupe.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "loupe").ok_or_else(|| LoupeError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Directory for the warm-start store (from config or default).
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage.store_path {
            Ok(path.clone())
        } else {
            Self::default_data_dir()
        }
    }

    /// Check if a path falls under a configured exclusion prefix.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        let path_lower = crate::types::fold_path_key(path);
        self.indexing
            .exclude_paths
            .iter()
            .any(|excluded| path_lower.starts_with(&crate::types::fold_path_key(excluded)))
    }

    /// Check if an extension (without the dot, any case) is excluded.
    pub fn is_extension_excluded(&self, extension: &str) -> bool {
        self.indexing
            .exclude_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Check whether a directory should be descended into.
    ///
    /// `hidden` and `system` reflect the entry's attributes as observed by
    /// the walker.
    pub fn should_descend(&self, dir_name: &str, hidden: bool, system: bool) -> bool {
        let lower = dir_name.to_lowercase();
        if EXCLUDED_DIR_NAMES.contains(&lower.as_str()) {
            return false;
        }
        if !self.indexing.index_system && SYSTEM_DIR_NAMES.contains(&lower.as_str()) {
            return false;
        }
        if hidden && !self.indexing.index_hidden {
            return false;
        }
        if system && !self.indexing.index_system {
            return false;
        }
        true
    }

    /// Check if a drive root should be indexed.
    pub fn should_index_drive(&self, mount_point: &str) -> bool {
        if self.indexing.drives.is_empty() {
            return true;
        }
        let folded = crate::types::fold_path_key(mount_point);
        self.indexing
            .drives
            .iter()
            .any(|d| crate::types::fold_path_key(d) == folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.max_results, 1000);
        assert!(config.search.fuzzy_enabled);
        assert_eq!(config.watcher.coalesce_window_ms, 100);
        assert!(config.indexing.effective_threads() >= 2);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let mut config = Config::default();
        config.search.max_results = 5000;
        config.indexing.exclude_paths = vec!["/var/tmp".to_string()];

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.search.max_results, 5000);
        assert_eq!(loaded.indexing.exclude_paths, vec!["/var/tmp".to_string()]);
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search.max_results, 1000);
    }

    #[test]
    fn test_path_exclusion() {
        let mut config = Config::default();
        config.indexing.exclude_paths = vec!["C:\\Windows\\Temp".to_string()];

        assert!(config.is_path_excluded("C:/Windows/Temp/file.txt"));
        assert!(config.is_path_excluded("c:/windows/temp/subdir"));
        assert!(!config.is_path_excluded("C:/Users/file.txt"));
    }

    #[test]
    fn test_extension_exclusion() {
        let mut config = Config::default();
        config.indexing.exclude_extensions = vec!["tmp".to_string(), "bak".to_string()];

        assert!(config.is_extension_excluded("tmp"));
        assert!(config.is_extension_excluded("TMP"));
        assert!(!config.is_extension_excluded("txt"));
    }

    #[test]
    fn test_should_descend() {
        let config = Config::default();
        assert!(!config.should_descend("$RECYCLE.BIN", false, false));
        assert!(!config.should_descend("System Volume Information", false, false));
        assert!(!config.should_descend("Windows", false, false));
        assert!(!config.should_descend("secrets", true, false));
        assert!(config.should_descend("Documents", false, false));

        let mut permissive = Config::default();
        permissive.indexing.index_hidden = true;
        permissive.indexing.index_system = true;
        assert!(permissive.should_descend("Windows", false, false));
        assert!(permissive.should_descend("secrets", true, false));
    }

    #[test]
    fn test_should_index_drive() {
        let mut config = Config::default();
        assert!(config.should_index_drive("C:/"));

        config.indexing.drives = vec!["C:/".to_string()];
        assert!(config.should_index_drive("c:/"));
        assert!(!config.should_index_drive("D:/"));
    }
}
