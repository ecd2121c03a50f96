//! # loupe core library
//!
//! Core indexing and search engine for loupe, a desktop filename search
//! tool. The crate is organized around four subsystems:
//!
//! - **Index** (`index`): the authoritative record store plus secondary
//!   indexes (name trie, inverted token index, extension/size/date maps,
//!   hierarchy, Bloom pre-filter), all behind one readers-writer lock
//! - **Search** (`search`): exact / wildcard / regex / fuzzy matching with
//!   weighted ranking, a query planner and a result cache
//! - **Walker** (`walker`): parallel two-phase directory scanning with
//!   user-directories-first prioritization
//! - **Change pipeline** (`watch`, `coalesce`, `mutator`, `pipeline`):
//!   filesystem notifications, coalesced into windows and applied to the
//!   index incrementally
//!
//! ## Example
//!
//! ```rust,no_run
//! use loupe_core::{FileIndex, CacheManager, QueryPlanner, SearchQuery};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let index = Arc::new(FileIndex::new());
//! let cache = Arc::new(CacheManager::new(100, Duration::from_secs(300)));
//! let planner = QueryPlanner::new(
//!     Arc::clone(&index),
//!     cache,
//!     Default::default(),
//!     1000,
//! );
//!
//! let outcome = planner.search(&SearchQuery::fuzzy("repor", 0.6)).unwrap();
//! for hit in outcome.hits.iter().take(10) {
//!     println!("{:.3}  {}", hit.score, hit.record.full_path);
//! }
//! ```

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod index;
pub mod mutator;
pub mod persistence;
pub mod pipeline;
pub mod search;
pub mod types;
pub mod walker;
pub mod watch;

// Re-export commonly used types
pub use cache::{CacheManager, CacheStats};
pub use coalesce::EventCoalescer;
pub use config::Config;
pub use error::{LoupeError, Result};
pub use index::FileIndex;
pub use mutator::Mutator;
pub use persistence::IndexStore;
pub use pipeline::ChangePipeline;
pub use search::{QueryPlanner, SearchOutcome, SearchQuery, SearchStats};
pub use types::{
    DriveInfo, FileKind, FileRecord, IndexStatistics, RankingConfig, SearchHit, SearchMode,
    SortOrder,
};
pub use walker::Walker;
pub use watch::{ChangeEvent, ChangeKind, FsWatcher, WatcherMessage};
