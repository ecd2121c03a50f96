//! Error types for loupe core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code can use `anyhow` for
//! convenient error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using LoupeError
pub type Result<T> = std::result::Result<T, LoupeError>;

/// Core error types for loupe operations.
///
/// These errors represent specific failure modes that callers may want to
/// handle differently (e.g., triggering a rescan after a watcher overflow,
/// or switching from `add` to `update` on a duplicate path).
#[derive(Error, Debug)]
pub enum LoupeError {
    // === Index Errors ===
    /// Neither the id nor the path is present in the index
    #[error("not found: {what}")]
    NotFound { what: String },

    /// `add` was called for a path that is already bound to a record
    #[error("path already indexed: {path}")]
    DuplicatePath { path: String },

    /// A path component exceeds the platform limit
    #[error("path component too long: {path}")]
    PathTooLong { path: String },

    /// Internal consistency failure detected by validation; fatal
    #[error("index invariant violated: {reason}")]
    InvariantViolation { reason: String },

    // === Search Errors ===
    /// Invalid search pattern (e.g., bad regex)
    #[error("invalid search pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // === Filesystem Errors ===
    /// Permission denied when accessing the filesystem
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// The platform notification buffer overflowed; the root needs a rescan
    #[error("watcher overflow on {root}: {reason}")]
    WatcherOverflow { root: String, reason: String },

    /// Watching is not available on this platform or for this root
    #[error("watcher unavailable: {reason}")]
    WatcherUnavailable { reason: String },

    // === Store Errors ===
    /// The warm-start store file is missing
    #[error("store not found at {path}")]
    StoreNotFound { path: PathBuf },

    /// The store file exists but is corrupted or unreadable
    #[error("store is corrupted: {reason}")]
    StoreCorrupted { reason: String },

    /// The store format version doesn't match the current version
    #[error("store version mismatch: found {found}, expected {expected}")]
    StoreVersionMismatch { found: u32, expected: u32 },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LoupeError {
    /// Returns true if this error should trigger a rescan of a root
    pub fn requires_rescan(&self) -> bool {
        matches!(
            self,
            LoupeError::WatcherOverflow { .. }
                | LoupeError::StoreCorrupted { .. }
                | LoupeError::StoreVersionMismatch { .. }
        )
    }

    /// Returns true if this error is fatal and must be propagated upward
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoupeError::InvariantViolation { .. })
    }

    /// Create a not-found error for an id
    pub fn id_not_found(id: u64) -> Self {
        LoupeError::NotFound {
            what: format!("file id {}", id),
        }
    }

    /// Create a not-found error for a path
    pub fn path_not_found(path: impl Into<String>) -> Self {
        LoupeError::NotFound {
            what: format!("path {}", path.into()),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        LoupeError::Serialization(reason.into())
    }
}

impl From<bincode::Error> for LoupeError {
    fn from(err: bincode::Error) -> Self {
        LoupeError::Serialization(err.to_string())
    }
}
