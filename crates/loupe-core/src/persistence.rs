//! Warm-start persistence for the index.
//!
//! The on-disk store is a cold-start cache only: correctness never depends
//! on it, and a corrupt or missing file simply means a fresh scan. The
//! format is designed for:
//!
//! - Fast loading: binary format with optional compression
//! - Versioning: format changes are detected and handled
//! - Atomic writes: write to temp, then rename
//! - Integrity: a CRC32 over the payload
//!
//! ## Store File Format
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "LUPE" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression, etc.
//!   - Record count: u64 (8 bytes)
//!   - Reserved: 12 bytes
//!
//! [Payload: variable]
//!   - Optionally lz4-compressed bincode of the stored index
//!
//! [Footer: 8 bytes]
//!   - CRC32 checksum: u32
//!   - Magic: "EPUL" (4 bytes)
//! ```

use crate::error::{LoupeError, Result};
use crate::index::FileIndex;
use crate::types::{DriveInfo, FileRecord, IndexStatistics};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes at the start of store files
const MAGIC_HEADER: &[u8; 4] = b"LUPE";
/// Magic bytes at the end of store files (reversed)
const MAGIC_FOOTER: &[u8; 4] = b"EPUL";
/// Current store format version
pub const STORE_VERSION: u32 = 1;

/// Flags for the store file format
#[derive(Debug, Clone, Copy)]
struct StoreFlags(u32);

impl StoreFlags {
    const NONE: Self = StoreFlags(0);
    const COMPRESSED_LZ4: Self = StoreFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    record_count: u64,
    reserved: [u8; 12],
}

impl StoreHeader {
    fn new(record_count: u64, flags: StoreFlags) -> Self {
        StoreHeader {
            magic: *MAGIC_HEADER,
            version: STORE_VERSION,
            flags: flags.0,
            record_count,
            reserved: [0; 12],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC_HEADER {
            return Err(LoupeError::StoreCorrupted {
                reason: "invalid magic bytes in header".to_string(),
            });
        }
        if self.version != STORE_VERSION {
            return Err(LoupeError::StoreVersionMismatch {
                found: self.version,
                expected: STORE_VERSION,
            });
        }
        Ok(())
    }
}

/// The serialized index payload.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    stats: IndexStatistics,
    drives: Vec<DriveInfo>,
    records: Vec<FileRecord>,
}

/// Manages persistence of the index to disk.
pub struct IndexStore {
    /// Base directory for store files
    base_dir: PathBuf,

    /// Whether to compress the payload
    use_compression: bool,
}

impl IndexStore {
    /// Create a store rooted at `base_dir`. The directory is created on
    /// the first save.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        IndexStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            use_compression: true,
        }
    }

    /// Set whether to compress when saving.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Path to the main store file.
    pub fn store_path(&self) -> PathBuf {
        self.base_dir.join("loupe.idx")
    }

    fn backup_path(&self) -> PathBuf {
        self.base_dir.join("loupe.idx.bak")
    }

    fn temp_path(&self) -> PathBuf {
        self.base_dir.join("loupe.idx.tmp")
    }

    pub fn exists(&self) -> bool {
        self.store_path().exists()
    }

    /// Save the index. Writes to a temp file and renames, backing up the
    /// previous store.
    pub fn save(&self, index: &FileIndex) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;

        let records = index.all_records();
        let record_count = records.len() as u64;

        info!(
            path = %self.store_path().display(),
            records = record_count,
            "Saving index store"
        );

        let stored = StoredIndex {
            stats: index.stats(),
            drives: index.drives(),
            records,
        };

        let flags = if self.use_compression {
            StoreFlags::COMPRESSED_LZ4
        } else {
            StoreFlags::NONE
        };

        let data = bincode::serialize(&stored)?;
        let payload = if self.use_compression {
            lz4_flex::compress_prepend_size(&data)
        } else {
            data
        };
        let checksum = crc32(&payload);

        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);

            let header = StoreHeader::new(record_count, flags);
            writer.write_all(&bincode::serialize(&header)?)?;
            writer.write_all(&payload)?;
            writer.write_all(&checksum.to_le_bytes())?;
            writer.write_all(MAGIC_FOOTER)?;
            writer.flush()?;
        }

        let store_path = self.store_path();
        let backup_path = self.backup_path();
        if store_path.exists() {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::rename(&store_path, &backup_path);
        }
        fs::rename(&temp_path, &store_path)?;

        debug!(
            bytes = payload.len(),
            compressed = self.use_compression,
            "Index store saved"
        );
        Ok(())
    }

    /// Load a fresh index from the store. Record and drive ids survive
    /// the round trip.
    pub fn load(&self) -> Result<FileIndex> {
        let store_path = self.store_path();
        if !store_path.exists() {
            return Err(LoupeError::StoreNotFound { path: store_path });
        }

        info!(path = %store_path.display(), "Loading index store");

        let file = File::open(&store_path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < 40 {
            return Err(LoupeError::StoreCorrupted {
                reason: "file too short".to_string(),
            });
        }
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; 32];
        reader.read_exact(&mut header_bytes)?;
        let header: StoreHeader = bincode::deserialize(&header_bytes)?;
        header.validate()?;

        let flags = StoreFlags(header.flags);

        let payload_len = file_len - 32 - 8;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        let mut footer = [0u8; 8];
        reader.read_exact(&mut footer)?;
        let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        if &footer[4..8] != MAGIC_FOOTER {
            return Err(LoupeError::StoreCorrupted {
                reason: "invalid footer magic bytes".to_string(),
            });
        }

        let computed = crc32(&payload);
        if stored_checksum != computed {
            return Err(LoupeError::StoreCorrupted {
                reason: format!(
                    "checksum mismatch: expected {:08x}, got {:08x}",
                    stored_checksum, computed
                ),
            });
        }

        let decompressed = if flags.is_compressed() {
            lz4_flex::decompress_size_prepended(&payload).map_err(|e| {
                LoupeError::StoreCorrupted {
                    reason: format!("decompression failed: {}", e),
                }
            })?
        } else {
            payload
        };

        let stored: StoredIndex =
            bincode::deserialize(&decompressed).map_err(|e| LoupeError::StoreCorrupted {
                reason: format!("deserialization failed: {}", e),
            })?;

        let index = FileIndex::new();
        let restored = index.restore(stored.records, stored.drives);
        info!(records = restored, "Index store loaded");
        Ok(index)
    }

    /// Load the index, or return a new empty one if loading fails.
    pub fn load_or_new(&self) -> FileIndex {
        match self.load() {
            Ok(index) => index,
            Err(e) => {
                if !matches!(e, LoupeError::StoreNotFound { .. }) {
                    warn!(error = %e, "Failed to load index store, starting fresh");
                }
                FileIndex::new()
            }
        }
    }

    /// Delete the store and its backup.
    pub fn clear(&self) -> Result<()> {
        for path in [self.store_path(), self.backup_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// CRC-32/ISO-HDLC over the payload.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;

    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileKind, FileRecord};
    use tempfile::TempDir;

    fn populated_index() -> FileIndex {
        let index = FileIndex::new();
        let drive = index.register_drive("/");
        index
            .add(
                FileRecord::new("/data/file1.txt", FileKind::File)
                    .with_size(100)
                    .with_times(1_700_000_000, 0)
                    .with_drive(drive.id),
            )
            .unwrap();
        index
            .add(
                FileRecord::new("/data/file2.rs", FileKind::File)
                    .with_size(200)
                    .with_times(1_700_000_100, 0)
                    .with_drive(drive.id),
            )
            .unwrap();
        index
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        let index = populated_index();

        store.save(&index).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.drives().len(), 1);

        // Ids survive the round trip
        let original = index.get_by_path("/data/file1.txt").unwrap();
        let restored = loaded.get_by_path("/data/file1.txt").unwrap();
        assert_eq!(original.id, restored.id);
        assert_eq!(original.size, restored.size);
        assert!(loaded.validate().is_empty());
    }

    #[test]
    fn test_save_and_load_uncompressed() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path()).with_compression(false);
        let index = populated_index();

        store.save(&index).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), index.len());
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        assert!(matches!(
            store.load(),
            Err(LoupeError::StoreNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_new_on_missing_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        assert!(store.load_or_new().is_empty());
    }

    #[test]
    fn test_corrupted_store_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("loupe.idx"), b"not a valid store").unwrap();

        let store = IndexStore::new(temp_dir.path());
        assert!(store.load().is_err());
        // load_or_new falls back to an empty index
        assert!(store.load_or_new().is_empty());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        store.save(&populated_index()).unwrap();

        let path = store.store_path();
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn test_save_keeps_backup() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        store.save(&populated_index()).unwrap();
        store.save(&populated_index()).unwrap();

        assert!(store.store_path().exists());
        assert!(temp_dir.path().join("loupe.idx.bak").exists());
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path());
        store.save(&populated_index()).unwrap();
        assert!(store.exists());

        store.clear().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"Hello, World!"), 0xEC4AC3D0);
    }
}
