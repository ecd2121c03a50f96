//! Filesystem metadata glue shared by the walker and the mutator.

use crate::types::{FileKind, FileRecord};
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Windows attribute bits we care about.
pub const ATTR_HIDDEN: u32 = 0x2;
pub const ATTR_SYSTEM: u32 = 0x4;

/// Build a record from a path and its (symlink) metadata. Parent and
/// drive ids are left unset; the caller wires them in.
pub fn record_from_metadata(path: &Path, metadata: &Metadata) -> FileRecord {
    let kind = kind_of(metadata);
    let size = if kind.is_directory() { 0 } else { metadata.len() };
    let mtime = system_time_secs(metadata.modified().ok());
    // Platforms without a usable atime report the mtime instead
    let atime = match system_time_secs(metadata.accessed().ok()) {
        0 => mtime,
        t => t,
    };

    FileRecord::new(path.to_string_lossy().into_owned(), kind)
        .with_size(size)
        .with_times(mtime, atime)
        .with_attributes(platform_attributes(metadata))
}

fn kind_of(metadata: &Metadata) -> FileKind {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_file() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if metadata.nlink() > 1 {
                return FileKind::Hardlink;
            }
        }
        FileKind::File
    } else {
        FileKind::Unknown
    }
}

fn system_time_secs(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn platform_attributes(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(windows)]
fn platform_attributes(metadata: &Metadata) -> u32 {
    use std::os::windows::fs::MetadataExt;
    metadata.file_attributes()
}

#[cfg(not(any(unix, windows)))]
fn platform_attributes(_metadata: &Metadata) -> u32 {
    0
}

/// Whether an entry is hidden: dot-prefixed on unix, attribute bit on
/// Windows.
pub fn is_hidden(name: &str, attributes: u32) -> bool {
    if cfg!(windows) {
        attributes & ATTR_HIDDEN != 0
    } else {
        name.starts_with('.')
    }
}

/// Whether an entry carries the system attribute (Windows only).
pub fn is_system(attributes: u32) -> bool {
    cfg!(windows) && attributes & ATTR_SYSTEM != 0
}
