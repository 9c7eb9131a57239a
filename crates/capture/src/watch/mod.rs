//! Directory watch capability
//!
//! The image capture monitor only sees this interface, so tests can
//! drive it with a deterministic fake instead of the real filesystem.

mod notify_service;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use notify_service::NotifyWatchService;

/// Live registration of a directory watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FileEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: FileChangeKind,
    pub entry: FileEntry,
}

/// Callbacks of a watch registration, delivered through a [`WatchSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watch is active; `listing` holds the filtered directory contents
    /// at activation time.
    Registered {
        handle: WatchHandle,
        listing: Vec<FileEntry>,
    },
    RegistrationError(String),
    FilesChanged(Vec<FileChange>),
    Unregistered(WatchHandle),
}

/// Receives every event of one registration.
pub type WatchSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Decides which entries a registration reports.
pub type WatchFilter = Arc<dyn Fn(&FileEntry) -> bool + Send + Sync>;

pub trait DirectoryWatchService: Send + Sync {
    /// Start watching `dir`. The outcome arrives on `sink` as either
    /// `Registered` or `RegistrationError`.
    fn register(&self, dir: &Path, recursive: bool, filter: WatchFilter, sink: WatchSink);

    /// Stop a registration. `Unregistered` is delivered on its sink.
    fn unregister(&self, handle: WatchHandle);
}

/// Filtered listing of `dir`, walked iteratively when `recursive`.
pub fn list_filtered(dir: &Path, recursive: bool, filter: &WatchFilter) -> std::io::Result<Vec<FileEntry>> {
    let mut listing = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file = FileEntry {
                path: entry.path(),
                is_dir: entry.file_type()?.is_dir(),
            };
            if !filter(&file) {
                continue;
            }
            if file.is_dir && recursive {
                pending.push(file.path.clone());
            }
            listing.push(file);
        }
    }

    listing.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(listing)
}
