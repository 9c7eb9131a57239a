//! [`DirectoryWatchService`] backed by the OS file notification APIs

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use super::{
    list_filtered, DirectoryWatchService, FileChange, FileChangeKind, FileEntry, WatchEvent,
    WatchFilter, WatchHandle, WatchSink,
};

struct ActiveWatch {
    // Dropping the watcher stops OS event delivery
    _watcher: RecommendedWatcher,
    sink: WatchSink,
}

#[derive(Default)]
pub struct NotifyWatchService {
    next_id: AtomicU64,
    active: Mutex<HashMap<WatchHandle, ActiveWatch>>,
}

impl NotifyWatchService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl DirectoryWatchService for NotifyWatchService {
    fn register(&self, dir: &Path, recursive: bool, filter: WatchFilter, sink: WatchSink) {
        let handle = WatchHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        let event_sink = sink.clone();
        let event_filter = filter.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let changes = translate(&event, &event_filter, REPORTS_CLOSE_WRITE);
                if !changes.is_empty() {
                    event_sink(WatchEvent::FilesChanged(changes));
                }
            }
            Err(e) => warn!(watch = %handle, error = %e, "File watch error"),
        });

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                sink(WatchEvent::RegistrationError(e.to_string()));
                return;
            }
        };

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        if let Err(e) = watcher.watch(dir, mode) {
            sink(WatchEvent::RegistrationError(format!("{}: {}", dir.display(), e)));
            return;
        }

        // Listed after the watch is live so nothing created in between is missed
        let listing = match list_filtered(dir, recursive, &filter) {
            Ok(listing) => listing,
            Err(e) => {
                sink(WatchEvent::RegistrationError(format!("{}: {}", dir.display(), e)));
                return;
            }
        };

        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                handle,
                ActiveWatch {
                    _watcher: watcher,
                    sink: sink.clone(),
                },
            );
        debug!(watch = %handle, dir = %dir.display(), "Directory watch registered");

        sink(WatchEvent::Registered { handle, listing });
    }

    fn unregister(&self, handle: WatchHandle) {
        let removed = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle);

        match removed {
            Some(ActiveWatch {
                _watcher: watcher,
                sink,
            }) => {
                drop(watcher);
                debug!(watch = %handle, "Directory watch unregistered");
                sink(WatchEvent::Unregistered(handle));
            }
            None => warn!(watch = %handle, "Unregister of unknown watch"),
        }
    }
}

/// inotify reports when a writer closes a file, so on those backends a new
/// file counts as added once the device has finished writing it. Other
/// backends only report creation.
const REPORTS_CLOSE_WRITE: bool = cfg!(any(target_os = "linux", target_os = "android"));

fn change_kind(kind: &EventKind, close_write: bool) -> Option<FileChangeKind> {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) if close_write => {
            Some(FileChangeKind::Added)
        }
        // Still being written; the close event follows
        EventKind::Create(CreateKind::File) if close_write => Some(FileChangeKind::Modified),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(FileChangeKind::Added)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            Some(FileChangeKind::Removed)
        }
        EventKind::Modify(_) => Some(FileChangeKind::Modified),
        _ => None,
    }
}

fn translate(event: &notify::Event, filter: &WatchFilter, close_write: bool) -> Vec<FileChange> {
    let Some(kind) = change_kind(&event.kind, close_write) else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .map(|path| FileEntry {
            path: path.clone(),
            is_dir: path.is_dir(),
        })
        .filter(|entry| filter(entry))
        .map(|entry| FileChange { kind, entry })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn png_filter() -> WatchFilter {
        Arc::new(|entry: &FileEntry| {
            entry.is_dir || entry.path.extension().is_some_and(|e| e == "png")
        })
    }

    #[tokio::test]
    async fn test_register_lists_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("old.png"), b"").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = NotifyWatchService::new();
        service.register(
            temp_dir.path(),
            true,
            png_filter(),
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        match rx.recv().await.unwrap() {
            WatchEvent::Registered { handle, listing } => {
                assert_eq!(listing, vec![FileEntry::file(temp_dir.path().join("old.png"))]);
                assert_eq!(service.active_count(), 1);

                service.unregister(handle);
                assert_eq!(service.active_count(), 0);
            }
            other => panic!("Expected Registered, got {other:?}"),
        }

        // Skip any change events that raced in before the Unregistered callback
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("should receive unregistered")
                .unwrap();
            if matches!(event, WatchEvent::Unregistered(_)) {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_register_missing_dir_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = NotifyWatchService::new();

        service.register(
            &temp_dir.path().join("missing"),
            true,
            png_filter(),
            Arc::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        assert!(matches!(rx.recv().await.unwrap(), WatchEvent::RegistrationError(_)));
        assert_eq!(service.active_count(), 0);
    }

    fn event(kind: EventKind) -> notify::Event {
        notify::Event::new(kind)
            .add_path("/out/plot.png".into())
            .add_path("/out/readme.md".into())
    }

    #[test]
    fn test_create_is_added_without_close_events() {
        let changes = translate(&event(EventKind::Create(CreateKind::File)), &png_filter(), false);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, FileChangeKind::Added);
        assert_eq!(changes[0].entry.path, Path::new("/out/plot.png"));
    }

    #[test]
    fn test_file_added_on_close_write_when_reported() {
        let created = translate(&event(EventKind::Create(CreateKind::File)), &png_filter(), true);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, FileChangeKind::Modified);

        let closed = translate(
            &event(EventKind::Access(AccessKind::Close(AccessMode::Write))),
            &png_filter(),
            true,
        );
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, FileChangeKind::Added);
    }

    #[test]
    fn test_rename_into_dir_is_added_immediately() {
        let renamed = EventKind::Modify(ModifyKind::Name(RenameMode::To));
        for close_write in [false, true] {
            let changes = translate(&event(renamed), &png_filter(), close_write);
            assert_eq!(changes[0].kind, FileChangeKind::Added);
        }
    }

    #[test]
    fn test_close_without_write_is_ignored() {
        let closed = EventKind::Access(AccessKind::Close(AccessMode::Read));
        assert!(translate(&event(closed), &png_filter(), true).is_empty());
        let closed = EventKind::Access(AccessKind::Close(AccessMode::Write));
        assert!(translate(&event(closed), &png_filter(), false).is_empty());
        assert!(translate(&event(EventKind::Access(AccessKind::Any)), &png_filter(), true).is_empty());
    }
}
