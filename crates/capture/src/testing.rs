//! Deterministic fakes for the watch service and graphics engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::{GraphicsEngine, RasterDevice};
use crate::error::{CaptureError, Result};
use crate::watch::{
    list_filtered, DirectoryWatchService, FileChange, FileChangeKind, FileEntry, WatchEvent,
    WatchFilter, WatchHandle, WatchSink,
};

/// How [`FakeWatchService::register`] answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Deliver `Registered` from inside `register`
    Immediate,
    /// Hold the registration until `complete_pending` or `fail_pending`
    Deferred,
    /// Deliver `RegistrationError` from inside `register`
    Fail(String),
}

struct Registration {
    dir: PathBuf,
    recursive: bool,
    filter: WatchFilter,
    sink: WatchSink,
}

struct FakeState {
    mode: RegistrationMode,
    next_id: u64,
    register_calls: usize,
    active: HashMap<WatchHandle, Registration>,
    pending: Vec<Registration>,
    unregister_calls: HashMap<WatchHandle, usize>,
}

/// In-memory watch service; file events are injected by the test.
pub struct FakeWatchService {
    state: Mutex<FakeState>,
}

impl FakeWatchService {
    pub fn new() -> Self {
        Self::with_mode(RegistrationMode::Immediate)
    }

    pub fn with_mode(mode: RegistrationMode) -> Self {
        Self {
            state: Mutex::new(FakeState {
                mode,
                next_id: 0,
                register_calls: 0,
                active: HashMap::new(),
                pending: Vec::new(),
                unregister_calls: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Activate a registration whose events nobody listens to.
    pub fn register_detached(&self, dir: impl Into<PathBuf>) -> WatchHandle {
        let mut state = self.lock();
        state.next_id += 1;
        let handle = WatchHandle(state.next_id);
        state.active.insert(
            handle,
            Registration {
                dir: dir.into(),
                recursive: true,
                filter: Arc::new(|_: &FileEntry| true),
                sink: Arc::new(|_| {}),
            },
        );
        handle
    }

    /// Activate deferred registrations, listing their directories now.
    pub fn complete_pending(&self) -> usize {
        let pending: Vec<Registration> = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for registration in pending {
            self.activate(registration);
        }
        count
    }

    pub fn fail_pending(&self, reason: &str) -> usize {
        let pending: Vec<Registration> = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for registration in pending {
            (registration.sink)(WatchEvent::RegistrationError(reason.to_string()));
        }
        count
    }

    /// Report `path` as newly created to every registration watching it.
    pub fn file_added(&self, path: &Path) -> usize {
        let entry = FileEntry {
            path: path.to_path_buf(),
            is_dir: path.is_dir(),
        };
        let sinks: Vec<WatchSink> = self
            .lock()
            .active
            .values()
            .filter(|r| watches(r, path) && (r.filter)(&entry))
            .map(|r| r.sink.clone())
            .collect();

        for sink in &sinks {
            sink(WatchEvent::FilesChanged(vec![FileChange {
                kind: FileChangeKind::Added,
                entry: entry.clone(),
            }]));
        }
        sinks.len()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn register_calls(&self) -> usize {
        self.lock().register_calls
    }

    pub fn unregister_calls(&self, handle: WatchHandle) -> usize {
        self.lock().unregister_calls.get(&handle).copied().unwrap_or(0)
    }

    fn activate(&self, registration: Registration) {
        let listing = list_filtered(&registration.dir, registration.recursive, &registration.filter);
        let listing = match listing {
            Ok(listing) => listing,
            Err(e) => {
                (registration.sink)(WatchEvent::RegistrationError(e.to_string()));
                return;
            }
        };

        let sink = registration.sink.clone();
        let handle = {
            let mut state = self.lock();
            state.next_id += 1;
            let handle = WatchHandle(state.next_id);
            state.active.insert(handle, registration);
            handle
        };
        sink(WatchEvent::Registered { handle, listing });
    }
}

impl Default for FakeWatchService {
    fn default() -> Self {
        Self::new()
    }
}

fn watches(registration: &Registration, path: &Path) -> bool {
    if registration.recursive {
        path.starts_with(&registration.dir)
    } else {
        path.parent() == Some(registration.dir.as_path())
    }
}

impl DirectoryWatchService for FakeWatchService {
    fn register(&self, dir: &Path, recursive: bool, filter: WatchFilter, sink: WatchSink) {
        let registration = Registration {
            dir: dir.to_path_buf(),
            recursive,
            filter,
            sink,
        };

        let mode = {
            let mut state = self.lock();
            state.register_calls += 1;
            state.mode.clone()
        };

        match mode {
            RegistrationMode::Immediate => self.activate(registration),
            RegistrationMode::Deferred => self.lock().pending.push(registration),
            RegistrationMode::Fail(reason) => (registration.sink)(WatchEvent::RegistrationError(reason)),
        }
    }

    fn unregister(&self, handle: WatchHandle) {
        let removed = {
            let mut state = self.lock();
            *state.unregister_calls.entry(handle).or_insert(0) += 1;
            state.active.remove(&handle)
        };
        if let Some(registration) = removed {
            (registration.sink)(WatchEvent::Unregistered(handle));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Open(RasterDevice),
    Close,
}

/// Engine that records commands and can simulate device output.
#[derive(Default)]
pub struct RecordingEngine {
    commands: Mutex<Vec<EngineCommand>>,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    flush_on_close: Mutex<Vec<PathBuf>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Write `path` when the device is closed, like a device flushing
    /// its last page.
    pub fn flush_on_close(&self, path: impl Into<PathBuf>) {
        self.flush_on_close
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.into());
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn close_count(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, EngineCommand::Close))
            .count()
    }

    fn push(&self, command: EngineCommand) {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
    }
}

#[async_trait]
impl GraphicsEngine for RecordingEngine {
    async fn open_raster_device(&self, device: &RasterDevice) -> Result<()> {
        self.push(EngineCommand::Open(device.clone()));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::device("device could not be opened"));
        }
        Ok(())
    }

    async fn close_device(&self) -> Result<()> {
        self.push(EngineCommand::Close);
        let pending: Vec<PathBuf> =
            std::mem::take(&mut *self.flush_on_close.lock().unwrap_or_else(|e| e.into_inner()));
        for path in pending {
            std::fs::write(&path, b"png")?;
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(CaptureError::device("no device to close"));
        }
        Ok(())
    }
}
