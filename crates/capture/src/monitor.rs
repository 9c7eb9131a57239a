//! Image capture monitor
//!
//! Watches a chunk's output directory for images written by the
//! interpreter's raster device and announces each one on
//! `OutputEvents::image_ready`, in delivery order. When stopped it closes
//! the device, drains whatever the close flushed to disk, and announces
//! `image_capture_complete` exactly once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use events::OutputEvents;
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::engine::{GraphicsEngine, RasterDevice};
use crate::error::{CaptureError, Result};
use crate::naming::ArtifactNaming;
use crate::resources::WatchGuard;
use crate::watch::{
    DirectoryWatchService, FileChangeKind, FileEntry, WatchEvent, WatchFilter, WatchHandle,
    WatchSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    /// Device open, waiting for the watch service to answer
    Registering,
    Capturing,
    Draining,
    Stopped,
}

pub struct ImageCaptureMonitor {
    naming: ArtifactNaming,
    device: DeviceConfig,
    engine: Arc<dyn GraphicsEngine>,
    watcher: Arc<dyn DirectoryWatchService>,
    outputs: OutputEvents,
    dedupe_drain: bool,
    state: MonitorState,
    output_dir: Option<PathBuf>,
    registration: Option<WatchGuard>,
    stop_requested: bool,
    announced: HashSet<PathBuf>,
}

impl ImageCaptureMonitor {
    pub fn new(
        naming: ArtifactNaming,
        device: DeviceConfig,
        engine: Arc<dyn GraphicsEngine>,
        watcher: Arc<dyn DirectoryWatchService>,
        outputs: OutputEvents,
    ) -> Self {
        Self {
            naming,
            device,
            engine,
            watcher,
            outputs,
            dedupe_drain: true,
            state: MonitorState::Idle,
            output_dir: None,
            registration: None,
            stop_requested: false,
            announced: HashSet::new(),
        }
    }

    pub fn with_dedupe_drain(mut self, dedupe: bool) -> Self {
        self.dedupe_drain = dedupe;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn watch_handle(&self) -> Option<WatchHandle> {
        self.registration.as_ref().and_then(|g| g.handle())
    }

    /// Clean stale images out of `output_dir`, open the raster device on
    /// it and register the directory watch. Watch callbacks must be fed
    /// back through [`ImageCaptureMonitor::handle_watch_event`] via `sink`.
    ///
    /// Errors leave the monitor idle with no device open.
    pub async fn start(&mut self, output_dir: &Path, sink: WatchSink) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Err(CaptureError::device(format!(
                "image capture already started ({:?})",
                self.state
            )));
        }

        for stale in self.naming.list(output_dir)? {
            if let Err(e) = std::fs::remove_file(&stale) {
                warn!(path = %stale.display(), error = %e, "Failed to remove stale image");
            }
        }

        let device = RasterDevice::new(output_dir, &self.naming, &self.device);
        self.engine.open_raster_device(&device).await?;
        debug!(template = %device.file_template, "Raster device opened");

        self.output_dir = Some(output_dir.to_path_buf());
        self.state = MonitorState::Registering;

        let naming = self.naming.clone();
        let filter: WatchFilter = Arc::new(move |entry: &FileEntry| entry.is_dir || naming.matches(&entry.path));
        self.watcher.register(output_dir, true, filter, sink);

        Ok(())
    }

    pub async fn handle_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Registered { handle, listing } => {
                self.on_registered(handle, listing).await;
            }
            WatchEvent::RegistrationError(reason) => {
                error!(reason = %reason, "Image directory watch registration failed");
                if self.state == MonitorState::Registering {
                    self.drain().await;
                }
            }
            WatchEvent::FilesChanged(changes) => {
                if self.state != MonitorState::Capturing {
                    debug!(state = ?self.state, count = changes.len(), "Ignoring file changes");
                    return;
                }
                for change in changes {
                    if change.kind == FileChangeKind::Added && !change.entry.is_dir {
                        self.announce(&change.entry.path, false);
                    }
                }
            }
            WatchEvent::Unregistered(handle) => {
                debug!(watch = %handle, "Image directory watch unregistered");
            }
        }
    }

    async fn on_registered(&mut self, handle: WatchHandle, listing: Vec<FileEntry>) {
        let guard = WatchGuard::new(handle, Arc::clone(&self.watcher));
        if self.state != MonitorState::Registering {
            // Late answer to a registration we no longer want
            drop(guard);
            return;
        }
        self.registration = Some(guard);
        self.state = MonitorState::Capturing;

        // Images written between pre-clean and watch activation
        let mut found: Vec<PathBuf> = listing
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.path)
            .collect();
        found.sort();
        for path in &found {
            self.announce(path, false);
        }

        if self.stop_requested {
            self.stop().await;
        }
    }

    /// Stop capturing: release the watch, close the device, drain the
    /// directory and announce completion.
    pub async fn stop(&mut self) {
        match self.state {
            MonitorState::Registering => {
                debug!("Stop requested before watch registration completed");
                self.stop_requested = true;
            }
            MonitorState::Capturing => {
                if let Some(mut guard) = self.registration.take() {
                    guard.release();
                }
                self.drain().await;
            }
            MonitorState::Idle | MonitorState::Draining | MonitorState::Stopped => {}
        }
    }

    async fn drain(&mut self) {
        self.state = MonitorState::Draining;

        if let Err(e) = self.engine.close_device().await {
            warn!(error = %e, "Failed to close raster device");
        }

        if let Some(dir) = self.output_dir.clone() {
            match self.naming.list(&dir) {
                Ok(remaining) => {
                    for path in &remaining {
                        self.announce(path, true);
                    }
                }
                Err(e) => error!(dir = %dir.display(), error = %e, "Failed to list image directory"),
            }
        }

        self.state = MonitorState::Stopped;
        info!(images = self.announced.len(), "Image capture complete");
        self.outputs.image_capture_complete.emit(&());
    }

    /// While capturing each path is announced once, whether it came from
    /// the activation listing or a live event. `dedupe_drain` decides
    /// whether the drain may announce it again.
    fn announce(&mut self, path: &Path, draining: bool) {
        if !self.naming.matches(path) {
            return;
        }
        let first_time = self.announced.insert(path.to_path_buf());
        if !first_time && (!draining || self.dedupe_drain) {
            debug!(path = %path.display(), "Image already announced");
            return;
        }
        self.outputs.image_ready.emit(&path.to_path_buf());
    }
}
