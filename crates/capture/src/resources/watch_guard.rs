//! RAII guard for a directory watch registration.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::watch::{DirectoryWatchService, WatchHandle};

/// Owns a live watch handle and unregisters it exactly once.
///
/// Call [`WatchGuard::release`] on the normal stop path. If the guard is
/// dropped while still holding the handle, it unregisters on drop so the
/// OS watch never outlives its session.
pub struct WatchGuard {
    handle: Option<WatchHandle>,
    service: Arc<dyn DirectoryWatchService>,
}

impl WatchGuard {
    pub fn new(handle: WatchHandle, service: Arc<dyn DirectoryWatchService>) -> Self {
        debug!(watch = %handle, "Watch guard created");
        Self {
            handle: Some(handle),
            service,
        }
    }

    pub fn handle(&self) -> Option<WatchHandle> {
        self.handle
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Unregister the watch. Returns false if it was already released.
    pub fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                debug!(watch = %handle, "Releasing directory watch");
                self.service.unregister(handle);
                true
            }
            None => false,
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle {
            warn!(watch = %handle, "Watch guard dropped while registered - unregistering");
            self.release();
        }
    }
}
