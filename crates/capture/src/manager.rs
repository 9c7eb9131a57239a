//! Live chunk sessions, at most one per chunk

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use events::{ConsoleEvents, NotificationBus};
use notebook_core::ChunkKey;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::context::{CancelHandle, CaptureServices, ChunkExecContext};
use crate::error::{CaptureError, Result};

enum Slot {
    Connecting,
    Running(CancelHandle),
}

type Sessions = Arc<RwLock<HashMap<ChunkKey, Slot>>>;

fn lock_write(sessions: &Sessions) -> std::sync::RwLockWriteGuard<'_, HashMap<ChunkKey, Slot>> {
    sessions.write().unwrap_or_else(|e| e.into_inner())
}

/// Starts chunk sessions against one interpreter console.
#[derive(Clone)]
pub struct ChunkExecManager {
    config: Arc<CaptureConfig>,
    console: ConsoleEvents,
    services: CaptureServices,
    sessions: Sessions,
}

impl ChunkExecManager {
    pub fn new(config: CaptureConfig, console: ConsoleEvents, services: CaptureServices) -> Self {
        Self {
            config: Arc::new(config),
            console,
            services,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn console(&self) -> &ConsoleEvents {
        &self.console
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.services.bus
    }

    /// Connect a session for `key` and run it in the background.
    ///
    /// The returned task ends once the session announces completion.
    /// Fails with [`CaptureError::SessionExists`] while another session
    /// for the same chunk is live, and with the connect error when the
    /// chunk's output directory cannot be created.
    pub async fn start(&self, key: ChunkKey) -> Result<JoinHandle<()>> {
        {
            let mut sessions = lock_write(&self.sessions);
            if sessions.contains_key(&key) {
                return Err(CaptureError::SessionExists(key.to_string()));
            }
            sessions.insert(key.clone(), Slot::Connecting);
        }

        let mut context = match ChunkExecContext::new(
            key.clone(),
            &self.config,
            self.console.clone(),
            self.services.clone(),
        ) {
            Ok(context) => context,
            Err(e) => {
                lock_write(&self.sessions).remove(&key);
                return Err(e);
            }
        };

        if let Err(e) = context.connect().await {
            lock_write(&self.sessions).remove(&key);
            return Err(e);
        }

        lock_write(&self.sessions).insert(key.clone(), Slot::Running(context.cancel_handle()));

        let sessions = Arc::clone(&self.sessions);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            context.run().await;
            lock_write(&sessions).remove(&task_key);
            debug!(chunk = %task_key, "Chunk session removed");
        });

        info!(chunk = %key, "Chunk session started");
        Ok(handle)
    }

    /// Ask a live session to finish without waiting for the next prompt.
    ///
    /// The session closes its device, drains pending images and announces
    /// completion before it is removed.
    pub fn cancel(&self, key: &ChunkKey) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        match sessions.get(key) {
            Some(Slot::Running(handle)) => {
                info!(chunk = %key, "Cancelling chunk session");
                handle.cancel()
            }
            Some(Slot::Connecting) | None => false,
        }
    }

    pub fn is_running(&self, key: &ChunkKey) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
