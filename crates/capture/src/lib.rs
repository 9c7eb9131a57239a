//! Output capture for notebook chunk execution
//!
//! A [`ChunkExecContext`] listens to an interpreter console while one
//! chunk runs, records console text, moves plots and widgets into the
//! chunk cache under sequential ordinals and announces completion once
//! both the console and the graphics device have finished.

pub mod cache;
pub mod completion;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod naming;
pub mod recorder;
pub mod resources;
pub mod watch;
pub mod widgets;
pub mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::{CachedOutput, ChunkCache, LIB_DIR};
pub use completion::{CompletionState, FinishSignal};
pub use config::{CaptureConfig, DeviceConfig, NamingConfig, CONFIG_FILE};
pub use context::{CancelHandle, CaptureServices, ChunkExecContext};
pub use engine::{DetachedEngine, GraphicsEngine, RasterDevice};
pub use error::{CaptureError, Result};
pub use manager::ChunkExecManager;
pub use monitor::{ImageCaptureMonitor, MonitorState};
pub use naming::ArtifactNaming;
pub use recorder::{ConsoleRecord, ConsoleRecorder};
pub use watch::{DirectoryWatchService, NotifyWatchService, WatchEvent, WatchHandle};
pub use widgets::{NoWidgetCapture, WidgetCapture};
pub use writer::{ArtifactWriter, WrittenArtifact};
