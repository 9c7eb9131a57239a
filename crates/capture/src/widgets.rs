//! Hook for the widget renderer

use std::path::{Path, PathBuf};

use events::EventSource;

use crate::error::Result;

/// Starts widget capture for a chunk.
///
/// The renderer writes each rendered widget (and an optional sibling
/// `lib` folder of dependencies) into `output_dir`, then emits the
/// widget's path on `widget_ready`.
pub trait WidgetCapture: Send + Sync {
    fn begin(&self, output_dir: &Path, shared_lib_dir: &Path, widget_ready: EventSource<PathBuf>) -> Result<()>;
}

/// For hosts without a widget renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWidgetCapture;

impl WidgetCapture for NoWidgetCapture {
    fn begin(&self, _output_dir: &Path, _shared_lib_dir: &Path, _widget_ready: EventSource<PathBuf>) -> Result<()> {
        Ok(())
    }
}
