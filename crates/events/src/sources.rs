//! Event source groups consumed by a chunk session

use std::path::PathBuf;

use notebook_core::ConsoleOutputKind;

use crate::source::EventSource;

/// Text written to the console by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub kind: ConsoleOutputKind,
    pub text: String,
}

impl ConsoleOutput {
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            kind: ConsoleOutputKind::Normal,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ConsoleOutputKind::Error,
            text: text.into(),
        }
    }
}

/// Console lifecycle signals of one interpreter.
#[derive(Debug, Clone)]
pub struct ConsoleEvents {
    /// The console is ready for input again; carries the prompt text.
    pub prompt: EventSource<String>,
    pub output: EventSource<ConsoleOutput>,
    /// Input echoed back to the console.
    pub input: EventSource<String>,
}

impl ConsoleEvents {
    pub fn new() -> Self {
        Self {
            prompt: EventSource::new("console.prompt"),
            output: EventSource::new("console.output"),
            input: EventSource::new("console.input"),
        }
    }
}

impl Default for ConsoleEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Artifact signals produced while a single chunk runs.
#[derive(Debug, Clone)]
pub struct OutputEvents {
    pub image_ready: EventSource<PathBuf>,
    /// The graphics device was closed and its output directory drained.
    pub image_capture_complete: EventSource<()>,
    pub widget_ready: EventSource<PathBuf>,
}

impl OutputEvents {
    pub fn new() -> Self {
        Self {
            image_ready: EventSource::new("output.image_ready"),
            image_capture_complete: EventSource::new("output.image_capture_complete"),
            widget_ready: EventSource::new("output.widget_ready"),
        }
    }
}

impl Default for OutputEvents {
    fn default() -> Self {
        Self::new()
    }
}
