use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Graphics device command failed: {0}")]
    DeviceCommand(String),

    #[error("Directory watch registration failed: {0}")]
    WatchRegistration(String),

    #[error("Widget capture failed: {0}")]
    WidgetCapture(String),

    #[error("Capture session already running for chunk: {0}")]
    SessionExists(String),

    #[error("Invalid artifact naming pattern: {0}")]
    Naming(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed console log: {0}")]
    MalformedLog(String),

    #[error(transparent)]
    Core(#[from] notebook_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn output_directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputDirectory {
            path: path.into(),
            source,
        }
    }

    pub fn device(reason: impl Into<String>) -> Self {
        Self::DeviceCommand(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
