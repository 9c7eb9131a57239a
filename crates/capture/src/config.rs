use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Default location of the config file, relative to the working directory
pub const CONFIG_FILE: &str = ".notebook-capture/config.toml";

const DEFAULT_CACHE_ROOT: &str = ".notebook-cache";

/// Raster device the interpreter renders chunk images with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub width: f64,
    pub height: f64,
    /// Units of `width` and `height` ("in", "cm", "px")
    pub units: String,
    /// Resolution in dots per inch
    pub resolution: u32,
    /// Rendering backend passed to the device (e.g. "cairo-png")
    pub backend: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            width: 7.0,
            height: 7.0,
            units: "in".to_string(),
            resolution: 96,
            backend: "cairo-png".to_string(),
        }
    }
}

/// File naming convention of the images the device writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub prefix: String,
    pub extension: String,
    /// Zero-padded width of the sequence number
    pub sequence_width: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "_rs_chunk_plot_".to_string(),
            extension: "png".to_string(),
            sequence_width: 3,
        }
    }
}

/// Settings for chunk output capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Root of the per-document output cache
    pub cache_root: PathBuf,
    /// Reported with every completion notification
    pub context_id: String,
    /// Skip images the drain scan finds that were already announced
    pub dedupe_drain: bool,
    pub device: DeviceConfig,
    pub naming: NamingConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            context_id: uuid::Uuid::new_v4().to_string(),
            dedupe_drain: true,
            device: DeviceConfig::default(),
            naming: NamingConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Read config from `path`, falling back to defaults when it is
    /// missing or unreadable.
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write config to `path`, creating parent directories.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        debug!(path = %path.display(), "Config saved successfully");

        Ok(())
    }
}
