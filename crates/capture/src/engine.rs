//! Commands issued to the embedded interpreter's graphics system

use std::path::Path;

use async_trait::async_trait;

use crate::config::DeviceConfig;
use crate::error::Result;
use crate::naming::ArtifactNaming;

/// A raster device that writes sequentially numbered image files
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDevice {
    /// printf-style path template, e.g. `<dir>/_rs_chunk_plot_%03d.png`
    pub file_template: String,
    pub width: f64,
    pub height: f64,
    pub units: String,
    pub resolution: u32,
    pub backend: String,
}

impl RasterDevice {
    pub fn new(output_dir: &Path, naming: &ArtifactNaming, config: &DeviceConfig) -> Self {
        Self {
            file_template: naming.file_template(output_dir),
            width: config.width,
            height: config.height,
            units: config.units.clone(),
            resolution: config.resolution,
            backend: config.backend.clone(),
        }
    }

    /// Interpreter expression that opens this device.
    pub fn command(&self) -> String {
        format!(
            "{{ require(grDevices, quietly=TRUE); \
             png(file = \"{}\", width = {}, height = {}, units = \"{}\", res = {}, type = \"{}\", TRUE) }}",
            escape(&self.file_template),
            self.width,
            self.height,
            escape(&self.units),
            self.resolution,
            escape(&self.backend),
        )
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Interface to the interpreter that renders chunk graphics
#[async_trait]
pub trait GraphicsEngine: Send + Sync {
    /// Open `device` as the current graphics device.
    async fn open_raster_device(&self, device: &RasterDevice) -> Result<()>;

    /// Close the current device, flushing any buffered image to disk.
    async fn close_device(&self) -> Result<()>;
}

/// Engine for hosts without an interpreter attached; every command succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedEngine;

#[async_trait]
impl GraphicsEngine for DetachedEngine {
    async fn open_raster_device(&self, device: &RasterDevice) -> Result<()> {
        tracing::debug!(template = %device.file_template, "No interpreter attached, skipping device open");
        Ok(())
    }

    async fn close_device(&self) -> Result<()> {
        Ok(())
    }
}
