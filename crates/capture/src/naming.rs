//! Naming convention of the image files the graphics device writes

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::NamingConfig;
use crate::error::Result;

/// Matches `<prefix><NNN>.<ext>` file names (extension case-insensitive).
#[derive(Debug, Clone)]
pub struct ArtifactNaming {
    prefix: String,
    extension: String,
    sequence_width: usize,
    pattern: Regex,
}

impl ArtifactNaming {
    pub fn new(config: &NamingConfig) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"^{}\d{{{}}}\.(?i:{})$",
            regex::escape(&config.prefix),
            config.sequence_width,
            regex::escape(&config.extension),
        ))?;

        Ok(Self {
            prefix: config.prefix.clone(),
            extension: config.extension.clone(),
            sequence_width: config.sequence_width,
            pattern,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.pattern.is_match(name))
    }

    /// printf-style file template handed to the device, e.g.
    /// `<dir>/_rs_chunk_plot_%03d.png`.
    pub fn file_template(&self, dir: &Path) -> String {
        let name = format!(
            "{}%0{}d.{}",
            self.prefix, self.sequence_width, self.extension
        );
        // Devices expect forward slashes on every platform
        format!("{}/{}", dir.display(), name).replace('\\', "/")
    }

    /// Matching files directly inside `dir`, sorted by file name so the
    /// device's sequence order is preserved.
    pub fn list(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.matches(&path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}
