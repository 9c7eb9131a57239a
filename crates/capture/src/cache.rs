//! On-disk layout of the chunk output cache
//!
//! ```text
//! <root>/<document>/lib/                  shared library cache
//! <root>/<document>/<chunk>/000000.png    artifacts, by ordinal
//! <root>/<document>/<chunk>/console.csv   console log
//! <root>/<document>/<chunk>/last_output.json
//! ```

use std::path::{Path, PathBuf};

use notebook_core::{ChunkKey, DocumentId, OutputOrdinal, OutputType};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Directory holding dependency assets, both next to a fresh artifact
/// and at document level.
pub const LIB_DIR: &str = notebook_core::SHARED_LIB_DIR;
const CONSOLE_LOG: &str = "console.csv";
const LAST_OUTPUT: &str = "last_output.json";

/// A cached artifact found in a chunk directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOutput {
    pub ordinal: u32,
    pub output_type: OutputType,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ChunkCache {
    root: PathBuf,
}

impl ChunkCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_dir(&self, document_id: &DocumentId) -> PathBuf {
        self.root.join(document_id.as_str())
    }

    /// Directory the chunk's artifacts are captured into and cached in.
    pub fn chunk_dir(&self, key: &ChunkKey) -> PathBuf {
        self.document_dir(&key.document_id).join(key.chunk_id.as_str())
    }

    pub fn shared_lib_dir(&self, document_id: &DocumentId) -> PathBuf {
        self.document_dir(document_id).join(LIB_DIR)
    }

    pub fn output_file(&self, key: &ChunkKey, output: &OutputOrdinal) -> PathBuf {
        self.chunk_dir(key).join(format!(
            "{:06}.{}",
            output.ordinal,
            output.output_type.extension()
        ))
    }

    pub fn console_log(&self, key: &ChunkKey) -> PathBuf {
        self.chunk_dir(key).join(CONSOLE_LOG)
    }

    pub(crate) fn last_output_file(&self, key: &ChunkKey) -> PathBuf {
        self.chunk_dir(key).join(LAST_OUTPUT)
    }

    /// Last ordinal persisted for the chunk, if any artifact was cached.
    pub fn last_output(&self, key: &ChunkKey) -> Result<Option<OutputOrdinal>> {
        let path = self.last_output_file(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_last_output(&self, key: &ChunkKey, output: &OutputOrdinal) -> Result<()> {
        let content = serde_json::to_string(output)?;
        std::fs::write(self.last_output_file(key), content)?;
        Ok(())
    }

    /// Cached artifacts of a chunk in ordinal order.
    pub fn outputs(&self, key: &ChunkKey) -> Result<Vec<CachedOutput>> {
        let dir = self.chunk_dir(key);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut outputs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(output) = parse_output_name(&path) {
                outputs.push(CachedOutput {
                    ordinal: output.ordinal,
                    output_type: output.output_type,
                    path,
                });
            }
        }
        outputs.sort_by_key(|o| o.ordinal);
        Ok(outputs)
    }
}

fn parse_output_name(path: &Path) -> Option<OutputOrdinal> {
    if !path.is_file() {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 6 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let output_type = OutputType::from_extension(path.extension()?.to_str()?)?;
    // Console text lives in its own log, never in an ordinal file
    if output_type == OutputType::Text {
        return None;
    }
    Some(OutputOrdinal::new(stem.parse().ok()?, output_type))
}
