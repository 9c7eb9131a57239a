//! Moves captured artifacts into the chunk cache
//!
//! Each artifact takes the next ordinal of its chunk. A `lib` folder
//! shipped next to the artifact is merged into the document's shared
//! library cache.

use std::path::{Path, PathBuf};

use notebook_core::{ChunkKey, OutputOrdinal, OutputType};
use tracing::{debug, error, warn};

use crate::cache::{ChunkCache, LIB_DIR};

/// An artifact that now lives in the cache under its ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub output: OutputOrdinal,
    pub path: PathBuf,
}

/// Outcome of merging a dependency folder into the shared library cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub moved: usize,
    pub failed: usize,
}

pub struct ArtifactWriter {
    key: ChunkKey,
    cache: ChunkCache,
    last: Option<OutputOrdinal>,
}

impl ArtifactWriter {
    /// Resumes from the last ordinal persisted for the chunk.
    pub fn new(key: ChunkKey, cache: ChunkCache) -> Self {
        let last = cache.last_output(&key).unwrap_or_else(|e| {
            warn!(chunk = %key, error = %e, "Failed to read last chunk output, starting over");
            None
        });
        Self { key, cache, last }
    }

    pub fn last_output(&self) -> Option<OutputOrdinal> {
        self.last
    }

    /// Move `file` into the cache under the next ordinal.
    ///
    /// Returns `None` when the move fails; the ordinal is not consumed so
    /// the chunk's sequence stays gap-free.
    pub fn write(&self, file: &Path, output_type: OutputType) -> Option<WrittenArtifact> {
        let output = OutputOrdinal::next_after(self.last.as_ref(), output_type);
        let target = self.cache.output_file(&self.key, &output);

        if let Err(e) = move_file(file, &target) {
            error!(
                chunk = %self.key,
                from = %file.display(),
                to = %target.display(),
                error = %e,
                "Failed to move chunk output into cache"
            );
            return None;
        }
        debug!(chunk = %self.key, ordinal = output.ordinal, path = %target.display(), "Cached chunk output");

        if let Some(parent) = file.parent() {
            let lib = parent.join(LIB_DIR);
            if lib.is_dir() {
                let shared = self.cache.shared_lib_dir(&self.key.document_id);
                relocate_dependencies(&lib, &shared);
            }
        }

        Some(WrittenArtifact {
            output,
            path: target,
        })
    }

    /// Record `artifact` as the chunk's last output.
    ///
    /// The in-memory ordinal advances even if persisting fails, so later
    /// artifacts of this run never reuse it.
    pub fn commit(&mut self, artifact: &WrittenArtifact) {
        self.last = Some(artifact.output);
        if let Err(e) = self.cache.update_last_output(&self.key, &artifact.output) {
            warn!(chunk = %self.key, error = %e, "Failed to persist last chunk output");
        }
    }
}

/// Rename, falling back to copy + delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Merge every entry under `source` into `target` at the same relative
/// path, overwriting existing files, then delete `source`.
///
/// Entry failures are logged and skipped.
pub fn relocate_dependencies(source: &Path, target: &Path) -> RelocationReport {
    let mut report = RelocationReport::default();

    if let Err(e) = std::fs::create_dir_all(target) {
        error!(path = %target.display(), error = %e, "Failed to create shared library cache");
    }

    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to list dependency folder");
                report.failed += 1;
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(source) else {
                continue;
            };
            let destination = target.join(relative);

            let result = if path.is_dir() {
                pending.push(path.clone());
                std::fs::create_dir_all(&destination)
            } else {
                replace_file(&path, &destination)
            };

            match result {
                Ok(()) => report.moved += 1,
                Err(e) => {
                    warn!(
                        from = %path.display(),
                        to = %destination.display(),
                        error = %e,
                        "Failed to relocate dependency"
                    );
                    report.failed += 1;
                }
            }
        }
    }

    if let Err(e) = std::fs::remove_dir_all(source) {
        warn!(path = %source.display(), error = %e, "Failed to remove dependency folder");
    }

    debug!(
        from = %source.display(),
        to = %target.display(),
        moved = report.moved,
        failed = report.failed,
        "Relocated dependency folder"
    );
    report
}

fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if to.is_file() {
        std::fs::remove_file(to)?;
    }
    move_file(from, to)
}
