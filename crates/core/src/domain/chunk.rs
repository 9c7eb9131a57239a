use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Ids double as cache directory names, so they must be a single,
/// non-empty path component.
fn validate_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{kind} must not be empty")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(CoreError::Validation(format!(
            "{kind} must be a single path component: {value:?}"
        )));
    }
    Ok(())
}

/// Identifier of a notebook document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_component("document id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directory of a document's shared dependency cache, next to its chunk
/// directories. No chunk may use it as an id.
pub const SHARED_LIB_DIR: &str = "lib";

/// Identifier of a chunk within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_component("chunk id", &value)?;
        if value == SHARED_LIB_DIR {
            return Err(CoreError::Validation(format!(
                "chunk id {value:?} is reserved for the shared library cache"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (document, chunk) pair that keys every cache entry and live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
}

impl ChunkKey {
    pub fn new(document_id: impl Into<String>, chunk_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            document_id: DocumentId::new(document_id)?,
            chunk_id: ChunkId::new(chunk_id)?,
        })
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.chunk_id)
    }
}
