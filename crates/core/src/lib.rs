//! Domain types shared by the notebook chunk capture crates.

pub mod domain;
pub mod error;

pub use domain::chunk::{ChunkId, ChunkKey, DocumentId, SHARED_LIB_DIR};
pub use domain::output::{ChannelType, ConsoleOutputKind, OutputOrdinal, OutputType};
pub use error::{CoreError, Result};
