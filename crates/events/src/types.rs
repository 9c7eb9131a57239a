//! Notification types announced by chunk capture sessions

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use notebook_core::{ChannelType, ChunkId, DocumentId, OutputType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all notifications with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Unique notification ID
    pub id: Uuid,
    /// When the notification was published
    pub timestamp: DateTime<Utc>,
    pub notification: Notification,
}

impl NotificationEnvelope {
    pub fn new(notification: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            notification,
        }
    }
}

/// Everything a chunk session tells the outside world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An artifact was moved into the chunk cache and is ready to display
    #[serde(rename = "chunk.queued_output")]
    QueuedOutput {
        document_id: DocumentId,
        chunk_id: ChunkId,
        output_type: OutputType,
        ordinal: u32,
        path: PathBuf,
    },

    /// Output capture for a chunk run has finished
    #[serde(rename = "chunk.execution_completed")]
    ExecutionCompleted {
        document_id: DocumentId,
        chunk_id: ChunkId,
        context_id: String,
    },

    /// Console text produced while the chunk runs
    #[serde(rename = "chunk.console_output")]
    LiveConsoleOutput {
        document_id: DocumentId,
        chunk_id: ChunkId,
        channel_type: ChannelType,
        text: String,
    },
}

impl Notification {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::QueuedOutput { document_id, .. }
            | Self::ExecutionCompleted { document_id, .. }
            | Self::LiveConsoleOutput { document_id, .. } => document_id,
        }
    }

    pub fn chunk_id(&self) -> &ChunkId {
        match self {
            Self::QueuedOutput { chunk_id, .. }
            | Self::ExecutionCompleted { chunk_id, .. }
            | Self::LiveConsoleOutput { chunk_id, .. } => chunk_id,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Self::ExecutionCompleted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let notification = Notification::ExecutionCompleted {
            document_id: DocumentId::new("doc1").unwrap(),
            chunk_id: ChunkId::new("c1").unwrap(),
            context_id: "ctx".to_string(),
        };
        let json = serde_json::to_string(&notification).unwrap();
        assert!(json.contains("chunk.execution_completed"));
        assert!(json.contains("doc1"));
        assert!(notification.is_completion());
    }
}
