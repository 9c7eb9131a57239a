use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Kind of artifact captured for a chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Text,
    Plot,
    Html,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Plot => "plot",
            Self::Html => "html",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "plot" => Some(Self::Plot),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    /// Numeric code used on the client protocol.
    pub fn code(&self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Plot => 2,
            Self::Html => 3,
        }
    }

    /// File extension of the cached artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "csv",
            Self::Plot => "png",
            Self::Html => "html",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Text),
            "png" => Some(Self::Plot),
            "html" => Some(Self::Html),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownOutputType(s.to_string()))
    }
}

/// Classification of a console text record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Input,
    Output,
    Error,
}

impl ChannelType {
    /// Code written as the first field of a console log record.
    pub fn code(&self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Error => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Input),
            1 => Ok(Self::Output),
            2 => Ok(Self::Error),
            other => Err(CoreError::UnknownChannelCode(other)),
        }
    }
}

/// Stream a console output event was written to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleOutputKind {
    Normal,
    Error,
}

impl From<ConsoleOutputKind> for ChannelType {
    fn from(kind: ConsoleOutputKind) -> Self {
        match kind {
            ConsoleOutputKind::Normal => ChannelType::Output,
            ConsoleOutputKind::Error => ChannelType::Error,
        }
    }
}

/// Last artifact emitted for a chunk.
///
/// Ordinals are zero-based and shared by every channel that produces
/// per-ordinal files, so a chunk's cache replays in capture order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputOrdinal {
    pub ordinal: u32,
    pub output_type: OutputType,
}

impl OutputOrdinal {
    pub fn new(ordinal: u32, output_type: OutputType) -> Self {
        Self {
            ordinal,
            output_type,
        }
    }

    /// The ordinal to assign after `last`; `None` means nothing was emitted yet.
    pub fn next_after(last: Option<&OutputOrdinal>, output_type: OutputType) -> Self {
        let ordinal = last.map_or(0, |l| l.ordinal + 1);
        Self::new(ordinal, output_type)
    }
}
