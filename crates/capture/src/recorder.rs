//! Append-only console log for a chunk
//!
//! Each console event becomes one CSV record: the numeric channel code,
//! then the raw text. Text is written byte for byte so the original
//! line endings survive.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use notebook_core::ChannelType;

use crate::error::{CaptureError, Result};

/// A console log record read back from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRecord {
    pub channel: ChannelType,
    pub text: String,
}

pub struct ConsoleRecorder {
    path: PathBuf,
    truncate_next: bool,
}

impl ConsoleRecorder {
    /// The first record written replaces any log left by a previous run.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            truncate_next: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Returns `Ok(false)` for empty text, which is
    /// not recorded.
    pub fn record(&mut self, channel: ChannelType, text: &str) -> Result<bool> {
        if text.is_empty() {
            return Ok(false);
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if self.truncate_next {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let mut file = options.open(&self.path)?;
        let mut line = encode_csv_line(&[&channel.code().to_string(), text]);
        line.push('\n');
        file.write_all(line.as_bytes())?;

        self.truncate_next = false;
        Ok(true)
    }

    /// Parse a console log written by [`ConsoleRecorder::record`].
    pub fn read_records(path: &Path) -> Result<Vec<ConsoleRecord>> {
        let content = std::fs::read_to_string(path)?;
        parse_csv(&content)?
            .into_iter()
            .map(|fields| -> Result<ConsoleRecord> {
                let [code, text] = fields.as_slice() else {
                    return Err(CaptureError::MalformedLog(format!(
                        "expected 2 fields, found {}",
                        fields.len()
                    )));
                };
                let code = code
                    .parse::<i64>()
                    .map_err(|_| CaptureError::MalformedLog(format!("bad channel code {code:?}")))?;
                Ok(ConsoleRecord {
                    channel: ChannelType::from_code(code)?,
                    text: text.clone(),
                })
            })
            .collect()
    }
}

/// Encode fields as one CSV line (without the terminator).
pub fn encode_csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| {
            if field.contains([',', '"', '\r', '\n']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse newline-terminated CSV records, honoring quoted fields that
/// span lines.
fn parse_csv(content: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CaptureError::MalformedLog("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_write_creates_then_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        let mut recorder = ConsoleRecorder::new(&path);

        assert!(recorder.record(ChannelType::Output, "hello").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,hello\n");

        assert!(recorder.record(ChannelType::Output, "world").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,hello\n1,world\n");
    }

    #[test]
    fn test_first_write_replaces_stale_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        std::fs::write(&path, "1,stale\n").unwrap();

        let mut recorder = ConsoleRecorder::new(&path);
        recorder.record(ChannelType::Input, "x <- 1").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0,x <- 1\n");
    }

    #[test]
    fn test_empty_text_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        let mut recorder = ConsoleRecorder::new(&path);

        assert!(!recorder.record(ChannelType::Error, "").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_line_endings_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        let mut recorder = ConsoleRecorder::new(&path);

        recorder.record(ChannelType::Output, "a\r\nb").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"1,\"a\r\nb\"\n");

        let records = ConsoleRecorder::read_records(&path).unwrap();
        assert_eq!(
            records,
            vec![ConsoleRecord {
                channel: ChannelType::Output,
                text: "a\r\nb".to_string()
            }]
        );
    }

    #[test]
    fn test_encode_quotes_special_fields() {
        assert_eq!(encode_csv_line(&["1", "plain"]), "1,plain");
        assert_eq!(encode_csv_line(&["2", "a,b"]), "2,\"a,b\"");
        assert_eq!(encode_csv_line(&["2", "say \"hi\""]), "2,\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_read_records_mixed_channels() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        let mut recorder = ConsoleRecorder::new(&path);

        recorder.record(ChannelType::Input, "print(1)").unwrap();
        recorder.record(ChannelType::Output, "[1] 1\n").unwrap();
        recorder.record(ChannelType::Error, "Warning, careful").unwrap();

        let records = ConsoleRecorder::read_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].channel, ChannelType::Input);
        assert_eq!(records[1].text, "[1] 1\n");
        assert_eq!(records[2].text, "Warning, careful");
    }

    #[test]
    fn test_read_records_rejects_unknown_channel() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("console.csv");
        std::fs::write(&path, "9,oops\n").unwrap();

        assert!(ConsoleRecorder::read_records(&path).is_err());
    }
}
