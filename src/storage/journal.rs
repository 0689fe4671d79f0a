//! Line-oriented journal file backing every action-log store.
//!
//! One line per committed batch, holding the batch as a JSON array of actions.
//! The trailing newline is the commit mark: a line without one is a batch the
//! process did not finish writing and is discarded on open, whatever number of
//! its actions reached the disk. On a write error the file is truncated back
//! to its previous length.

use crate::core::{Action, LedgerError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// `fsync` after every batch.
    Strict,
    /// `fsync` at most once per interval; a crash may lose the latest batches.
    Eventual { sync_interval_ms: u64 },
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::Strict
    }
}

pub struct JournalFile {
    path: PathBuf,
    file: File,
    len_bytes: u64,
    durability: DurabilityMode,
    quota_bytes: Option<u64>,
    last_sync_unix_ms: i64,
}

impl JournalFile {
    /// Opens (creating if needed) the journal and returns its committed actions.
    pub async fn open(
        path: impl AsRef<Path>,
        durability: DurabilityMode,
        quota_bytes: Option<u64>,
    ) -> Result<(Self, Vec<Action>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| LedgerError::IoError(err.to_string()))?;
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(LedgerError::IoError(err.to_string())),
        };

        let (actions, committed_len) = parse_journal(&path, &bytes)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| LedgerError::IoError(err.to_string()))?;

        if committed_len < bytes.len() as u64 {
            event!(
                Level::WARN,
                path = %path.display(),
                discarded_bytes = bytes.len() as u64 - committed_len,
                "discarding torn journal tail"
            );
            file.set_len(committed_len)
                .await
                .map_err(|err| LedgerError::IoError(err.to_string()))?;
            file.sync_all()
                .await
                .map_err(|err| LedgerError::IoError(err.to_string()))?;
        }

        let journal = Self {
            path,
            file,
            len_bytes: committed_len,
            durability,
            quota_bytes,
            last_sync_unix_ms: Utc::now().timestamp_millis(),
        };
        Ok((journal, actions))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    /// Durably appends a batch, or writes nothing at all.
    pub async fn append_all(&mut self, actions: &[Action]) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }

        let mut buffer = serde_json::to_vec(actions).map_err(|err| {
            LedgerError::WriteFailure(format!(
                "serialize batch starting at {}: {}",
                actions[0].id, err
            ))
        })?;
        buffer.push(b'\n');

        if let Some(quota) = self.quota_bytes {
            let projected = self.len_bytes.saturating_add(buffer.len() as u64);
            if projected > quota {
                return Err(LedgerError::WriteFailure(format!(
                    "journal {} would grow to {} bytes, quota is {}",
                    self.path.display(),
                    projected,
                    quota
                )));
            }
        }

        if let Err(err) = self.write_batch(&buffer).await {
            self.rollback().await;
            return Err(err);
        }

        self.len_bytes += buffer.len() as u64;
        Ok(())
    }

    /// Drops every entry.
    pub async fn truncate(&mut self) -> Result<()> {
        self.file
            .set_len(0)
            .await
            .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
        self.file
            .sync_all()
            .await
            .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
        self.len_bytes = 0;
        Ok(())
    }

    async fn write_batch(&mut self, buffer: &[u8]) -> Result<()> {
        self.file
            .write_all(buffer)
            .await
            .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
        self.file
            .flush()
            .await
            .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;

        let now_ms = Utc::now().timestamp_millis();
        let due = match self.durability {
            DurabilityMode::Strict => true,
            DurabilityMode::Eventual { sync_interval_ms } => {
                now_ms - self.last_sync_unix_ms >= sync_interval_ms as i64
            }
        };
        if due {
            self.file
                .sync_data()
                .await
                .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
            self.last_sync_unix_ms = now_ms;
        }
        Ok(())
    }

    async fn rollback(&mut self) {
        if let Err(err) = self.file.set_len(self.len_bytes).await {
            event!(
                Level::ERROR,
                path = %self.path.display(),
                error = %err,
                "journal rollback failed; torn tail will be discarded on next open"
            );
        }
    }
}

/// Parses committed batches and returns their actions with the byte length
/// they span.
fn parse_journal(path: &Path, bytes: &[u8]) -> Result<(Vec<Action>, u64)> {
    let mut actions = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(newline) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            break;
        };
        let line = &bytes[offset..offset + newline];
        offset += newline + 1;

        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let batch: Vec<Action> = serde_json::from_slice(line).map_err(|err| {
            LedgerError::CorruptLog(
                path.display().to_string(),
                format!("batch after entry {}: {}", actions.len(), err),
            )
        })?;

        for action in batch {
            let expected = actions.len() as u64 + 1;
            if action.sequence != expected {
                return Err(LedgerError::CorruptLog(
                    path.display().to_string(),
                    format!("expected sequence {}, found {}", expected, action.sequence),
                ));
            }
            actions.push(action);
        }
    }

    Ok((actions, offset as u64))
}
