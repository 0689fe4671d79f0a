use crate::core::{LedgerError, Result};
use crate::storage::DurabilityMode;
use crate::sync::{CloudEncoding, FileRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ledger configuration
///
/// Every field except `data_dir` has a default, so a config file only needs
/// to name the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory of the local database
    pub data_dir: PathBuf,

    /// Remote file holding the shared log
    #[serde(default)]
    pub remote_file: FileRef,

    /// Encoding used when uploading; downloads detect it
    #[serde(default)]
    pub encoding: CloudEncoding,

    /// Flush policy of the local log
    #[serde(default)]
    pub durability: DurabilityMode,

    /// Byte budget of each action-log store; appends past it fail
    #[serde(default)]
    pub log_quota_bytes: Option<u64>,
}

impl LedgerConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            remote_file: FileRef::default(),
            encoding: CloudEncoding::default(),
            durability: DurabilityMode::default(),
            log_quota_bytes: None,
        }
    }

    /// Set the remote file
    pub fn remote_file(mut self, file: FileRef) -> Self {
        self.remote_file = file;
        self
    }

    /// Set the upload encoding
    pub fn encoding(mut self, encoding: CloudEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Cap the size of each action-log store
    pub fn log_quota_bytes(mut self, quota: u64) -> Self {
        self.log_quota_bytes = Some(quota);
        self
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| LedgerError::IoError(format!("{}: {}", path.display(), err)))?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|err| {
            LedgerError::InvalidArgument(format!("config {}: {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "data_dir cannot be empty".to_string(),
            ));
        }

        if self.remote_file.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "remote_file cannot be empty".to_string(),
            ));
        }

        if let DurabilityMode::Eventual { sync_interval_ms } = self.durability {
            if sync_interval_ms == 0 {
                return Err(LedgerError::InvalidArgument(
                    "eventual durability needs sync_interval_ms > 0".to_string(),
                ));
            }
        }

        if self.log_quota_bytes == Some(0) {
            return Err(LedgerError::InvalidArgument(
                "log_quota_bytes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_minimal_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, br#"{"data_dir": "/tmp/ledger"}"#)
            .await
            .unwrap();

        let config = LedgerConfig::from_json_file(&path).await.unwrap();
        assert_eq!(config, LedgerConfig::new("/tmp/ledger"));
        assert_eq!(config.durability, DurabilityMode::Strict);
    }

    #[tokio::test]
    async fn test_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(
            &path,
            br#"{
                "data_dir": "data",
                "remote_file": "shared/ledger.msgpack",
                "encoding": "message_pack",
                "durability": {"eventual": {"sync_interval_ms": 250}},
                "log_quota_bytes": 1048576
            }"#,
        )
        .await
        .unwrap();

        let config = LedgerConfig::from_json_file(&path).await.unwrap();
        assert_eq!(config.encoding, CloudEncoding::MessagePack);
        assert_eq!(config.remote_file.as_str(), "shared/ledger.msgpack");
        assert_eq!(
            config.durability,
            DurabilityMode::Eventual {
                sync_interval_ms: 250
            }
        );
        assert_eq!(config.log_quota_bytes, Some(1_048_576));
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let config = LedgerConfig {
            log_quota_bytes: Some(0),
            ..LedgerConfig::new("data")
        };
        assert!(config.validate().is_err());
    }
}
