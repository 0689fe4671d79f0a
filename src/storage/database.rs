//! The local persistent database: a directory holding a manifest (schema
//! version + store layout) and one file per declared store.

use super::documents::DocumentStore;
use super::journal::{DurabilityMode, JournalFile};
use super::layout::{StoreKind, StoreLayout, StoreSpec};
use super::write_atomically;
use crate::core::{Action, LedgerError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tracing::{Level, event};

const MANIFEST_FILE: &str = "manifest.json";
const STORES_DIR: &str = "stores";
const DATABASE_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseManifest {
    pub format_version: u16,
    pub schema_version: u32,
    pub layout: StoreLayout,
    pub updated_at_unix_ms: i64,
}

impl DatabaseManifest {
    fn empty() -> Self {
        Self {
            format_version: DATABASE_FORMAT_VERSION,
            schema_version: 0,
            layout: StoreLayout::new(),
            updated_at_unix_ms: Utc::now().timestamp_millis(),
        }
    }
}

pub struct LocalDatabase {
    root_dir: PathBuf,
    manifest: DatabaseManifest,
    durability: DurabilityMode,
    log_quota_bytes: Option<u64>,
}

impl LocalDatabase {
    /// Opens the database at `root_dir`. A missing directory or manifest is a
    /// brand new database at schema version 0 with no stores.
    pub async fn open(
        root_dir: impl AsRef<Path>,
        durability: DurabilityMode,
        log_quota_bytes: Option<u64>,
    ) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(root_dir.join(STORES_DIR))
            .await
            .map_err(|err| LedgerError::IoError(err.to_string()))?;

        let manifest_path = root_dir.join(MANIFEST_FILE);
        let manifest = match fs::read(&manifest_path).await {
            Ok(bytes) => {
                let manifest: DatabaseManifest = serde_json::from_slice(&bytes).map_err(|err| {
                    LedgerError::CorruptLog(manifest_path.display().to_string(), err.to_string())
                })?;
                if manifest.format_version != DATABASE_FORMAT_VERSION {
                    return Err(LedgerError::CorruptLog(
                        manifest_path.display().to_string(),
                        format!("unsupported database format {}", manifest.format_version),
                    ));
                }
                manifest
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => DatabaseManifest::empty(),
            Err(err) => return Err(LedgerError::IoError(err.to_string())),
        };

        Ok(Self {
            root_dir,
            manifest,
            durability,
            log_quota_bytes,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn manifest(&self) -> &DatabaseManifest {
        &self.manifest
    }

    pub fn schema_version(&self) -> u32 {
        self.manifest.schema_version
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.manifest.layout
    }

    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    fn store_path(&self, name: &str, spec: &StoreSpec) -> PathBuf {
        let extension = match spec.kind {
            StoreKind::ActionLog => "jsonl",
            StoreKind::Document => "json",
        };
        self.root_dir
            .join(STORES_DIR)
            .join(format!("{}.{}", name, extension))
    }

    fn spec(&self, name: &str, kind: StoreKind) -> Result<&StoreSpec> {
        let spec = self
            .manifest
            .layout
            .get(name)
            .ok_or_else(|| LedgerError::StoreNotFound(name.to_string()))?;
        if spec.kind != kind {
            return Err(LedgerError::InvalidArgument(format!(
                "store '{}' is a {:?} store, expected {:?}",
                name, spec.kind, kind
            )));
        }
        Ok(spec)
    }

    pub async fn open_journal(&self, name: &str) -> Result<(JournalFile, Vec<Action>)> {
        let spec = self.spec(name, StoreKind::ActionLog)?;
        JournalFile::open(
            self.store_path(name, spec),
            self.durability,
            self.log_quota_bytes,
        )
        .await
    }

    pub async fn open_documents(&self, name: &str) -> Result<DocumentStore> {
        let spec = self.spec(name, StoreKind::Document)?;
        DocumentStore::open(name, self.store_path(name, spec), spec).await
    }

    /// Materializes `layout` on disk and records `version` as the committed
    /// schema version. New log stores get an empty file; stores that left the
    /// layout have their files removed. Existing contents are never rewritten,
    /// so committing the same layout twice is harmless.
    pub(crate) async fn commit_layout(&mut self, version: u32, layout: StoreLayout) -> Result<()> {
        for (name, spec) in layout.iter() {
            if self.manifest.layout.get(name) == Some(spec) {
                continue;
            }
            if spec.kind == StoreKind::ActionLog {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.store_path(name, spec))
                    .await
                    .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
            }
            event!(Level::DEBUG, store = name, kind = ?spec.kind, "store declared");
        }

        for (name, spec) in self.manifest.layout.iter() {
            if layout.contains(name) {
                continue;
            }
            let path = self.store_path(name, spec);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(LedgerError::WriteFailure(err.to_string())),
            }
            event!(Level::DEBUG, store = name, "store removed");
        }

        let manifest = DatabaseManifest {
            format_version: DATABASE_FORMAT_VERSION,
            schema_version: version,
            layout,
            updated_at_unix_ms: Utc::now().timestamp_millis(),
        };
        write_atomically(&self.root_dir.join(MANIFEST_FILE), &manifest).await?;
        self.manifest = manifest;
        Ok(())
    }
}
