use super::layout::{StoreKind, StoreSpec};
use super::write_atomically;
use crate::core::{LedgerError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

const DOCUMENT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct DocumentFile {
    format_version: u16,
    store: String,
    documents: BTreeMap<String, serde_json::Value>,
}

/// Keyed document store holding one materialized view.
///
/// The whole store is rewritten on `replace_all` (temp file + rename), which
/// matches how views are produced: a full or incremental replay yields the
/// complete current state.
#[derive(Debug)]
pub struct DocumentStore {
    name: String,
    path: PathBuf,
    key_path: String,
    documents: BTreeMap<String, serde_json::Value>,
    // index name -> indexed value -> primary keys
    indexes: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl DocumentStore {
    pub async fn open(name: &str, path: impl AsRef<Path>, spec: &StoreSpec) -> Result<Self> {
        if spec.kind != StoreKind::Document {
            return Err(LedgerError::InvalidArgument(format!(
                "store '{}' is not a document store",
                name
            )));
        }
        let key_path = spec.key_path.clone().ok_or_else(|| {
            LedgerError::InvalidArgument(format!("document store '{}' has no key path", name))
        })?;

        let path = path.as_ref().to_path_buf();
        let documents = match fs::read(&path).await {
            Ok(bytes) => {
                let file: DocumentFile = serde_json::from_slice(&bytes).map_err(|err| {
                    LedgerError::CorruptLog(path.display().to_string(), err.to_string())
                })?;
                if file.format_version != DOCUMENT_FORMAT_VERSION {
                    return Err(LedgerError::CorruptLog(
                        path.display().to_string(),
                        format!("unsupported document format {}", file.format_version),
                    ));
                }
                file.documents
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(LedgerError::IoError(err.to_string())),
        };

        let mut store = Self {
            name: name.to_string(),
            path,
            key_path,
            documents,
            indexes: spec
                .indexes
                .iter()
                .map(|index| (index.clone(), BTreeMap::new()))
                .collect(),
        };
        store.rebuild_indexes();
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> usize {
        self.documents.len()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.documents
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|err| {
                    LedgerError::DecodeFailure(format!("{} '{}': {}", self.name, key, err))
                })
            })
            .transpose()
    }

    pub fn values(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.documents.values()
    }

    pub fn all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.documents
            .iter()
            .map(|(key, value)| {
                serde_json::from_value(value.clone()).map_err(|err| {
                    LedgerError::DecodeFailure(format!("{} '{}': {}", self.name, key, err))
                })
            })
            .collect()
    }

    pub fn find_by_index(&self, index: &str, value: &str) -> Result<Vec<&serde_json::Value>> {
        let entries = self.indexes.get(index).ok_or_else(|| {
            LedgerError::InvalidArgument(format!("store '{}' has no index '{}'", self.name, index))
        })?;
        Ok(entries
            .get(value)
            .map(|keys| keys.iter().filter_map(|key| self.documents.get(key)).collect())
            .unwrap_or_default())
    }

    /// Replaces every document and persists the store atomically.
    pub async fn replace_all<I>(&mut self, documents: I) -> Result<()>
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        let mut next = BTreeMap::new();
        for document in documents {
            let key = document
                .get(&self.key_path)
                .and_then(index_value)
                .ok_or_else(|| {
                    LedgerError::InvalidArgument(format!(
                        "document for '{}' lacks key field '{}'",
                        self.name, self.key_path
                    ))
                })?;
            next.insert(key, document);
        }

        let file = DocumentFile {
            format_version: DOCUMENT_FORMAT_VERSION,
            store: self.name.clone(),
            documents: next,
        };
        write_atomically(&self.path, &file).await?;

        self.documents = file.documents;
        self.rebuild_indexes();
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        for (index, entries) in self.indexes.iter_mut() {
            entries.clear();
            for (key, document) in &self.documents {
                if let Some(value) = document.get(index).and_then(index_value) {
                    entries.entry(value).or_default().insert(key.clone());
                }
            }
        }
    }
}

fn index_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
