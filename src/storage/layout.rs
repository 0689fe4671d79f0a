//! Declarative description of the stores a local database holds.
//!
//! A layout is a plain value: migration steps take the current layout and
//! return the next one, and the database materializes the difference.

use crate::core::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The raw, local action log. Never dropped by a migration.
pub const ACTIONS_STORE: &str = "actions";
/// Last-known decoded contents of the remote file.
pub const CLOUD_REPLICA_STORE: &str = "cloud_replica";
pub const TRANSACTIONS_STORE: &str = "transactions";
pub const CATEGORIES_STORE: &str = "categories";
pub const ACCOUNTS_STORE: &str = "accounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Append-only sequence of actions (the raw log, or the cloud replica).
    ActionLog,
    /// Keyed documents (materialized state).
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSpec {
    pub kind: StoreKind,
    /// Field holding the primary key of each document. Unused for action logs.
    #[serde(default)]
    pub key_path: Option<String>,
    /// Secondary index names; each index is keyed by the field of the same name.
    #[serde(default)]
    pub indexes: BTreeSet<String>,
}

impl StoreSpec {
    pub fn action_log() -> Self {
        Self {
            kind: StoreKind::ActionLog,
            key_path: None,
            indexes: BTreeSet::new(),
        }
    }

    pub fn document(key_path: impl Into<String>) -> Self {
        Self {
            kind: StoreKind::Document,
            key_path: Some(key_path.into()),
            indexes: BTreeSet::new(),
        }
    }

    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.insert(field.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    stores: BTreeMap<String, StoreSpec>,
}

impl StoreLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&StoreSpec> {
        self.stores.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreSpec)> {
        self.stores.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Adds a store. Re-creating an existing store with an identical spec is a
    /// no-op so that replayed steps stay idempotent.
    pub fn create_store(mut self, name: impl Into<String>, spec: StoreSpec) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidArgument(
                "store name must not be empty".to_string(),
            ));
        }
        if spec.kind == StoreKind::Document && spec.key_path.is_none() {
            return Err(LedgerError::InvalidArgument(format!(
                "document store '{}' needs a key path",
                name
            )));
        }

        match self.stores.get(&name) {
            Some(existing) if existing == &spec => Ok(self),
            Some(_) => Err(LedgerError::InvalidArgument(format!(
                "store '{}' already exists with a different definition",
                name
            ))),
            None => {
                self.stores.insert(name, spec);
                Ok(self)
            }
        }
    }

    /// Rewrites an existing store's definition. The kind cannot change.
    pub fn alter_store<F>(mut self, name: &str, alter: F) -> Result<Self>
    where
        F: FnOnce(&mut StoreSpec),
    {
        let spec = self
            .stores
            .get_mut(name)
            .ok_or_else(|| LedgerError::StoreNotFound(name.to_string()))?;
        let kind = spec.kind;
        alter(spec);
        if spec.kind != kind {
            return Err(LedgerError::InvalidArgument(format!(
                "store '{}' cannot change kind",
                name
            )));
        }
        Ok(self)
    }

    pub fn drop_store(mut self, name: &str) -> Self {
        self.stores.remove(name);
        self
    }

    /// Names of action-log stores in `self` that are gone (or no longer logs)
    /// in `next`.
    pub fn dropped_logs(&self, next: &StoreLayout) -> Vec<String> {
        self.stores
            .iter()
            .filter(|(_, spec)| spec.kind == StoreKind::ActionLog)
            .filter(|(name, _)| {
                next.get(name)
                    .map(|spec| spec.kind != StoreKind::ActionLog)
                    .unwrap_or(true)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
