//! Append-only action logs: the local source of truth and the cloud replica.
//!
//! Both are backed by a journal store in the local database and keep their
//! committed contents in an immutable vector, so readers take O(1) snapshots
//! without holding the writer lock while they diff.

pub mod append_only;
pub mod cloud_replica;

pub use append_only::AppendOnlyLog;
pub use cloud_replica::CloudReplica;

use crate::core::{Action, ActionId, LedgerError, Result};
use crate::storage::{JournalFile, LocalDatabase};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Read/append contract shared by the local log and the cloud replica.
///
/// Ranges are 1-based and inclusive on both ends.
#[async_trait]
pub trait ActionLog: Send + Sync {
    /// Appends all actions or none; sequence numbers are assigned here.
    async fn append(&self, actions: Vec<Action>) -> Result<()>;

    async fn get_actions(&self, from: u64, to: u64) -> Vec<Action>;

    async fn get_actions_count(&self) -> u64;

    async fn get_last_action(&self) -> Option<Action>;
}

/// Immutable view of a log at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSnapshot {
    actions: im::Vector<Action>,
}

impl LogSnapshot {
    pub fn len(&self) -> u64 {
        self.actions.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn range(&self, from: u64, to: u64) -> Vec<Action> {
        match inclusive_bounds(self.len(), from, to) {
            Some((start, end)) => self.actions.clone().slice(start..end).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn to_vec(&self) -> Vec<Action> {
        self.actions.iter().cloned().collect()
    }
}

/// Converts an inclusive 1-based range into a half-open index range clipped to
/// `len`. `from == 0` reads as 1; an empty or out-of-log range yields `None`.
pub fn inclusive_bounds(len: u64, from: u64, to: u64) -> Option<(usize, usize)> {
    let from = from.max(1);
    if to < from || from > len {
        return None;
    }
    let to = to.min(len);
    Some(((from - 1) as usize, to as usize))
}

struct LogState {
    journal: JournalFile,
    actions: im::Vector<Action>,
    ids: HashSet<ActionId>,
}

/// Journal-backed log shared by [`AppendOnlyLog`] and [`CloudReplica`].
///
/// The mutex is the single serialization point for writers: appends from
/// user dispatch and from sync pulls queue on it and never interleave.
pub(crate) struct JournaledLog {
    store: String,
    state: Mutex<LogState>,
}

impl JournaledLog {
    pub(crate) async fn open(db: &LocalDatabase, store: &str) -> Result<Self> {
        let (journal, committed) = db.open_journal(store).await?;

        let mut ids = HashSet::with_capacity(committed.len());
        for action in &committed {
            if !ids.insert(action.id) {
                return Err(LedgerError::CorruptLog(
                    store.to_string(),
                    format!("action {} appears twice", action.id),
                ));
            }
        }

        Ok(Self {
            store: store.to_string(),
            state: Mutex::new(LogState {
                journal,
                actions: committed.into_iter().collect(),
                ids,
            }),
        })
    }

    pub(crate) fn store(&self) -> &str {
        &self.store
    }

    pub(crate) async fn append(&self, actions: Vec<Action>) -> Result<Vec<Action>> {
        let mut state = self.state.lock().await;
        Self::append_locked(&mut state, actions).await
    }

    async fn append_locked(state: &mut LogState, actions: Vec<Action>) -> Result<Vec<Action>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch_ids = HashSet::with_capacity(actions.len());
        for action in &actions {
            if state.ids.contains(&action.id) || !batch_ids.insert(action.id) {
                return Err(LedgerError::DuplicateAction(action.id.to_string()));
            }
        }

        let base = state.actions.len() as u64;
        let sequenced = actions
            .into_iter()
            .enumerate()
            .map(|(offset, action)| action.at_sequence(base + offset as u64 + 1))
            .collect::<Vec<_>>();

        state.journal.append_all(&sequenced).await?;

        for action in &sequenced {
            state.ids.insert(action.id);
            state.actions.push_back(action.clone());
        }
        Ok(sequenced)
    }

    pub(crate) async fn get_actions(&self, from: u64, to: u64) -> Vec<Action> {
        self.snapshot().await.range(from, to)
    }

    pub(crate) async fn count(&self) -> u64 {
        self.state.lock().await.actions.len() as u64
    }

    pub(crate) async fn last(&self) -> Option<Action> {
        self.state.lock().await.actions.last().cloned()
    }

    pub(crate) async fn contains(&self, id: &ActionId) -> bool {
        self.state.lock().await.ids.contains(id)
    }

    pub(crate) async fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            actions: self.state.lock().await.actions.clone(),
        }
    }

    pub(crate) async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal.truncate().await?;
        state.actions.clear();
        state.ids.clear();
        Ok(())
    }

    /// Truncates and refills under one lock acquisition.
    pub(crate) async fn replace(&self, actions: Vec<Action>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal.truncate().await?;
        state.actions.clear();
        state.ids.clear();
        Self::append_locked(&mut state, actions).await?;
        Ok(())
    }
}
