use super::{ActionLog, JournaledLog, LogSnapshot};
use crate::core::{Action, ActionId, Result};
use crate::storage::{ACTIONS_STORE, LocalDatabase};
use async_trait::async_trait;
use std::sync::Arc;

/// The local, single-writer source of truth.
///
/// Cloning shares the same underlying log, so every clone appends through the
/// same lock.
#[derive(Clone)]
pub struct AppendOnlyLog {
    inner: Arc<JournaledLog>,
}

impl AppendOnlyLog {
    pub async fn open(db: &LocalDatabase) -> Result<Self> {
        Self::open_store(db, ACTIONS_STORE).await
    }

    pub async fn open_store(db: &LocalDatabase, store: &str) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(JournaledLog::open(db, store).await?),
        })
    }

    pub fn store(&self) -> &str {
        self.inner.store()
    }

    /// Like [`ActionLog::append`], but hands back the actions with the
    /// sequence numbers they were committed at.
    pub async fn append_sequenced(&self, actions: Vec<Action>) -> Result<Vec<Action>> {
        self.inner.append(actions).await
    }

    pub async fn contains(&self, id: &ActionId) -> bool {
        self.inner.contains(id).await
    }

    pub async fn snapshot(&self) -> LogSnapshot {
        self.inner.snapshot().await
    }
}

#[async_trait]
impl ActionLog for AppendOnlyLog {
    async fn append(&self, actions: Vec<Action>) -> Result<()> {
        self.inner.append(actions).await.map(|_| ())
    }

    async fn get_actions(&self, from: u64, to: u64) -> Vec<Action> {
        self.inner.get_actions(from, to).await
    }

    async fn get_actions_count(&self) -> u64 {
        self.inner.count().await
    }

    async fn get_last_action(&self) -> Option<Action> {
        self.inner.last().await
    }
}
