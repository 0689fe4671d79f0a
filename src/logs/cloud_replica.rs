use super::{ActionLog, JournaledLog, LogSnapshot};
use crate::core::{Action, Result};
use crate::storage::{CLOUD_REPLICA_STORE, LocalDatabase};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Level, event};

/// Locally persisted mirror of the remote file's decoded actions.
///
/// Disposable: it is refilled from every fetch and can be dropped at any time
/// with [`CloudReplica::delete_db`]. End users never write to it.
#[derive(Clone)]
pub struct CloudReplica {
    inner: Arc<JournaledLog>,
}

impl CloudReplica {
    pub async fn open(db: &LocalDatabase) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(JournaledLog::open(db, CLOUD_REPLICA_STORE).await?),
        })
    }

    /// Drops every cached action.
    pub async fn delete_db(&self) -> Result<()> {
        self.inner.clear().await?;
        event!(Level::DEBUG, store = self.inner.store(), "cloud replica dropped");
        Ok(())
    }

    /// Replaces the cached contents with a freshly decoded remote sequence.
    pub async fn replace_contents(&self, actions: Vec<Action>) -> Result<()> {
        self.inner.replace(actions).await
    }

    pub async fn snapshot(&self) -> LogSnapshot {
        self.inner.snapshot().await
    }
}

#[async_trait]
impl ActionLog for CloudReplica {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionKind;
    use crate::storage::{DurabilityMode, StoreLayout, StoreSpec};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    async fn open_replica(dir: &TempDir) -> CloudReplica {
        let mut db = LocalDatabase::open(dir.path(), DurabilityMode::Strict, None)
            .await
            .unwrap();
        let layout = StoreLayout::new()
            .create_store(CLOUD_REPLICA_STORE, StoreSpec::action_log())
            .unwrap();
        db.commit_layout(1, layout).await.unwrap();
        CloudReplica::open(&db).await.unwrap()
    }

    fn account(n: u32) -> Action {
        Action::new(ActionKind::AddAccount, json!({"id": format!("a{}", n)}))
    }

    #[tokio::test]
    async fn test_delete_db_empties_replica() {
        let dir = TempDir::new().unwrap();
        let replica = open_replica(&dir).await;

        assert_ok!(replica.append(vec![account(1), account(2)]).await);
        assert_eq!(replica.get_actions_count().await, 2);

        assert_ok!(replica.delete_db().await);
        assert_eq!(replica.get_actions_count().await, 0);
        assert!(replica.get_last_action().await.is_none());
        assert!(replica.get_actions(1, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_contents_renumbers_in_given_order() {
        let dir = TempDir::new().unwrap();
        let replica = open_replica(&dir).await;
        assert_ok!(replica.append(vec![account(1)]).await);

        let fresh = vec![account(7), account(8), account(9)];
        let ids = fresh.iter().map(|a| a.id).collect::<Vec<_>>();
        assert_ok!(replica.replace_contents(fresh).await);

        let cached = replica.get_actions(1, 10).await;
        assert_eq!(cached.iter().map(|a| a.id).collect::<Vec<_>>(), ids);
        assert_eq!(cached.iter().map(|a| a.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_replace_with_duplicates_is_rejected() {
        let dir = TempDir::new().unwrap();
        let replica = open_replica(&dir).await;
        let twice = account(1);
        assert_err!(replica.replace_contents(vec![twice.clone(), twice]).await);
        assert_eq!(replica.snapshot().await.len(), 0);
    }
}
