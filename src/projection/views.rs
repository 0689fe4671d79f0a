use super::{MaterializedStore, ProjectionSummary, ProjectionTarget, Projector};
use crate::core::{Action, CategoryRecord, LedgerError, Result, TransactionRecord};
use crate::projection::AccountBalance;
use crate::storage::{
    ACCOUNTS_STORE, CATEGORIES_STORE, DocumentStore, LocalDatabase, TRANSACTIONS_STORE,
};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{Level, event};

fn to_documents<'a, T, I>(records: I) -> Result<Vec<serde_json::Value>>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    records
        .into_iter()
        .map(|record| {
            serde_json::to_value(record).map_err(|err| LedgerError::WriteFailure(err.to_string()))
        })
        .collect()
}

/// Rewrites `store` only when its persisted documents differ from `documents`.
async fn write_if_changed(store: &mut DocumentStore, documents: Vec<serde_json::Value>) -> Result<bool> {
    let unchanged = store.count() == documents.len()
        && store.values().zip(documents.iter()).all(|(a, b)| a == b);
    if unchanged {
        return Ok(false);
    }
    store.replace_all(documents).await?;
    Ok(true)
}

/// The materialized stores as persisted in the local database, readable after
/// a restart before anything is replayed.
#[derive(Debug)]
pub struct ProjectedViews {
    transactions: DocumentStore,
    categories: DocumentStore,
    accounts: DocumentStore,
}

impl ProjectedViews {
    pub async fn open(db: &LocalDatabase) -> Result<Self> {
        Ok(Self {
            transactions: db.open_documents(TRANSACTIONS_STORE).await?,
            categories: db.open_documents(CATEGORIES_STORE).await?,
            accounts: db.open_documents(ACCOUNTS_STORE).await?,
        })
    }

    /// Writes the stores whose contents changed; returns how many were written.
    pub async fn persist(&mut self, state: &MaterializedStore) -> Result<usize> {
        let mut written = 0;
        if write_if_changed(&mut self.transactions, to_documents(state.transactions.iter())?).await? {
            written += 1;
        }
        if write_if_changed(&mut self.categories, to_documents(state.categories.iter())?).await? {
            written += 1;
        }
        if write_if_changed(&mut self.accounts, to_documents(state.accounts.balances().iter())?)
            .await?
        {
            written += 1;
        }
        Ok(written)
    }

    pub fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.transactions.all_as()
    }

    pub fn categories(&self) -> Result<Vec<CategoryRecord>> {
        self.categories.all_as()
    }

    pub fn accounts(&self) -> Result<Vec<AccountBalance>> {
        self.accounts.all_as()
    }

    pub fn transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        self.transactions.get_as(id)
    }

    pub fn account(&self, id: &str) -> Result<Option<AccountBalance>> {
        self.accounts.get_as(id)
    }

    pub fn transactions_for_account(&self, account_id: &str) -> Result<Vec<TransactionRecord>> {
        self.transactions
            .find_by_index("account_id", account_id)?
            .into_iter()
            .map(|document| {
                serde_json::from_value(document.clone())
                    .map_err(|err| LedgerError::DecodeFailure(err.to_string()))
            })
            .collect()
    }
}

struct ProjectionState {
    projector: Projector,
    views: Option<ProjectedViews>,
}

/// Projector plus its persisted views behind one lock, shared by the ledger
/// and the sync engine.
pub struct LiveProjection {
    state: Mutex<ProjectionState>,
}

impl LiveProjection {
    /// Projection kept only in memory.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(ProjectionState {
                projector: Projector::new(),
                views: None,
            }),
        }
    }

    pub fn with_views(views: ProjectedViews) -> Self {
        Self {
            state: Mutex::new(ProjectionState {
                projector: Projector::new(),
                views: Some(views),
            }),
        }
    }

    pub async fn snapshot(&self) -> MaterializedStore {
        self.state.lock().await.projector.state().clone()
    }

    pub async fn projected_len(&self) -> usize {
        self.state.lock().await.projector.projected_len()
    }

    /// Runs `read` against the persisted views, if any are attached.
    pub async fn read_views<T, F>(&self, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&ProjectedViews) -> Result<T>,
    {
        let state = self.state.lock().await;
        state.views.as_ref().map(read).transpose()
    }

    /// Drops the incremental position and replays `canonical` from scratch.
    pub async fn rebuild(&self, canonical: &[Action]) -> Result<ProjectionSummary> {
        let mut state = self.state.lock().await;
        let summary = state.projector.rebuild(canonical);
        Self::persist_locked(&mut state).await?;
        Ok(summary)
    }

    async fn persist_locked(state: &mut ProjectionState) -> Result<()> {
        let ProjectionState { projector, views } = state;
        if let Some(views) = views.as_mut() {
            let written = views.persist(projector.state()).await?;
            event!(Level::DEBUG, stores_written = written, "materialized views persisted");
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionTarget for LiveProjection {
    async fn project(&self, canonical: &[Action]) -> Result<ProjectionSummary> {
        let mut state = self.state.lock().await;
        let summary = state.projector.sync_to(canonical);
        Self::persist_locked(&mut state).await?;
        event!(
            Level::DEBUG,
            mode = ?summary.mode,
            replayed = summary.replayed,
            total = summary.total,
            "projection refreshed"
        );
        Ok(summary)
    }
}
