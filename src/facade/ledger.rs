use super::config::LedgerConfig;
use crate::core::{Action, CategoryRecord, Result, TransactionRecord};
use crate::logs::{ActionLog, AppendOnlyLog, CloudReplica};
use crate::migration::{MigrationReport, ledger_migrations};
use crate::projection::{
    AccountBalance, LiveProjection, MaterializedStore, ProjectedViews, ProjectionSummary,
    ProjectionTarget,
};
use crate::storage::LocalDatabase;
use crate::sync::{CloudFileStore, SyncEngine, SyncOutcome, SyncState, canonical_order};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    pub schema_version: u32,
    pub local_actions: u64,
    pub replica_actions: u64,
    /// Local actions the last known remote contents do not hold yet.
    pub unsynced_actions: u64,
    pub skipped_actions: u64,
    pub sync_state: SyncState,
}

/// A migrated local database with both logs, the live projection and the
/// sync engine wired together.
pub struct Ledger {
    config: LedgerConfig,
    schema_version: u32,
    migration: MigrationReport,
    local: AppendOnlyLog,
    replica: CloudReplica,
    projection: Arc<LiveProjection>,
    engine: Arc<SyncEngine>,
}

impl Ledger {
    /// Opens (and migrates) the database under `config.data_dir`.
    ///
    /// A failed migration returns the error and no ledger.
    pub async fn open(config: LedgerConfig, cloud: Arc<dyn CloudFileStore>) -> Result<Self> {
        config.validate()?;

        let mut db = LocalDatabase::open(
            &config.data_dir,
            config.durability,
            config.log_quota_bytes,
        )
        .await?;
        let migration = ledger_migrations().migrate(&mut db).await?;
        if migration.migrated() {
            event!(
                Level::INFO,
                from = migration.from_version,
                to = migration.to_version,
                "local database migrated"
            );
        }

        let local = AppendOnlyLog::open(&db).await?;
        let replica = CloudReplica::open(&db).await?;
        let projection = Arc::new(LiveProjection::with_views(ProjectedViews::open(&db).await?));

        let canonical = canonical_order(
            &local.snapshot().await.to_vec(),
            &replica.snapshot().await.to_vec(),
        );
        projection.rebuild(&canonical).await?;

        let target: Arc<dyn ProjectionTarget> = projection.clone();
        let engine = SyncEngine::new(local.clone(), replica.clone(), cloud, target)
            .with_file(config.remote_file.clone())
            .with_encoding(config.encoding);

        Ok(Self {
            schema_version: db.schema_version(),
            config,
            migration,
            local,
            replica,
            projection,
            engine: Arc::new(engine),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn local_log(&self) -> &AppendOnlyLog {
        &self.local
    }

    pub fn cloud_replica(&self) -> &CloudReplica {
        &self.replica
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Appends user actions and refreshes the materialized views.
    pub async fn dispatch(&self, actions: Vec<Action>) -> Result<ProjectionSummary> {
        let count = actions.len();
        self.local.append(actions).await?;
        event!(Level::DEBUG, count, "actions dispatched");
        self.engine.refresh_projection().await
    }

    pub async fn run_sync(&self) -> Result<SyncOutcome> {
        self.engine.run_sync().await
    }

    /// The merged order of the local log and the last known remote contents.
    pub async fn canonical_order(&self) -> Vec<Action> {
        let local = self.local.snapshot().await.to_vec();
        let remote = self.replica.snapshot().await.to_vec();
        canonical_order(&local, &remote)
    }

    pub async fn materialized(&self) -> MaterializedStore {
        self.projection.snapshot().await
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.projection
            .snapshot()
            .await
            .transactions
            .iter()
            .cloned()
            .collect()
    }

    pub async fn categories(&self) -> Vec<CategoryRecord> {
        self.projection
            .snapshot()
            .await
            .categories
            .iter()
            .cloned()
            .collect()
    }

    pub async fn accounts(&self) -> Vec<AccountBalance> {
        self.projection.snapshot().await.accounts.balances()
    }

    /// Looks a transaction up by id in the persisted view.
    pub async fn transaction(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let found = self.projection.read_views(|views| views.transaction(id)).await?;
        Ok(found.flatten())
    }

    /// Looks an account and its balance up by id in the persisted view.
    pub async fn account(&self, id: &str) -> Result<Option<AccountBalance>> {
        let found = self.projection.read_views(|views| views.account(id)).await?;
        Ok(found.flatten())
    }

    /// Reads through the persisted transactions store's `account_id` index.
    pub async fn transactions_for_account(&self, account_id: &str) -> Result<Vec<TransactionRecord>> {
        let found = self
            .projection
            .read_views(|views| views.transactions_for_account(account_id))
            .await?;
        Ok(found.unwrap_or_default())
    }

    pub async fn status(&self) -> LedgerStatus {
        let local = self.local.snapshot().await;
        let replica = self.replica.snapshot().await;
        let remote_ids = replica.iter().map(|a| a.id).collect::<HashSet<_>>();
        let unsynced = local.iter().filter(|a| !remote_ids.contains(&a.id)).count();

        LedgerStatus {
            schema_version: self.schema_version,
            local_actions: local.len(),
            replica_actions: self.replica.get_actions_count().await,
            unsynced_actions: unsynced as u64,
            skipped_actions: self.projection.snapshot().await.skipped_actions,
            sync_state: self.engine.state(),
        }
    }
}
