use chrono::NaiveDate;
use ledgersync::{
    AccountPatch, AccountRecord, Action, ActionKind, CategoryKind, CategoryRecord,
    DirectoryCloudStore, InMemoryCloudStore, LEDGER_SCHEMA_VERSION, Ledger, LedgerConfig,
    LedgerError, ProjectionMode, TransactionPatch, TransactionRecord,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

async fn open(root: &Path) -> Ledger {
    Ledger::open(LedgerConfig::new(root), Arc::new(InMemoryCloudStore::new()))
        .await
        .unwrap()
}

fn checking() -> Action {
    Action::add_account(&AccountRecord {
        id: "checking".to_string(),
        name: "Checking".to_string(),
        currency: "EUR".to_string(),
        opening_balance_minor: 50_000,
    })
    .unwrap()
}

fn tx(id: &str, account_id: &str, amount_minor: i64) -> Action {
    Action::add_transaction(&TransactionRecord {
        id: id.to_string(),
        account_id: account_id.to_string(),
        category_id: Some("food".to_string()),
        amount_minor,
        occurred_on: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
        memo: String::new(),
    })
    .unwrap()
}

#[tokio::test]
async fn fresh_ledger_is_migrated_and_empty() {
    let dir = tempdir().unwrap();
    let ledger = open(dir.path()).await;

    assert_eq!(ledger.schema_version(), LEDGER_SCHEMA_VERSION);
    assert_eq!(ledger.migration_report().applied, vec![1, 2, 3]);
    assert!(ledger.transactions().await.is_empty());
    assert!(ledger.accounts().await.is_empty());

    let status = ledger.status().await;
    assert_eq!(status.local_actions, 0);
    assert_eq!(status.unsynced_actions, 0);
}

#[tokio::test]
async fn dispatch_projects_incrementally() {
    let dir = tempdir().unwrap();
    let ledger = open(dir.path()).await;

    let first = ledger.dispatch(vec![checking()]).await.unwrap();
    assert_eq!(first.mode, ProjectionMode::Incremental);

    let second = ledger
        .dispatch(vec![tx("t1", "checking", -1_250), tx("t2", "checking", -750)])
        .await
        .unwrap();
    assert_eq!(second.mode, ProjectionMode::Incremental);
    assert_eq!(second.replayed, 2);

    let accounts = ledger.accounts().await;
    assert_eq!(accounts[0].balance_minor, 48_000);
    assert_eq!(accounts[0].transaction_count, 2);
    assert_eq!(ledger.status().await.unsynced_actions, 3);
}

#[tokio::test]
async fn edits_and_tombstones_flow_into_views() {
    let dir = tempdir().unwrap();
    let ledger = open(dir.path()).await;

    let mut rename = AccountPatch {
        id: "checking".to_string(),
        ..AccountPatch::default()
    };
    rename.name = Some("Main".to_string());
    let mut bigger = TransactionPatch::new("t1");
    bigger.amount_minor = Some(-2_000);

    ledger
        .dispatch(vec![
            checking(),
            Action::add_category(&CategoryRecord {
                id: "food".to_string(),
                name: "Food".to_string(),
                kind: CategoryKind::Expense,
                parent_id: None,
            })
            .unwrap(),
            tx("t1", "checking", -1_000),
            tx("t2", "checking", -500),
            Action::edit_account(&rename).unwrap(),
            Action::edit_transaction(&bigger).unwrap(),
            Action::delete_transaction("t2").unwrap(),
            tx("t2", "checking", -99_999),
        ])
        .await
        .unwrap();

    let accounts = ledger.accounts().await;
    assert_eq!(accounts[0].account.name, "Main");
    assert_eq!(accounts[0].balance_minor, 48_000);
    assert_eq!(accounts[0].transaction_count, 1);

    let by_account = ledger.transactions_for_account("checking").await.unwrap();
    assert_eq!(by_account.len(), 1);
    assert_eq!(by_account[0].amount_minor, -2_000);
    assert_eq!(ledger.categories().await.len(), 1);
}

#[tokio::test]
async fn unreadable_actions_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    let ledger = open(dir.path()).await;

    ledger
        .dispatch(vec![
            checking(),
            Action::new(ActionKind::AddTransaction, json!({"id": "broken"})),
        ])
        .await
        .unwrap();

    let state = ledger.materialized().await;
    assert_eq!(state.skipped_actions, 1);
    assert_eq!(state.applied_actions, 1);
    assert_eq!(ledger.status().await.skipped_actions, 1);
}

#[tokio::test]
async fn reopen_rebuilds_the_same_state() {
    let dir = tempdir().unwrap();
    let before = {
        let ledger = open(dir.path()).await;
        ledger
            .dispatch(vec![checking(), tx("t1", "checking", -10)])
            .await
            .unwrap();
        ledger.materialized().await.canonical_bytes().unwrap()
    };

    let ledger = open(dir.path()).await;
    assert!(!ledger.migration_report().migrated());
    assert_eq!(ledger.materialized().await.canonical_bytes().unwrap(), before);
    assert_eq!(ledger.transactions_for_account("checking").await.unwrap().len(), 1);
    assert_eq!(ledger.transaction("t1").await.unwrap().unwrap().amount_minor, -10);
    assert_eq!(
        ledger.account("checking").await.unwrap().unwrap().balance_minor,
        49_990
    );
    assert!(ledger.transaction("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn write_failure_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(
        LedgerConfig::new(dir.path()).log_quota_bytes(600),
        Arc::new(InMemoryCloudStore::new()),
    )
    .await
    .unwrap();
    ledger.dispatch(vec![checking()]).await.unwrap();

    let batch = (0..20)
        .map(|n| tx(&format!("t{}", n), "checking", -1))
        .collect::<Vec<_>>();
    let err = ledger.dispatch(batch).await.unwrap_err();
    assert!(matches!(err, LedgerError::WriteFailure(_)));
    assert_eq!(ledger.status().await.local_actions, 1);
    assert!(ledger.transactions().await.is_empty());
}

#[tokio::test]
async fn devices_share_state_through_a_synced_folder() {
    let shared = tempdir().unwrap();
    let (dir_a, dir_b) = (tempdir().unwrap(), tempdir().unwrap());
    let cloud = Arc::new(DirectoryCloudStore::new(shared.path()));

    let a = Ledger::open(LedgerConfig::new(dir_a.path()), cloud.clone())
        .await
        .unwrap();
    a.dispatch(vec![checking(), tx("t1", "checking", -300)])
        .await
        .unwrap();
    a.run_sync().await.unwrap();
    assert!(shared.path().join("ledger-actions.json").exists());

    let b = Ledger::open(LedgerConfig::new(dir_b.path()), cloud)
        .await
        .unwrap();
    b.run_sync().await.unwrap();
    assert_eq!(b.accounts().await[0].balance_minor, 49_700);
    assert_eq!(b.status().await.unsynced_actions, 0);
}
