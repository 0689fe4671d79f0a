use async_trait::async_trait;
use chrono::NaiveDate;
use ledgersync::sync::{decode_actions, encode_actions};
use ledgersync::{
    AccountRecord, Action, ActionId, ActionLog, CloudEncoding, CloudFileStore, DivergenceKind,
    FileRef, InMemoryCloudStore, Ledger, LedgerConfig, LedgerError, Result, SyncEvent,
    SyncOutcome, SyncState, TransactionRecord,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::tempdir;
use tokio::sync::Notify;

async fn device(root: &Path, cloud: Arc<dyn CloudFileStore>) -> Ledger {
    Ledger::open(LedgerConfig::new(root), cloud).await.unwrap()
}

fn account(id: &str, created: i64) -> Action {
    Action::add_account(&AccountRecord {
        id: id.to_string(),
        name: id.to_string(),
        currency: "USD".to_string(),
        opening_balance_minor: 0,
    })
    .unwrap()
    .with_created_at(created)
}

fn spend(id: &str, amount_minor: i64, created: i64) -> Action {
    Action::add_transaction(&TransactionRecord {
        id: id.to_string(),
        account_id: "checking".to_string(),
        category_id: None,
        amount_minor,
        occurred_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        memo: String::new(),
    })
    .unwrap()
    .with_created_at(created)
}

fn completed(outcome: SyncOutcome) -> ledgersync::SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Queued => panic!("expected a completed cycle"),
    }
}

async fn ids(ledger: &Ledger) -> Vec<ActionId> {
    ledger.canonical_order().await.iter().map(|a| a.id).collect()
}

#[tokio::test]
async fn concurrent_edits_converge_on_both_devices() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let (dir_a, dir_b) = (tempdir().unwrap(), tempdir().unwrap());
    let a = device(dir_a.path(), cloud.clone()).await;
    let b = device(dir_b.path(), cloud.clone()).await;

    let (a1, a2) = (account("checking", 1), spend("t1", -100, 2));
    a.dispatch(vec![a1.clone(), a2.clone()]).await.unwrap();
    a.run_sync().await.unwrap();
    let pulled = completed(b.run_sync().await.unwrap());
    assert_eq!(pulled.divergence, DivergenceKind::PullOnly);
    assert_eq!(pulled.pulled, 2);

    let a4 = spend("t4", -400, 4);
    let a3 = spend("t3", -300, 3);
    a.dispatch(vec![a4.clone()]).await.unwrap();
    b.dispatch(vec![a3.clone()]).await.unwrap();

    completed(b.run_sync().await.unwrap());
    let conflict = completed(a.run_sync().await.unwrap());
    assert_eq!(conflict.divergence, DivergenceKind::Conflict);
    completed(b.run_sync().await.unwrap());

    let expected = vec![a1.id, a2.id, a3.id, a4.id];
    assert_eq!(ids(&a).await, expected);
    assert_eq!(ids(&b).await, expected);
    assert_eq!(
        a.materialized().await.canonical_bytes().unwrap(),
        b.materialized().await.canonical_bytes().unwrap()
    );
    assert_eq!(a.accounts().await[0].balance_minor, -800);

    let remote = decode_actions(&cloud.contents(&FileRef::default()).unwrap().unwrap()).unwrap();
    assert_eq!(remote.iter().map(|x| x.id).collect::<Vec<_>>(), expected);
}

#[tokio::test]
async fn failed_push_keeps_merged_state_and_retry_does_not_reappend() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let (dir_a, dir_b) = (tempdir().unwrap(), tempdir().unwrap());
    let a = device(dir_a.path(), cloud.clone()).await;
    let b = device(dir_b.path(), cloud.clone()).await;

    a.dispatch(vec![account("checking", 1)]).await.unwrap();
    a.run_sync().await.unwrap();
    b.dispatch(vec![spend("mine", -10, 2)]).await.unwrap();

    cloud.fail_next_uploads(1);
    let err = b.run_sync().await.unwrap_err();
    assert!(matches!(err, LedgerError::NetworkFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(b.local_log().get_actions_count().await, 2);
    assert_eq!(b.sync_engine().state(), SyncState::Idle);

    let retry = completed(b.run_sync().await.unwrap());
    assert_eq!(retry.pulled, 0);
    assert!(retry.uploaded);
    assert_eq!(b.local_log().get_actions_count().await, 2);
    assert_eq!(cloud.upload_count(), 2);
}

#[tokio::test]
async fn undecodable_remote_leaves_local_log_untouched() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    ledger.dispatch(vec![account("checking", 1)]).await.unwrap();
    let before = ledger.local_log().snapshot().await;

    cloud.put(&FileRef::default(), vec![0xc1, 0x00, 0xff]).unwrap();
    let mut events = ledger.sync_engine().subscribe();
    let err = ledger.run_sync().await.unwrap_err();
    assert!(matches!(err, LedgerError::DecodeFailure(_)));

    assert_eq!(ledger.local_log().snapshot().await, before);
    assert_eq!(events.recv().await.unwrap().tag(), "SYNC_START");
    assert_eq!(events.recv().await.unwrap().tag(), "SYNC_ERROR");
    assert_eq!(cloud.upload_count(), 0);
}

#[tokio::test]
async fn messagepack_remote_is_read_and_rewritten() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let seed = vec![account("checking", 1)];
    cloud
        .put(
            &FileRef::default(),
            encode_actions(&seed, CloudEncoding::MessagePack).unwrap(),
        )
        .unwrap();

    let dir = tempdir().unwrap();
    let ledger = Ledger::open(
        LedgerConfig::new(dir.path()).encoding(CloudEncoding::MessagePack),
        cloud.clone(),
    )
    .await
    .unwrap();

    let report = completed(ledger.run_sync().await.unwrap());
    assert_eq!(report.divergence, DivergenceKind::PullOnly);
    ledger.dispatch(vec![spend("t1", -5, 2)]).await.unwrap();
    completed(ledger.run_sync().await.unwrap());

    let bytes = cloud.contents(&FileRef::default()).unwrap().unwrap();
    assert_eq!(ledgersync::sync::detect_encoding(&bytes), CloudEncoding::MessagePack);
    assert_eq!(decode_actions(&bytes).unwrap().len(), 2);
}

#[tokio::test]
async fn in_sync_cycle_skips_upload() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    ledger.dispatch(vec![account("checking", 1)]).await.unwrap();

    completed(ledger.run_sync().await.unwrap());
    let again = completed(ledger.run_sync().await.unwrap());
    assert_eq!(again.divergence, DivergenceKind::InSync);
    assert!(!again.uploaded);
    assert_eq!(cloud.upload_count(), 1);
}

/// Blocks the first download or the first upload until released.
struct GatedCloud {
    inner: Arc<InMemoryCloudStore>,
    gate: Notify,
    gated_download: AtomicBool,
    gated_upload: AtomicBool,
}

impl GatedCloud {
    fn new() -> Self {
        Self::gating_download(Arc::new(InMemoryCloudStore::new()))
    }

    fn gating_download(inner: Arc<InMemoryCloudStore>) -> Self {
        Self {
            inner,
            gate: Notify::new(),
            gated_download: AtomicBool::new(true),
            gated_upload: AtomicBool::new(false),
        }
    }

    fn gating_upload(inner: Arc<InMemoryCloudStore>) -> Self {
        Self {
            inner,
            gate: Notify::new(),
            gated_download: AtomicBool::new(false),
            gated_upload: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl CloudFileStore for GatedCloud {
    async fn download_file(&self, file: &FileRef) -> Result<Option<Vec<u8>>> {
        if self.gated_download.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.download_file(file).await
    }

    async fn upload_file(&self, file: &FileRef, bytes: Vec<u8>) -> Result<()> {
        if self.gated_upload.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.upload_file(file, bytes).await
    }
}

fn remote_ids(cloud: &InMemoryCloudStore) -> Vec<ActionId> {
    let bytes = cloud.contents(&FileRef::default()).unwrap().unwrap_or_default();
    decode_actions(&bytes).unwrap().iter().map(|a| a.id).collect()
}

#[tokio::test]
async fn equal_length_and_last_id_with_different_history_is_merged() {
    let cloud = Arc::new(InMemoryCloudStore::new());
    let (p, q, z) = (account("p", 1), account("q", 2), account("z", 3));
    cloud
        .put(
            &FileRef::default(),
            encode_actions(&[q.clone(), z.clone()], CloudEncoding::Json).unwrap(),
        )
        .unwrap();

    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    ledger.dispatch(vec![p.clone(), z.clone()]).await.unwrap();
    assert_eq!(ledger.accounts().await.len(), 2);

    let report = completed(ledger.run_sync().await.unwrap());
    assert_eq!(report.divergence, DivergenceKind::Conflict);
    assert!(report.uploaded);
    assert_eq!(report.pulled, 1);
    assert_eq!(remote_ids(&cloud), vec![p.id, q.id, z.id]);
    assert_eq!(ids(&ledger).await, vec![p.id, q.id, z.id]);
    assert_eq!(ledger.accounts().await.len(), 3);
}

#[tokio::test]
async fn overwritten_upload_is_restored_by_the_next_cycles() {
    let shared = Arc::new(InMemoryCloudStore::new());
    let (dir_a, dir_b) = (tempdir().unwrap(), tempdir().unwrap());
    let gated = Arc::new(GatedCloud::gating_upload(shared.clone()));
    let a = device(dir_a.path(), gated.clone()).await;
    let b = device(dir_b.path(), shared.clone()).await;

    let base = account("checking", 1);
    b.dispatch(vec![base.clone()]).await.unwrap();
    completed(b.run_sync().await.unwrap());
    completed(a.run_sync().await.unwrap());

    let (from_a, from_b) = (spend("ta", -10, 2), spend("tb", -20, 3));
    a.dispatch(vec![from_a.clone()]).await.unwrap();
    b.dispatch(vec![from_b.clone()]).await.unwrap();

    let engine = a.sync_engine().clone();
    let mut state = engine.state_receiver();
    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_sync().await }
    });
    state
        .wait_for(|current| *current == SyncState::Pushing)
        .await
        .unwrap();

    completed(b.run_sync().await.unwrap());
    assert_eq!(remote_ids(&shared), vec![base.id, from_b.id]);
    gated.gate.notify_one();
    completed(running.await.unwrap().unwrap());
    assert_eq!(remote_ids(&shared), vec![base.id, from_a.id]);

    let repaired = completed(b.run_sync().await.unwrap());
    assert!(repaired.uploaded);
    completed(a.run_sync().await.unwrap());

    let expected = vec![base.id, from_a.id, from_b.id];
    assert_eq!(remote_ids(&shared), expected);
    assert_eq!(ids(&a).await, expected);
    assert_eq!(ids(&b).await, expected);
    assert_eq!(a.accounts().await[0].balance_minor, -30);
    assert_eq!(b.accounts().await[0].balance_minor, -30);
}

#[tokio::test]
async fn dispatch_during_push_stays_in_the_views() {
    let shared = Arc::new(InMemoryCloudStore::new());
    let cloud = Arc::new(GatedCloud::gating_upload(shared.clone()));
    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    ledger.dispatch(vec![account("checking", 1)]).await.unwrap();

    let engine = ledger.sync_engine().clone();
    let mut state = engine.state_receiver();
    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_sync().await }
    });
    state
        .wait_for(|current| *current == SyncState::Pushing)
        .await
        .unwrap();

    let late = account("savings", 2);
    ledger.dispatch(vec![late.clone()]).await.unwrap();
    assert_eq!(ledger.accounts().await.len(), 2);

    cloud.gate.notify_one();
    completed(running.await.unwrap().unwrap());
    assert_eq!(ledger.accounts().await.len(), 2);
    assert_eq!(ledger.local_log().get_actions_count().await, 2);
    assert!(!remote_ids(&shared).contains(&late.id));

    let next = completed(ledger.run_sync().await.unwrap());
    assert_eq!(next.divergence, DivergenceKind::PushOnly);
    assert!(remote_ids(&shared).contains(&late.id));
    assert_eq!(ledger.accounts().await.len(), 2);
}

#[tokio::test]
async fn run_while_running_queues_exactly_one_follow_up() {
    let cloud = Arc::new(GatedCloud::new());
    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    let engine = ledger.sync_engine().clone();
    let mut events = engine.subscribe();
    let mut state = engine.state_receiver();

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_sync().await }
    });
    state
        .wait_for(|current| *current == SyncState::Fetching)
        .await
        .unwrap();

    assert_eq!(engine.run_sync().await.unwrap(), SyncOutcome::Queued);
    assert_eq!(engine.run_sync().await.unwrap(), SyncOutcome::Queued);
    cloud.gate.notify_one();

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(completed(outcome).cycle, 2);
    assert_eq!(engine.cycles_started(), 2);
    assert!(!engine.is_running());

    let mut starts = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::Start { .. }) {
            starts += 1;
        }
    }
    assert_eq!(starts, 2);
}

#[tokio::test]
async fn cancelled_cycle_releases_the_engine() {
    let cloud = Arc::new(GatedCloud::new());
    let dir = tempdir().unwrap();
    let ledger = device(dir.path(), cloud.clone()).await;
    ledger.dispatch(vec![account("checking", 1)]).await.unwrap();
    let engine = ledger.sync_engine().clone();
    let mut state = engine.state_receiver();

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_sync().await }
    });
    state
        .wait_for(|current| *current == SyncState::Fetching)
        .await
        .unwrap();
    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());

    assert!(!engine.is_running());
    assert_eq!(engine.state(), SyncState::Idle);
    let report = completed(engine.run_sync().await.unwrap());
    assert_eq!(report.divergence, DivergenceKind::PushOnly);
    assert_eq!(ledger.local_log().get_actions_count().await, 1);
}
